//! API client for the monitor daemon's HTTP API

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Query parameters; `None` and blank values are left out of the URL
pub type Params<'a> = [(&'a str, Option<&'a str>)];

/// API client for the monitor daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str, params: &Params<'_>) -> Result<Url> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                    pairs.append_pair(key, value);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    async fn send(&self, path: &str, params: &Params<'_>) -> Result<Response> {
        let url = self.url(path, params)?;
        debug!(url = %url, "Sending API request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach the monitor daemon; is it running with the API enabled?")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        Ok(response)
    }

    /// Make a GET request and decode the JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: &Params<'_>) -> Result<T> {
        self.send(path, params)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a GET request and return the raw body
    pub async fn get_text(&self, path: &str, params: &Params<'_>) -> Result<String> {
        self.send(path, params)
            .await?
            .text()
            .await
            .context("Failed to read response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use monitor_lib::anomaly::AnomaliesByContainer;

    #[tokio::test]
    async fn test_get_sends_only_set_params() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/anomalies")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("container_id".into(), "abc".into()),
                Matcher::UrlEncoded("severity".into(), "high".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let anomalies: AnomaliesByContainer = client
            .get(
                "api/v1/anomalies",
                &[
                    ("container_id", Some("abc")),
                    ("metric_type", None),
                    ("severity", Some("high")),
                    ("start_time", Some("  ")),
                ],
            )
            .await
            .unwrap();

        assert!(anomalies.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_surfaces_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/metrics")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"unknown metric type: \"gpu\""}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<serde_json::Value>("api/v1/metrics", &[("metric_type", Some("gpu"))])
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("unknown metric type"));
    }

    #[tokio::test]
    async fn test_get_text_returns_raw_report() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/report")
            .match_query(Matcher::UrlEncoded("format".into(), "html".into()))
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<!DOCTYPE html>")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let body = client
            .get_text("api/v1/report", &[("format", Some("html"))])
            .await
            .unwrap();
        assert_eq!(body, "<!DOCTYPE html>");
    }

    #[test]
    fn test_url_omits_empty_query() {
        let client = ApiClient::new("http://127.0.0.1:9465").unwrap();
        let url = client.url("api/v1/status", &[("container_id", None)]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9465/api/v1/status");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
