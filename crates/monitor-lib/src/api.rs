//! HTTP API for health checks, Prometheus metrics and daemon queries

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::daemon::{DaemonManager, DaemonState};
use crate::error::FilterParseError;
use crate::models::{MetricType, Severity};
use crate::optimizer::{Category, ReportFormat, Resource, NO_RECOMMENDATIONS};

/// Error body returned as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<FilterParseError> for ApiError {
    fn from(e: FilterParseError) -> Self {
        ApiError(StatusCode::BAD_REQUEST, e.to_string())
    }
}

/// Blank values count as unset
fn parse_param<T>(raw: &Option<String>) -> Result<Option<T>, ApiError>
where
    T: FromStr<Err = FilterParseError>,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Ok(Some(value.parse()?)),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub container_id: Option<String>,
    pub metric_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnomaliesQuery {
    pub container_id: Option<String>,
    pub metric_type: Option<String>,
    pub severity: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BaselinesQuery {
    pub container_id: Option<String>,
    pub metric_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationsQuery {
    pub container_id: Option<String>,
    pub category: Option<String>,
    pub resource: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub container_id: Option<String>,
    pub format: Option<String>,
}

/// 200 while the daemon is running, 503 otherwise
async fn healthz(State(manager): State<Arc<DaemonManager>>) -> impl IntoResponse {
    let state = manager.state();
    let status_code = if state == DaemonState::Running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let label = format!("{:?}", state).to_lowercase();
    (status_code, Json(json!({ "state": label })))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode Prometheus metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(manager): State<Arc<DaemonManager>>) -> impl IntoResponse {
    Json(manager.get_status().await)
}

async fn metric_samples(
    State(manager): State<Arc<DaemonManager>>,
    Query(q): Query<MetricsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let metric_type = parse_param::<MetricType>(&q.metric_type)?;
    let data = manager
        .get_metrics(
            q.container_id.as_deref(),
            metric_type,
            q.start_time.as_deref(),
            q.end_time.as_deref(),
        )
        .await;
    Ok(Json(data))
}

async fn anomalies(
    State(manager): State<Arc<DaemonManager>>,
    Query(q): Query<AnomaliesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let metric_type = parse_param::<MetricType>(&q.metric_type)?;
    let severity = parse_param::<Severity>(&q.severity)?;
    let data = manager
        .get_anomalies(
            q.container_id.as_deref(),
            metric_type,
            severity,
            q.start_time.as_deref(),
            q.end_time.as_deref(),
        )
        .await;
    Ok(Json(data))
}

async fn baselines(
    State(manager): State<Arc<DaemonManager>>,
    Query(q): Query<BaselinesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let metric_type = parse_param::<MetricType>(&q.metric_type)?;
    let data = manager
        .get_baselines(q.container_id.as_deref(), metric_type)
        .await;
    Ok(Json(data))
}

async fn recommendations(
    State(manager): State<Arc<DaemonManager>>,
    Query(q): Query<RecommendationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let category = parse_param::<Category>(&q.category)?;
    let resource = parse_param::<Resource>(&q.resource)?;
    let data = manager
        .get_recommendations(
            q.container_id.as_deref(),
            category,
            resource,
            q.start_time.as_deref(),
            q.end_time.as_deref(),
        )
        .await;
    Ok(Json(data))
}

async fn report(
    State(manager): State<Arc<DaemonManager>>,
    Query(q): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let format = q.format.as_deref().unwrap_or("text");
    let body = manager
        .generate_optimization_report(q.container_id.as_deref(), format)
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let content_type = match ReportFormat::from(format) {
        _ if body == NO_RECOMMENDATIONS => "text/plain; charset=utf-8",
        ReportFormat::Json => "application/json",
        ReportFormat::Html => "text/html; charset=utf-8",
        ReportFormat::Text => "text/plain; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

async fn system(State(manager): State<Arc<DaemonManager>>) -> Result<impl IntoResponse, ApiError> {
    manager
        .get_system_metrics()
        .await
        .map(Json)
        .map_err(|e| ApiError(StatusCode::BAD_GATEWAY, e.to_string()))
}

/// Create the API router
pub fn create_router(manager: Arc<DaemonManager>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/metrics", get(metric_samples))
        .route("/api/v1/anomalies", get(anomalies))
        .route("/api/v1/baselines", get(baselines))
        .route("/api/v1/recommendations", get(recommendations))
        .route("/api/v1/report", get(report))
        .route("/api/v1/system", get(system))
        .with_state(manager)
}

/// Serve `router` on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Starting API server");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
