//! Integration tests for the daemon HTTP API

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use monitor_lib::{
    api::create_router,
    daemon::{DaemonManager, ForegroundPlatform},
    models::{ContainerState, CpuMetrics, MemoryMetrics, MetricPayload, MetricSample},
    notifier::LogNotifier,
    runtime::StaticRuntime,
    MonitorConfig,
};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    manager: Arc<DaemonManager>,
    _dir: TempDir,
}

fn setup_test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = MonitorConfig::default();
    config.instance_name = "api-test".to_string();
    config.daemon.pid_file = dir.path().join("daemon.pid");
    config.daemon.status_file = dir.path().join("status.json");
    config.daemon.log_file = dir.path().join("daemon.log");
    config.daemon.api_enabled = false;
    config.daemon.stop_timeout_secs = 1;

    let runtime = Arc::new(StaticRuntime::new());
    runtime.add_container("c1", "web", ContainerState::Running);
    runtime.add_container("c2", "db", ContainerState::Stopped);

    let manager = Arc::new(DaemonManager::new(
        config,
        runtime,
        Arc::new(LogNotifier),
        Arc::new(ForegroundPlatform),
    ));
    let router = create_router(Arc::clone(&manager));

    TestApp {
        router,
        manager,
        _dir: dir,
    }
}

async fn seed(manager: &DaemonManager) {
    let now = Utc::now();
    let mut samples = Vec::new();
    for i in 0..3 {
        let ts = now - Duration::hours(i);
        samples.push(MetricSample::new(
            "c1",
            ts,
            MetricPayload::Cpu(CpuMetrics {
                usage_percent: 5.0 + i as f64,
                ..Default::default()
            }),
        ));
        samples.push(MetricSample::new(
            "c1",
            ts,
            MetricPayload::Memory(MemoryMetrics {
                usage_percent: 50.0,
                limit: 512 * 1024 * 1024,
                ..Default::default()
            }),
        ));
    }
    manager.collector().insert_samples(samples).await;
    manager.engine().generate_recommendations().await;
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body.to_vec())
}

async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_tracks_lifecycle() {
    let app = setup_test_app();

    let (status, body) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["state"], "notrunning");

    app.manager.launch().await.unwrap();
    let (status, body) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "running");

    app.manager.stop().await;
    let (status, _) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app();
    seed(&app.manager).await;

    let (status, content_type, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("resource_monitor_samples_collected_total"));
    assert!(text.contains("resource_monitor_recommendations_generated_total"));
}

#[tokio::test]
async fn test_status_endpoint_reports_counters() {
    let app = setup_test_app();
    seed(&app.manager).await;

    let (status, body) = get_json(&app, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["components"]["metrics_collector"]["containers_monitored"], 1);
    assert_eq!(body["components"]["metrics_collector"]["metrics_collected"], 6);
    assert!(body["components"]["optimization_engine"]["recommendations_generated"]
        .as_u64()
        .unwrap()
        > 0);
}

#[tokio::test]
async fn test_metrics_query_filters() {
    let app = setup_test_app();
    seed(&app.manager).await;

    let (status, body) = get_json(&app, "/api/v1/metrics?container_id=c1&metric_type=memory").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["c1"]["memory"].as_array().unwrap().len(), 3);
    assert!(body["c1"].get("cpu").is_none());

    let start = (Utc::now() - Duration::minutes(90)).to_rfc3339();
    let uri = format!(
        "/api/v1/metrics?metric_type=cpu&start_time={}",
        start.replace('+', "%2B")
    );
    let (_, body) = get_json(&app, &uri).await;
    assert_eq!(body["c1"]["cpu"].as_array().unwrap().len(), 2);

    // malformed bound is ignored
    let (status, body) = get_json(&app, "/api/v1/metrics?metric_type=cpu&end_time=soon").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["c1"]["cpu"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_filter_values_are_rejected() {
    let app = setup_test_app();

    for uri in [
        "/api/v1/metrics?metric_type=gpu",
        "/api/v1/anomalies?severity=extreme",
        "/api/v1/recommendations?category=security",
        "/api/v1/baselines?metric_type=io",
    ] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].as_str().unwrap().contains("unknown"));
    }
}

#[tokio::test]
async fn test_anomalies_and_baselines_empty() {
    let app = setup_test_app();

    let (status, body) = get_json(&app, "/api/v1/anomalies?severity=high&metric_type=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({}));

    let (status, body) = get_json(&app, "/api/v1/baselines").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn test_recommendations_filtered_by_category() {
    let app = setup_test_app();
    seed(&app.manager).await;

    let (status, body) = get_json(&app, "/api/v1/recommendations?category=sizing&resource=cpu").await;
    assert_eq!(status, StatusCode::OK);
    let recs = body["c1"].as_array().unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0]["action"], "decrease");

    let (_, body) = get_json(&app, "/api/v1/recommendations?container_id=zzz").await;
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn test_report_formats() {
    let app = setup_test_app();

    let (status, content_type, body) = get(&app, "/api/v1/report?format=json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(body, b"No optimization recommendations available.");

    seed(&app.manager).await;

    let (_, content_type, body) = get(&app, "/api/v1/report?format=html&container_id=c1").await;
    assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));
    assert!(String::from_utf8(body).unwrap().starts_with("<!DOCTYPE html>"));

    let (_, content_type, body) = get(&app, "/api/v1/report?format=json").await;
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(parsed["c1"].is_array());

    let (_, _, body) = get(&app, "/api/v1/report").await;
    assert!(String::from_utf8(body)
        .unwrap()
        .starts_with("Container Resource Optimization Report"));
}

#[tokio::test]
async fn test_system_endpoint_counts_containers() {
    let app = setup_test_app();
    seed(&app.manager).await;

    let (status, body) = get_json(&app, "/api/v1/system").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["containers"]["total"], 2);
    assert_eq!(body["containers"]["running"], 1);
    assert_eq!(body["containers"]["stopped"], 1);
}

#[tokio::test]
async fn test_system_endpoint_maps_runtime_failure() {
    let dir = TempDir::new().unwrap();
    let mut config = MonitorConfig::default();
    config.daemon.pid_file = dir.path().join("daemon.pid");
    config.daemon.status_file = dir.path().join("status.json");

    let runtime = Arc::new(StaticRuntime::new());
    runtime.fail_listing(true);
    let manager = Arc::new(DaemonManager::new(
        config,
        runtime,
        Arc::new(LogNotifier),
        Arc::new(ForegroundPlatform),
    ));
    let app = TestApp {
        router: create_router(Arc::clone(&manager)),
        manager,
        _dir: dir,
    };

    let (status, body) = get_json(&app, "/api/v1/system").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}
