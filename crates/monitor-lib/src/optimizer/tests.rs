//! Engine tests over a populated collector

use std::sync::Arc;

use chrono::{Duration, Utc};

use super::*;
use crate::config::MetricsConfig;
use crate::models::{CpuMetrics, MemoryMetrics, MetricPayload, MetricSample};
use crate::runtime::StaticRuntime;

fn samples(id: &str, cpu: &[f64], memory: &[f64]) -> Vec<MetricSample> {
    let start = Utc::now() - Duration::hours(cpu.len().max(memory.len()) as i64);
    let mut out = Vec::new();
    for (i, pct) in cpu.iter().enumerate() {
        out.push(MetricSample::new(
            id,
            start + Duration::hours(i as i64),
            MetricPayload::Cpu(CpuMetrics {
                usage_percent: *pct,
                ..Default::default()
            }),
        ));
    }
    for (i, pct) in memory.iter().enumerate() {
        out.push(MetricSample::new(
            id,
            start + Duration::hours(i as i64),
            MetricPayload::Memory(MemoryMetrics {
                usage_percent: *pct,
                limit: 1024 * 1024 * 1024,
                ..Default::default()
            }),
        ));
    }
    out
}

async fn engine_with(samples: Vec<MetricSample>) -> Arc<OptimizationEngine> {
    let collector = Arc::new(MetricsCollector::new(
        Arc::new(StaticRuntime::new()),
        MetricsConfig::default(),
    ));
    collector.insert_samples(samples).await;
    Arc::new(OptimizationEngine::new(
        collector,
        OptimizationConfig::default(),
        "test-host",
    ))
}

#[tokio::test]
async fn test_low_peak_cpu_yields_decrease() {
    let engine = engine_with(samples("c1", &[5.0, 15.0, 10.0], &[40.0, 50.0, 45.0])).await;

    let produced = engine.generate_recommendations().await;
    let recs = &produced["c1"];

    let decrease = recs
        .iter()
        .find(|r| r.category == Category::Sizing && r.resource == Resource::Cpu)
        .unwrap();
    assert_eq!(decrease.action, Action::Decrease);
    assert_eq!(decrease.recommended_value, Some(22.5));

    // memory is in band; cost always adds consolidation
    assert!(!recs.iter().any(|r| r.resource == Resource::Memory));
    assert_eq!(recs.last().unwrap().action, Action::ConsolidationOpportunity);
    assert_eq!(engine.recommendations_generated(), recs.len() as u64);
}

#[tokio::test]
async fn test_generators_run_in_order() {
    let engine = engine_with(samples("c1", &[2.0, 3.0], &[4.0, 5.0])).await;
    let produced = engine.generate_recommendations().await;

    let categories: Vec<Category> = produced["c1"].iter().map(|r| r.category).collect();
    assert_eq!(
        categories,
        vec![Category::Sizing, Category::Sizing, Category::Cost, Category::Cost]
    );
}

#[tokio::test]
async fn test_invalid_summary_is_isolated() {
    let mut input = samples("bad", &[f64::NAN, 10.0], &[]);
    input.extend(samples("good", &[50.0], &[]));
    let engine = engine_with(input).await;

    let produced = engine.generate_recommendations().await;
    assert_eq!(produced.keys().collect::<Vec<_>>(), vec!["good"]);
}

#[tokio::test]
async fn test_filters_and_history_accumulate() {
    let engine = engine_with(samples("c1", &[95.0, 92.0], &[50.0])).await;
    engine.generate_recommendations().await;
    engine.generate_recommendations().await;

    let all = engine.get_recommendations(&RecommendationFilter::default()).await;
    let per_cycle = all["c1"].len() / 2;
    assert_eq!(all["c1"].len(), per_cycle * 2);

    let perf_cpu = engine
        .get_recommendations(&RecommendationFilter {
            category: Some(Category::Performance),
            resource: Some(Resource::Cpu),
            ..Default::default()
        })
        .await;
    assert_eq!(perf_cpu["c1"].len(), 2);
    assert!(perf_cpu["c1"]
        .iter()
        .all(|r| r.action == Action::PotentialThrottling));

    let none = engine
        .get_recommendations(&RecommendationFilter {
            resource: Some(Resource::Disk),
            ..Default::default()
        })
        .await;
    assert!(none.is_empty());

    let other = engine
        .get_recommendations(&RecommendationFilter::container(Some("zzz")))
        .await;
    assert!(other.is_empty());
}

#[tokio::test]
async fn test_report_empty_and_json_round_trip() {
    let engine = engine_with(Vec::new()).await;
    assert_eq!(
        engine
            .generate_optimization_report(None, ReportFormat::Json)
            .await
            .unwrap(),
        NO_RECOMMENDATIONS
    );

    let engine = engine_with(samples("c1", &[15.0, 12.0], &[85.0])).await;
    engine.generate_recommendations().await;

    let json = engine
        .generate_optimization_report(None, ReportFormat::Json)
        .await
        .unwrap();
    let parsed: RecommendationsByContainer = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed,
        engine.get_recommendations(&RecommendationFilter::default()).await
    );

    let text = engine
        .generate_optimization_report(Some("c1"), ReportFormat::Text)
        .await
        .unwrap();
    assert!(text.contains("Container: c1"));

    let missing = engine
        .generate_optimization_report(Some("zzz"), ReportFormat::Html)
        .await
        .unwrap();
    assert_eq!(missing, NO_RECOMMENDATIONS);
}

#[tokio::test]
async fn test_history_retention() {
    let engine = engine_with(samples("c1", &[50.0], &[50.0])).await;
    engine.generate_recommendations().await;

    assert_eq!(engine.prune_history(Utc::now()).await, 0);
    assert_eq!(engine.prune_history(Utc::now() + Duration::days(8)).await, 1);
    assert!(engine
        .get_recommendations(&RecommendationFilter::default())
        .await
        .is_empty());
}

#[test]
fn test_label_parsing() {
    assert_eq!("Sizing".parse::<Category>().unwrap(), Category::Sizing);
    assert_eq!("general".parse::<Resource>().unwrap(), Resource::General);
    assert!("storage".parse::<Resource>().is_err());
    assert_eq!(Action::HighIo.to_string(), "high_io");
}
