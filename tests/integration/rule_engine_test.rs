//! Rule Engine Integration Tests
//!
//! Threshold analysis over collected bundles and threshold override files.

use std::io::Write;
use std::sync::Arc;

use ops_reasoner::services::reasoning::Orchestrator;
use ops_reasoner_core::{
    DataRequirement, LogRecord, MetricPoint, MetricSeries, PipelineConfig, TelemetryBundle,
    TelemetryRecords,
};
use ops_reasoner_rules::{HealthStatus, IssueSeverity, MetricSnapshot, RuleEngine};

use crate::support::{plan_json, RecordingTracer, ScriptedCollector, ScriptedLlm};

fn cpu_bundle(value: f64) -> TelemetryBundle {
    let mut bundle = TelemetryBundle::new();
    bundle.insert(
        DataRequirement::CpuMetrics,
        TelemetryRecords::Metrics(vec![MetricSeries::new(
            "system.cpu.user",
            vec![MetricPoint {
                timestamp: 1_700_000_000,
                value,
            }],
        )]),
    );
    bundle
}

// ============================================================================
// Metric thresholds
// ============================================================================

#[test]
fn test_cpu_severity_boundaries() {
    let engine = RuleEngine::new();
    let severity = |value: f64| {
        let analysis = engine.analyze_metrics(&MetricSnapshot::new().with("cpu_usage", value));
        analysis.issues.first().map(|issue| issue.severity)
    };

    assert_eq!(severity(95.0), Some(IssueSeverity::Critical));
    assert_eq!(severity(90.0), Some(IssueSeverity::Critical));
    assert_eq!(severity(85.0), Some(IssueSeverity::Warning));
    assert_eq!(severity(80.0), Some(IssueSeverity::Warning));
    assert_eq!(severity(50.0), None);
}

#[test]
fn test_bundle_analysis_is_idempotent() {
    let engine = RuleEngine::new();
    let mut bundle = cpu_bundle(93.0);
    bundle.insert(
        DataRequirement::ErrorLogs,
        TelemetryRecords::Logs(vec![
            LogRecord::new("error", "database connection refused").with_service("orders"),
            LogRecord::new("warn", "slow response from payments").with_service("payments"),
        ]),
    );

    let first = engine.analyze_bundle(&bundle, None);
    let second = engine.analyze_bundle(&bundle, None);
    assert_eq!(first.issues_summary, second.issues_summary);
    assert_eq!(first, second);
    assert_eq!(first.status, HealthStatus::Critical);
    assert!(first.requires_immediate_attention);
}

#[test]
fn test_failed_collection_is_reported() {
    let engine = RuleEngine::new();
    let mut bundle = cpu_bundle(20.0);
    bundle.insert_failure(DataRequirement::MemoryMetrics, "timeout");

    let analysis = engine.analyze_bundle(&bundle, None);
    assert_eq!(analysis.data_availability, "partial");
    assert_eq!(analysis.status, HealthStatus::Warning);
    assert!((analysis.collection_success_rate - 0.5).abs() < 1e-9);
    assert!(analysis
        .issues_summary
        .iter()
        .any(|issue| issue.contains("memory_metrics")));
}

// ============================================================================
// Override files
// ============================================================================

#[tokio::test]
async fn test_threshold_file_changes_pipeline_outcome() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[performance.cpu_usage]\nwarning = 30.0\ncritical = 60.0").unwrap();
    let engine = RuleEngine::from_file(file.path()).unwrap();
    assert_eq!(engine.thresholds().performance["cpu_usage"].warning, 30.0);
    // Untouched metrics keep their defaults.
    assert_eq!(engine.thresholds().performance["memory_usage"].critical, 95.0);

    let orchestrator = Orchestrator::new(
        Arc::new(ScriptedLlm::new(vec![Ok(plan_json(&["cpu_metrics"]))])),
        Arc::new(ScriptedCollector::healthy()),
        engine,
        Arc::new(RecordingTracer::default()),
        PipelineConfig::default(),
    );
    let state = orchestrator.process("check cpu").await;

    assert!(state
        .identified_issues()
        .iter()
        .any(|issue| issue.starts_with("[warning]") && issue.contains("cpu_usage")));
}

#[test]
fn test_invalid_threshold_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[performance.cpu_usage]\nwarning = 99.0\ncritical = 10.0").unwrap();
    assert!(RuleEngine::from_file(file.path()).is_err());
}
