//! Telemetry Data Model
//!
//! The unified data-requirement vocabulary, the record shapes a collector
//! returns, and the `TelemetryCollector` trait the Execution phase fans out
//! over. Concrete collectors (Datadog) live in the application crate.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Data requirement vocabulary
// ============================================================================

/// A telemetry category the Planning phase can request.
///
/// This is the single vocabulary shared by the LLM planning path, the
/// keyword fallback and the collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataRequirement {
    CpuMetrics,
    MemoryMetrics,
    DiskMetrics,
    NetworkMetrics,
    ErrorLogs,
    PerformanceLogs,
}

/// Whether a requirement is served by the metrics or the logs API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    Metrics,
    Logs,
}

impl DataRequirement {
    pub const ALL: [DataRequirement; 6] = [
        DataRequirement::CpuMetrics,
        DataRequirement::MemoryMetrics,
        DataRequirement::DiskMetrics,
        DataRequirement::NetworkMetrics,
        DataRequirement::ErrorLogs,
        DataRequirement::PerformanceLogs,
    ];

    /// Baseline pair used when nothing else can be inferred.
    pub const BASELINE: [DataRequirement; 2] =
        [DataRequirement::CpuMetrics, DataRequirement::MemoryMetrics];

    pub fn as_tag(&self) -> &'static str {
        match self {
            DataRequirement::CpuMetrics => "cpu_metrics",
            DataRequirement::MemoryMetrics => "memory_metrics",
            DataRequirement::DiskMetrics => "disk_metrics",
            DataRequirement::NetworkMetrics => "network_metrics",
            DataRequirement::ErrorLogs => "error_logs",
            DataRequirement::PerformanceLogs => "performance_logs",
        }
    }

    pub fn kind(&self) -> RequirementKind {
        match self {
            DataRequirement::ErrorLogs | DataRequirement::PerformanceLogs => RequirementKind::Logs,
            _ => RequirementKind::Metrics,
        }
    }

    /// Parse a single tag (case-insensitive, `-`/space tolerant).
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|r| r.as_tag() == normalized)
    }

    /// Expand a tag into requirements, accepting the legacy `metrics` and
    /// `logs` umbrella tags. Unknown tags expand to nothing.
    pub fn expand_tag(tag: &str) -> Vec<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "metrics" | "system_metrics" => vec![
                DataRequirement::CpuMetrics,
                DataRequirement::MemoryMetrics,
                DataRequirement::DiskMetrics,
                DataRequirement::NetworkMetrics,
            ],
            "logs" => vec![DataRequirement::ErrorLogs],
            _ => Self::parse_tag(tag).into_iter().collect(),
        }
    }

    /// Normalize a raw tag list: expand, drop unknown tags, de-duplicate
    /// while preserving first-seen order. Returns the accepted requirements
    /// and the tags that were ignored.
    pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> (Vec<Self>, Vec<String>) {
        let mut accepted = Vec::new();
        let mut ignored = Vec::new();
        for tag in tags {
            let expanded = Self::expand_tag(tag.as_ref());
            if expanded.is_empty() {
                ignored.push(tag.as_ref().to_string());
                continue;
            }
            for requirement in expanded {
                if !accepted.contains(&requirement) {
                    accepted.push(requirement);
                }
            }
        }
        (accepted, ignored)
    }
}

impl fmt::Display for DataRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

// ============================================================================
// Records
// ============================================================================

/// One timestamped value in a metric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub value: f64,
}

/// A named metric series as returned by the monitoring API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub points: Vec<MetricPoint>,
}

fn default_scope() -> String {
    "*".to_string()
}

impl MetricSeries {
    pub fn new(metric: impl Into<String>, points: Vec<MetricPoint>) -> Self {
        Self {
            metric: metric.into(),
            scope: default_scope(),
            unit: None,
            points,
        }
    }

    /// The most recent point by timestamp.
    pub fn latest(&self) -> Option<&MetricPoint> {
        self.points.iter().max_by_key(|p| p.timestamp)
    }
}

/// A single log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Level/status string as reported by the source (`error`, `WARN`, ...)
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LogRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            level: level.into(),
            message: message.into(),
            service: None,
            host: None,
            tags: Vec::new(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// What a collector returns for one requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum TelemetryRecords {
    Metrics(Vec<MetricSeries>),
    Logs(Vec<LogRecord>),
}

impl TelemetryRecords {
    pub fn len(&self) -> usize {
        match self {
            TelemetryRecords::Metrics(series) => series.len(),
            TelemetryRecords::Logs(logs) => logs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything collected during one Execution phase, keyed by requirement.
///
/// Built from the settled fan-out results and merged into the reasoning
/// state in one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBundle {
    #[serde(default)]
    pub records: BTreeMap<DataRequirement, TelemetryRecords>,
    /// Requirements whose fetch failed, with the error message.
    #[serde(default)]
    pub failures: BTreeMap<DataRequirement, String>,
}

impl TelemetryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, requirement: DataRequirement, records: TelemetryRecords) {
        self.failures.remove(&requirement);
        self.records.insert(requirement, records);
    }

    pub fn insert_failure(&mut self, requirement: DataRequirement, error: impl Into<String>) {
        self.records.remove(&requirement);
        self.failures.insert(requirement, error.into());
    }

    pub fn requested_count(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    pub fn successful(&self) -> Vec<DataRequirement> {
        self.records.keys().copied().collect()
    }

    pub fn failed(&self) -> Vec<DataRequirement> {
        self.failures.keys().copied().collect()
    }

    /// All metric series across metric requirements.
    pub fn metric_series(&self) -> Vec<(DataRequirement, &MetricSeries)> {
        let mut out = Vec::new();
        for (req, recs) in &self.records {
            if let TelemetryRecords::Metrics(series) = recs {
                out.extend(series.iter().map(|s| (*req, s)));
            }
        }
        out
    }

    /// All log records across log requirements.
    pub fn log_records(&self) -> Vec<(DataRequirement, &LogRecord)> {
        let mut out = Vec::new();
        for (req, recs) in &self.records {
            if let TelemetryRecords::Logs(logs) = recs {
                out.extend(logs.iter().map(|l| (*req, l)));
            }
        }
        out
    }

    /// Merge another bundle; entries from `other` win.
    pub fn merge(&mut self, other: TelemetryBundle) {
        for (req, recs) in other.records {
            self.insert(req, recs);
        }
        for (req, err) in other.failures {
            self.insert_failure(req, err);
        }
    }
}

// ============================================================================
// Collector trait
// ============================================================================

/// Failure of a single collector call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectorError {
    #[error("Unsupported data requirement: {0}")]
    Unsupported(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Fetches telemetry for one requirement. Every call is independently
/// failable; callers must not let one failure abort a batch.
#[async_trait]
pub trait TelemetryCollector: Send + Sync {
    /// Identifier used in logs and traces.
    fn name(&self) -> &str;

    async fn fetch(
        &self,
        requirement: DataRequirement,
        service_filter: Option<&str>,
    ) -> Result<TelemetryRecords, CollectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        assert_eq!(DataRequirement::parse_tag("cpu_metrics"), Some(DataRequirement::CpuMetrics));
        assert_eq!(DataRequirement::parse_tag(" Error-Logs "), Some(DataRequirement::ErrorLogs));
        assert_eq!(DataRequirement::parse_tag("gpu_metrics"), None);
    }

    #[test]
    fn test_normalize_tags_expands_and_dedupes() {
        let (accepted, ignored) =
            DataRequirement::normalize_tags(&["memory_metrics", "metrics", "bogus", "logs"]);
        assert_eq!(
            accepted,
            vec![
                DataRequirement::MemoryMetrics,
                DataRequirement::CpuMetrics,
                DataRequirement::DiskMetrics,
                DataRequirement::NetworkMetrics,
                DataRequirement::ErrorLogs,
            ]
        );
        assert_eq!(ignored, vec!["bogus".to_string()]);
    }

    #[test]
    fn test_requirement_serde_tag() {
        let json = serde_json::to_string(&DataRequirement::PerformanceLogs).unwrap();
        assert_eq!(json, "\"performance_logs\"");
        assert_eq!(DataRequirement::NetworkMetrics.to_string(), "network_metrics");
    }

    #[test]
    fn test_series_latest_uses_timestamp() {
        let series = MetricSeries::new(
            "system.cpu.user",
            vec![
                MetricPoint { timestamp: 3, value: 30.0 },
                MetricPoint { timestamp: 1, value: 10.0 },
            ],
        );
        assert_eq!(series.latest().map(|p| p.value), Some(30.0));
    }

    #[test]
    fn test_bundle_success_and_failure_are_disjoint() {
        let mut bundle = TelemetryBundle::new();
        bundle.insert(DataRequirement::CpuMetrics, TelemetryRecords::Metrics(vec![]));
        bundle.insert_failure(DataRequirement::DiskMetrics, "timeout");
        bundle.insert_failure(DataRequirement::CpuMetrics, "boom");

        assert_eq!(bundle.successful(), Vec::<DataRequirement>::new());
        assert_eq!(
            bundle.failed(),
            vec![DataRequirement::CpuMetrics, DataRequirement::DiskMetrics]
        );
        assert_eq!(bundle.requested_count(), 2);
    }

    #[test]
    fn test_bundle_serializes_with_tag_keys() {
        let mut bundle = TelemetryBundle::new();
        bundle.insert(
            DataRequirement::ErrorLogs,
            TelemetryRecords::Logs(vec![LogRecord::new("error", "db down")]),
        );
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["records"]["error_logs"]["kind"], "logs");

        let parsed: TelemetryBundle = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, bundle);
    }
}
