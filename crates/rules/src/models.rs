//! Rule Engine Models
//!
//! Data structures produced by threshold and log analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Overall health of an analyzed data set. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// The worse of two statuses.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        self.max(other)
    }

    /// Priority label used in recommendation sets.
    pub fn priority(&self) -> &'static str {
        match self {
            HealthStatus::Critical => "high",
            HealthStatus::Warning => "medium",
            HealthStatus::Healthy => "low",
        }
    }

    pub fn estimated_resolution_time(&self) -> &'static str {
        match self {
            HealthStatus::Critical => "Immediate (0-30 minutes)",
            HealthStatus::Warning => "Short-term (1-4 hours)",
            HealthStatus::Healthy => "Routine maintenance (1-7 days)",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Severity of a threshold breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Warning => write!(f, "warning"),
            IssueSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Warning/critical bounds for one metric. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub warning: f64,
    pub critical: f64,
    /// Advice attached to any breach of this metric.
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ThresholdRule {
    pub fn new(warning: f64, critical: f64) -> Self {
        Self {
            warning,
            critical,
            recommendations: Vec::new(),
        }
    }

    pub fn with_recommendations(mut self, recommendations: &[&str]) -> Self {
        self.recommendations = recommendations.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Classify a value; `None` means below the warning bound.
    pub fn classify(&self, value: f64) -> Option<IssueSeverity> {
        if value >= self.critical {
            Some(IssueSeverity::Critical)
        } else if value >= self.warning {
            Some(IssueSeverity::Warning)
        } else {
            None
        }
    }
}

/// Per-service limits, checked in addition to the global thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_time_ms: Option<f64>,
}

/// Error-volume thresholds for log analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorThresholds {
    /// Error count at which log status escalates to critical.
    pub critical_error_count: usize,
    /// Global ceiling for `response_time_avg`, in milliseconds.
    pub response_time_ms: f64,
}

impl Default for ErrorThresholds {
    fn default() -> Self {
        Self {
            critical_error_count: 10,
            response_time_ms: 5000.0,
        }
    }
}

/// Current values for a set of metrics, keyed by normalized metric name
/// (`cpu_usage`, `memory_usage`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.values.insert(metric.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricIssue {
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: IssueSeverity,
    pub message: String,
}

/// Result of analyzing one metric snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub status: HealthStatus,
    pub issues: Vec<MetricIssue>,
    pub recommendations: Vec<String>,
}

impl MetricAnalysis {
    pub fn healthy(service: Option<String>) -> Self {
        Self {
            service,
            status: HealthStatus::Healthy,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

// ============================================================================
// Logs
// ============================================================================

/// Severity assigned to a log record by level lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSeverity::High => write!(f, "high"),
            LogSeverity::Medium => write!(f, "medium"),
            LogSeverity::Low => write!(f, "low"),
        }
    }
}

/// Category assigned to a log record by keyword lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Authentication,
    Connectivity,
    Database,
    Api,
    General,
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogCategory::Authentication => write!(f, "authentication"),
            LogCategory::Connectivity => write!(f, "connectivity"),
            LogCategory::Database => write!(f, "database"),
            LogCategory::Api => write!(f, "api"),
            LogCategory::General => write!(f, "general"),
        }
    }
}

/// Normalized level bucket used for counting and action selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelClass {
    Critical,
    Error,
    Warning,
    Info,
}

/// One error-or-worse log record, classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogIssue {
    pub service: String,
    pub level: String,
    pub severity: LogSeverity,
    pub category: LogCategory,
    pub message: String,
}

/// Result of analyzing a batch of log records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogAnalysis {
    pub total_logs: usize,
    pub critical_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub status: HealthStatus,
    pub issues: Vec<LogIssue>,
    pub recommendations: Vec<String>,
    pub immediate_actions: Vec<String>,
}

impl LogAnalysis {
    pub fn empty() -> Self {
        Self {
            total_logs: 0,
            critical_count: 0,
            error_count: 0,
            warning_count: 0,
            status: HealthStatus::Healthy,
            issues: Vec::new(),
            recommendations: Vec::new(),
            immediate_actions: Vec::new(),
        }
    }

    pub fn total_issues(&self) -> usize {
        self.critical_count + self.error_count + self.warning_count
    }
}

// ============================================================================
// Combined results
// ============================================================================

/// Rule-engine view of everything collected in one Execution phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleAnalysis {
    pub status: HealthStatus,
    pub metrics: MetricAnalysis,
    pub logs: LogAnalysis,
    /// successful / requested, 1.0 when nothing was requested
    pub collection_success_rate: f64,
    /// `complete` or `partial`
    pub data_availability: String,
    /// Human-readable issue lines for the reasoning state
    pub issues_summary: Vec<String>,
    pub recommendations: Vec<String>,
    pub immediate_actions: Vec<String>,
    pub requires_immediate_attention: bool,
}

/// Final rule-based advice for the Feedback phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub status: HealthStatus,
    pub priority: String,
    pub recommendations: Vec<String>,
    pub action_plan: Vec<String>,
    pub estimated_resolution_time: String,
    pub requires_escalation: bool,
}

/// Coarse intent of an operator query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Monitoring,
    Question,
    Analysis,
    Other,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Monitoring => "monitoring",
            RequestType::Question => "question",
            RequestType::Analysis => "analysis",
            RequestType::Other => "other",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
