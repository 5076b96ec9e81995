//! Ops Reasoner Rules
//!
//! Static, LLM-independent analysis for the reasoning pipeline:
//!
//! - `models` - Analysis result types (HealthStatus, MetricAnalysis, LogAnalysis, etc.)
//! - `tables` - Ordered keyword rule tables (severity, category, data requirements, request type)
//! - `engine` - Threshold evaluation, log analysis and recommendation generation
//!
//! Thresholds default to built-in values and can be overridden from a TOML file.

pub mod engine;
pub mod models;
pub mod tables;

// Re-export engine
pub use engine::{
    estimate_resolution_time, generic_recommendations, immediate_actions,
    recommendations_for_log, RuleEngine, ThresholdTable,
};

// Re-export model types
pub use models::{
    BundleAnalysis, ErrorThresholds, HealthStatus, IssueSeverity, LevelClass, LogAnalysis,
    LogCategory, LogIssue, LogSeverity, MetricAnalysis, MetricIssue, MetricSnapshot,
    RecommendationSet, RequestType, ServiceRule, ThresholdRule,
};

// Re-export rule-table lookups
pub use tables::{
    category_for_message, classify_request, fallback_requirements, level_class,
    severity_for_level,
};
