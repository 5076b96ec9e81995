//! Ops Reasoner
//!
//! Answers operator questions about monitored services with a three-phase
//! reasoning pipeline:
//! - Planning: decide which telemetry to collect
//! - Execution: collect it, check it against thresholds, interpret it
//! - Feedback: turn the analysis into recommendations and an action plan
//!
//! Every phase degrades to deterministic rules when the LLM is unavailable.

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export commonly used items
pub use models::settings::{AppConfig, BackendSettings, DatadogSettings};
pub use services::{
    extract_answer, session_summary, DatadogCollector, LogTracer, Orchestrator, SessionOutcome,
    SessionRequest, SessionRunner, SessionSummary,
};
pub use storage::config::ConfigService;
pub use utils::error::{AppError, AppResult};
