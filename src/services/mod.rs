//! Services
//!
//! The reasoning pipeline and the collaborators it talks to.

pub mod history;
pub mod reasoning;
pub mod session;
pub mod telemetry;
pub mod trace;

pub use history::{BackendClient, BackendError, ChatBackend, ChatMessage, ContextFormatter};
pub use reasoning::{extract_answer, session_summary, Orchestrator, SessionSummary};
pub use session::{
    CollectorFactory, DatadogCollectorFactory, SessionOutcome, SessionRequest, SessionRunner,
};
pub use telemetry::DatadogCollector;
pub use trace::LogTracer;
