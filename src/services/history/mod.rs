//! Chat History
//!
//! Conversation store client and the formatter that turns prior turns plus
//! a new prompt into the orchestrator's query.

pub mod backend;
pub mod context_formatter;

pub use backend::{BackendClient, BackendError, ChatBackend, ServiceInfo};
pub use context_formatter::{extract_new_request, ChatMessage, ContextFormatter};
