//! Ops Reasoner LLM
//!
//! Unified interface for the language model used by the reasoning phases:
//! message/response types, the `LlmProvider` trait, an HTTP client factory
//! with proxy support, and an OpenAI-compatible chat-completions provider.

pub mod http_client;
pub mod openai;
pub mod provider;
pub mod types;

// Re-export main types
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use types::*;
