//! Chat Context Formatting
//!
//! Builds the single query string handed to the orchestrator: prior
//! conversation turns plus the new request, bounded in size. The oldest
//! turns are dropped first; the new request is always kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HISTORY_HEADER: &str = "=== History ===\n";
const NEW_REQUEST_HEADER: &str = "=== New request ===\nUser: ";
/// Headroom kept under the budget for separators.
const SAFETY_BUFFER: usize = 100;

/// One prior exchange with the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub prompt: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn render(&self) -> String {
        format!(
            "[{}] User: {}\nAssistant: {}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.prompt.trim(),
            self.answer.trim()
        )
    }
}

/// Size-bounded history formatter.
#[derive(Debug, Clone, Copy)]
pub struct ContextFormatter {
    pub max_context_chars: usize,
    pub max_messages: usize,
}

impl Default for ContextFormatter {
    fn default() -> Self {
        Self {
            max_context_chars: 4000,
            max_messages: 20,
        }
    }
}

impl ContextFormatter {
    pub fn new(max_context_chars: usize, max_messages: usize) -> Self {
        Self {
            max_context_chars,
            max_messages,
        }
    }

    pub fn format_chat_context(&self, history: &[ChatMessage], new_prompt: &str) -> String {
        let request = format!("{}{}", NEW_REQUEST_HEADER, new_prompt.trim());

        let mut ordered: Vec<&ChatMessage> = history.iter().collect();
        ordered.sort_by_key(|m| m.timestamp);
        let skip = ordered.len().saturating_sub(self.max_messages);
        let mut entries: Vec<String> = ordered[skip..].iter().map(|m| m.render()).collect();

        let budget = self.max_context_chars.saturating_sub(SAFETY_BUFFER);
        let request_len = request.chars().count();
        loop {
            if entries.is_empty() {
                return request;
            }
            let history_len: usize = HISTORY_HEADER.chars().count()
                + entries.iter().map(|e| e.chars().count() + 2).sum::<usize>();
            if history_len + request_len <= budget {
                break;
            }
            entries.remove(0);
        }

        format!("{}{}\n\n{}", HISTORY_HEADER, entries.join("\n\n"), request)
    }
}

/// The newest request inside a formatted context, or the whole text when it
/// carries no history sections.
pub fn extract_new_request(context: &str) -> &str {
    match context.rfind(NEW_REQUEST_HEADER) {
        Some(pos) => context[pos + NEW_REQUEST_HEADER.len()..].trim(),
        None => context.trim(),
    }
}
