//! Chat-History Backend Client
//!
//! HTTP client for the service registry and conversation store: service
//! credentials lookup, history retrieval and answer persistence.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ops_reasoner_core::ProxyConfig;
use ops_reasoner_llm::build_http_client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::context_formatter::ChatMessage;
use crate::models::settings::BackendSettings;

/// Backend client errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Monitoring credentials missing for service {0}")]
    MissingCredentials(String),
}

/// Registered service with its monitoring credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, rename = "appKey", skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
}

impl ServiceInfo {
    /// Both monitoring keys, or `MissingCredentials`.
    pub fn credentials(&self) -> Result<(&str, &str), BackendError> {
        match (self.api_key.as_deref(), self.app_key.as_deref()) {
            (Some(api), Some(app)) if !api.is_empty() && !app.is_empty() => Ok((api, app)),
            _ => Err(BackendError::MissingCredentials(self.id.clone())),
        }
    }
}

/// Service registry and conversation store used by the session runner.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn get_service_info(&self, service_id: &str) -> Result<ServiceInfo, BackendError>;

    async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, BackendError>;

    async fn append(&self, session_id: &str, prompt: &str, answer: &str)
        -> Result<(), BackendError>;
}

/// Message shape stored by the backend.
#[derive(Debug, Deserialize)]
struct StoredMessage {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    answer: String,
    #[serde(default, alias = "created_at", alias = "createdAt")]
    timestamp: Option<DateTime<Utc>>,
}

/// What a resource lookup is for, so a 404 maps to the right error.
#[derive(Debug, Clone, Copy)]
enum Resource<'a> {
    Service(&'a str),
    Session(&'a str),
}

pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl BackendClient {
    pub fn new(
        settings: &BackendSettings,
        proxy: Option<&ProxyConfig>,
        bearer_token: Option<String>,
    ) -> Result<Self, BackendError> {
        let client = build_http_client(proxy, Duration::from_secs(settings.timeout_secs))
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        resource: Resource<'_>,
    ) -> Result<String, BackendError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        match status {
            200..=299 => Ok(body),
            other => Err(map_status(other, &body, resource)),
        }
    }

    /// `GET /api/services/{id}`
    pub async fn get_service_info(&self, service_id: &str) -> Result<ServiceInfo, BackendError> {
        let url = format!("{}/api/services/{}", self.base_url, service_id);
        let body = self
            .send(self.client.get(&url), Resource::Service(service_id))
            .await?;
        let mut info: ServiceInfo = serde_json::from_str(&body).map_err(|e| BackendError::Api {
            status: 200,
            message: format!("invalid service payload: {}", e),
        })?;
        if info.id.is_empty() {
            info.id = service_id.to_string();
        }
        debug!("[Backend] service {} loaded", service_id);
        Ok(info)
    }

    /// `GET /api/sessions/{id}/get_messages`
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, BackendError> {
        let url = format!("{}/api/sessions/{}/get_messages", self.base_url, session_id);
        let body = self
            .send(self.client.get(&url), Resource::Session(session_id))
            .await?;
        let messages = parse_history(&body)?;
        debug!(
            "[Backend] {} history messages for session {}",
            messages.len(),
            session_id
        );
        Ok(messages)
    }

    /// `POST /api/sessions/{id}/add_message`
    pub async fn append(
        &self,
        session_id: &str,
        prompt: &str,
        answer: &str,
    ) -> Result<(), BackendError> {
        let url = format!("{}/api/sessions/{}/add_message", self.base_url, session_id);
        let payload = serde_json::json!({
            "prompt": prompt,
            "answer": answer,
            "timestamp": Utc::now(),
        });
        self.send(
            self.client.post(&url).json(&payload),
            Resource::Session(session_id),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for BackendClient {
    async fn get_service_info(&self, service_id: &str) -> Result<ServiceInfo, BackendError> {
        BackendClient::get_service_info(self, service_id).await
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, BackendError> {
        BackendClient::get_history(self, session_id).await
    }

    async fn append(
        &self,
        session_id: &str,
        prompt: &str,
        answer: &str,
    ) -> Result<(), BackendError> {
        BackendClient::append(self, session_id, prompt, answer).await
    }
}

fn map_status(status: u16, body: &str, resource: Resource<'_>) -> BackendError {
    match (status, resource) {
        (404, Resource::Service(id)) => BackendError::ServiceNotFound(id.to_string()),
        (404, Resource::Session(id)) => BackendError::SessionNotFound(id.to_string()),
        (401 | 403, _) => BackendError::Unauthorized,
        (status, _) => BackendError::Api {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

/// Accept `{"messages": [...]}` or a bare array.
fn parse_history(body: &str) -> Result<Vec<ChatMessage>, BackendError> {
    let value: Value = serde_json::from_str(body).map_err(|e| BackendError::Api {
        status: 200,
        message: format!("invalid history payload: {}", e),
    })?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    let now = Utc::now();
    let messages = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<StoredMessage>(item).ok())
        .filter(|m| !m.prompt.is_empty() || !m.answer.is_empty())
        .map(|m| ChatMessage {
            prompt: m.prompt,
            answer: m.answer,
            timestamp: m.timestamp.unwrap_or(now),
        })
        .collect();
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            map_status(404, "", Resource::Service("svc")),
            BackendError::ServiceNotFound("svc".into())
        );
        assert_eq!(
            map_status(404, "", Resource::Session("s1")),
            BackendError::SessionNotFound("s1".into())
        );
        assert_eq!(map_status(403, "", Resource::Session("s1")), BackendError::Unauthorized);
        assert!(matches!(
            map_status(502, "bad gateway", Resource::Service("svc")),
            BackendError::Api { status: 502, .. }
        ));
    }

    #[test]
    fn test_parse_history_wrapped_and_bare() {
        let wrapped = r#"{"messages": [
            {"prompt": "cpu?", "answer": "fine", "timestamp": "2024-05-01T12:00:00Z"},
            {"prompt": "", "answer": ""}
        ]}"#;
        let messages = parse_history(wrapped).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].prompt, "cpu?");

        let bare = r#"[{"prompt": "disk?", "answer": "90%", "created_at": "2024-05-01T12:00:00Z"}]"#;
        let messages = parse_history(bare).unwrap();
        assert_eq!(messages[0].answer, "90%");

        assert!(parse_history("{}").unwrap().is_empty());
        assert!(parse_history("not json").is_err());
    }

    #[test]
    fn test_service_info_credentials() {
        let info: ServiceInfo =
            serde_json::from_str(r#"{"id": "svc", "apiKey": "a", "appKey": "b"}"#).unwrap();
        assert_eq!(info.credentials().unwrap(), ("a", "b"));

        let missing: ServiceInfo = serde_json::from_str(r#"{"id": "svc", "apiKey": "a"}"#).unwrap();
        assert_eq!(
            missing.credentials().unwrap_err(),
            BackendError::MissingCredentials("svc".into())
        );
    }

    #[test]
    fn test_client_trims_base_url() {
        let settings = BackendSettings {
            base_url: "http://localhost:8080/".into(),
            timeout_secs: 5,
        };
        let client = BackendClient::new(&settings, None, Some(String::new())).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert!(client.bearer_token.is_none());
    }
}
