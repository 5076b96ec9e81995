//! Session Runner Integration Tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ops_reasoner::services::history::{BackendError, ChatBackend, ChatMessage, ServiceInfo};
use ops_reasoner::services::{CollectorFactory, SessionRequest, SessionRunner};
use ops_reasoner::{AppError, AppResult};
use ops_reasoner_core::{DataRequirement, PipelineConfig, TelemetryCollector};
use ops_reasoner_rules::RuleEngine;

use crate::support::{RecordingTracer, ScriptedCollector, ScriptedLlm};

struct SharedFactory(Arc<ScriptedCollector>);

impl CollectorFactory for SharedFactory {
    fn build(&self, service: &ServiceInfo) -> AppResult<Arc<dyn TelemetryCollector>> {
        service.credentials()?;
        Ok(self.0.clone())
    }
}

struct StubBackend {
    service: ServiceInfo,
    history: Result<Vec<ChatMessage>, BackendError>,
    stored: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatBackend for StubBackend {
    async fn get_service_info(&self, _service_id: &str) -> Result<ServiceInfo, BackendError> {
        Ok(self.service.clone())
    }

    async fn get_history(&self, _session_id: &str) -> Result<Vec<ChatMessage>, BackendError> {
        self.history.clone()
    }

    async fn append(
        &self,
        _session_id: &str,
        _prompt: &str,
        answer: &str,
    ) -> Result<(), BackendError> {
        self.stored.lock().unwrap().push(answer.to_string());
        Ok(())
    }
}

fn service_with_keys() -> ServiceInfo {
    ServiceInfo {
        id: "svc-42".to_string(),
        name: Some("orders".to_string()),
        api_key: Some("dd-api".to_string()),
        app_key: Some("dd-app".to_string()),
    }
}

fn runner(backend: Arc<StubBackend>, collector: Arc<ScriptedCollector>) -> SessionRunner {
    SessionRunner::new(
        backend,
        Arc::new(SharedFactory(collector)),
        Arc::new(ScriptedLlm::offline()),
        Arc::new(RecordingTracer::default()),
        RuleEngine::new(),
        PipelineConfig::default(),
    )
}

fn request(prompt: &str) -> SessionRequest {
    SessionRequest {
        service_id: "svc-42".to_string(),
        session_id: "conv-7".to_string(),
        prompt: prompt.to_string(),
    }
}

#[tokio::test]
async fn test_history_is_folded_into_query() {
    let backend = Arc::new(StubBackend {
        service: service_with_keys(),
        history: Ok(vec![ChatMessage {
            prompt: "any memory pressure?".to_string(),
            answer: "memory is fine".to_string(),
            timestamp: Utc::now() - ChronoDuration::minutes(5),
        }]),
        stored: Mutex::new(Vec::new()),
    });
    let collector = Arc::new(ScriptedCollector::healthy());

    let outcome = runner(backend.clone(), collector.clone())
        .run(request("check disk usage"))
        .await
        .unwrap();

    assert_eq!(collector.requested(), vec![DataRequirement::DiskMetrics]);
    assert!(outcome.summary.user_query.contains("any memory pressure?"));
    assert!(outcome.summary.user_query.ends_with("User: check disk usage"));
    assert_eq!(outcome.prompt, "check disk usage");
    assert_eq!(outcome.status, "completed");
    assert_eq!(backend.stored.lock().unwrap().as_slice(), &[outcome.answer.clone()]);
}

#[tokio::test]
async fn test_missing_history_is_not_an_error() {
    let backend = Arc::new(StubBackend {
        service: service_with_keys(),
        history: Err(BackendError::SessionNotFound("conv-7".to_string())),
        stored: Mutex::new(Vec::new()),
    });
    let outcome = runner(backend, Arc::new(ScriptedCollector::healthy()))
        .run(request("check cpu"))
        .await
        .unwrap();

    assert!(!outcome.has_errors);
    assert_eq!(outcome.summary.user_query, "=== New request ===\nUser: check cpu");
}

#[tokio::test]
async fn test_missing_keys_short_circuit_before_planning() {
    let mut service = service_with_keys();
    service.app_key = None;
    let backend = Arc::new(StubBackend {
        service,
        history: Ok(Vec::new()),
        stored: Mutex::new(Vec::new()),
    });
    let collector = Arc::new(ScriptedCollector::healthy());

    let err = runner(backend.clone(), collector.clone())
        .run(request("check cpu"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Backend(BackendError::MissingCredentials(_))
    ));
    assert!(collector.requested().is_empty());
    assert!(backend.stored.lock().unwrap().is_empty());
}
