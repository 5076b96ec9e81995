//! Session Runner
//!
//! One operator request end to end: resolve the service's monitoring
//! credentials, fold the conversation history into the query, run a fresh
//! orchestrator, and store the answer back in the conversation.

use std::sync::Arc;
use std::time::Instant;

use ops_reasoner_core::{
    PipelineConfig, ProxyConfig, ReasoningState, ReasoningTracer, TelemetryCollector,
};
use ops_reasoner_llm::LlmProvider;
use ops_reasoner_rules::RuleEngine;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::history::{BackendError, ChatBackend, ContextFormatter, ServiceInfo};
use super::reasoning::{extract_answer, session_summary, Orchestrator, SessionSummary};
use super::telemetry::DatadogCollector;
use crate::models::settings::DatadogSettings;
use crate::utils::error::{AppError, AppResult};

/// Builds the telemetry collector for one service.
pub trait CollectorFactory: Send + Sync {
    fn build(&self, service: &ServiceInfo) -> AppResult<Arc<dyn TelemetryCollector>>;
}

/// Datadog collector per service, using the service's own keys.
pub struct DatadogCollectorFactory {
    settings: DatadogSettings,
    proxy: Option<ProxyConfig>,
}

impl DatadogCollectorFactory {
    pub fn new(settings: DatadogSettings, proxy: Option<ProxyConfig>) -> Self {
        Self { settings, proxy }
    }
}

impl CollectorFactory for DatadogCollectorFactory {
    fn build(&self, service: &ServiceInfo) -> AppResult<Arc<dyn TelemetryCollector>> {
        let (api_key, app_key) = service.credentials()?;
        let collector = DatadogCollector::with_credentials(
            &self.settings,
            api_key,
            app_key,
            self.proxy.as_ref(),
        )?;
        Ok(Arc::new(collector))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub service_id: String,
    pub session_id: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub service_id: String,
    pub prompt: String,
    pub answer: String,
    /// `completed`, `completed_with_errors` or `incomplete`
    pub status: String,
    pub has_errors: bool,
    pub errors: Vec<String>,
    pub execution_time_ms: u64,
    pub summary: SessionSummary,
}

pub struct SessionRunner {
    backend: Arc<dyn ChatBackend>,
    collectors: Arc<dyn CollectorFactory>,
    llm: Arc<dyn LlmProvider>,
    tracer: Arc<dyn ReasoningTracer>,
    rules: RuleEngine,
    pipeline: PipelineConfig,
}

impl SessionRunner {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        collectors: Arc<dyn CollectorFactory>,
        llm: Arc<dyn LlmProvider>,
        tracer: Arc<dyn ReasoningTracer>,
        rules: RuleEngine,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            collectors,
            llm,
            tracer,
            rules,
            pipeline,
        }
    }

    pub async fn run(&self, request: SessionRequest) -> AppResult<SessionOutcome> {
        self.run_with_cancel(request, &CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        request: SessionRequest,
        cancel: &CancellationToken,
    ) -> AppResult<SessionOutcome> {
        let started = Instant::now();
        if request.prompt.trim().is_empty() {
            return Err(AppError::validation("prompt must not be empty"));
        }

        let service = self.backend.get_service_info(&request.service_id).await?;
        let collector = self.collectors.build(&service)?;

        let history = match self.backend.get_history(&request.session_id).await {
            Ok(history) => history,
            Err(BackendError::SessionNotFound(id)) => {
                debug!("[Session] no history for session {}", id);
                Vec::new()
            }
            Err(BackendError::Unauthorized) => return Err(BackendError::Unauthorized.into()),
            Err(e) => {
                warn!("[Session] history unavailable, continuing without it: {}", e);
                Vec::new()
            }
        };
        let formatter = ContextFormatter::new(
            self.pipeline.max_context_chars,
            self.pipeline.max_history_messages,
        );
        let query = formatter.format_chat_context(&history, &request.prompt);
        info!(
            "[Session] service={} session={} history={} query_chars={}",
            request.service_id,
            request.session_id,
            history.len(),
            query.chars().count()
        );

        let orchestrator = Orchestrator::new(
            self.llm.clone(),
            collector,
            self.rules.clone(),
            self.tracer.clone(),
            self.pipeline.clone(),
        );
        let state = orchestrator.process_with_cancel(&query, cancel).await?;
        let answer = extract_answer(&state);

        match self
            .backend
            .append(&request.session_id, &request.prompt, &answer)
            .await
        {
            Ok(()) => {}
            Err(BackendError::Unauthorized) => return Err(BackendError::Unauthorized.into()),
            Err(e) => warn!("[Session] failed to store answer: {}", e),
        }

        Ok(SessionOutcome {
            status: outcome_status(&state).to_string(),
            has_errors: state.has_errors(),
            errors: state.error_messages().to_vec(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            summary: session_summary(&state),
            session_id: request.session_id,
            service_id: request.service_id,
            prompt: request.prompt,
            answer,
        })
    }
}

fn outcome_status(state: &ReasoningState) -> &'static str {
    match (state.is_complete(), state.has_errors()) {
        (_, true) => "completed_with_errors",
        (true, false) => "completed",
        (false, false) => "incomplete",
    }
}
