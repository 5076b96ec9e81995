//! Reasoning Orchestrator
//!
//! Owns the phase sequence for one session and the collaborators the phases
//! borrow. A phase that returns an error or panics is recorded on the state
//! and the pipeline moves on to the next phase, so `process` always returns
//! a `ReasoningState`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use ops_reasoner_core::{
    ExecutionSummary, PipelineConfig, ReasoningPhase, ReasoningState, ReasoningStep,
    ReasoningTracer, TelemetryCollector,
};
use ops_reasoner_llm::LlmProvider;
use ops_reasoner_rules::{classify_request, RuleEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::parse::{value_to_list, value_to_text};
use super::types::{execution_artifact, feedback_output};
use super::{default_phases, PhaseContext, PhaseRunner};
use crate::services::history::extract_new_request;
use crate::utils::error::{AppError, AppResult};

pub struct Orchestrator {
    llm: Arc<dyn LlmProvider>,
    collector: Arc<dyn TelemetryCollector>,
    rules: RuleEngine,
    tracer: Arc<dyn ReasoningTracer>,
    config: PipelineConfig,
    phases: Vec<Box<dyn PhaseRunner>>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        collector: Arc<dyn TelemetryCollector>,
        rules: RuleEngine,
        tracer: Arc<dyn ReasoningTracer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            llm,
            collector,
            rules,
            tracer,
            config,
            phases: default_phases(),
        }
    }

    /// Replace the phase runners. Phases must be non-empty and strictly
    /// ordered Planning -> Execution -> Feedback.
    pub fn with_phases(mut self, phases: Vec<Box<dyn PhaseRunner>>) -> AppResult<Self> {
        if phases.is_empty() {
            return Err(AppError::validation("at least one phase is required"));
        }
        for pair in phases.windows(2) {
            if pair[0].phase() >= pair[1].phase() {
                return Err(AppError::validation(format!(
                    "phase {} cannot run after {}",
                    pair[1].phase(),
                    pair[0].phase()
                )));
            }
        }
        self.phases = phases;
        Ok(self)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    /// Run every phase for `query` and return the final state.
    pub async fn process(&self, query: &str) -> ReasoningState {
        let mut state = ReasoningState::new(query);
        let request_type = classify_request(extract_new_request(query));
        state.set_request_type(request_type.as_str());

        info!(
            "[Orchestrator] session {} started ({})",
            state.session_id(),
            request_type
        );
        self.tracer.session_started(&state);

        self.run_phases(&mut state).await;

        info!(
            "[Orchestrator] session {} finished: complete={} errors={} confidence={:.2}",
            state.session_id(),
            state.is_complete(),
            state.error_messages().len(),
            state.total_confidence()
        );
        self.tracer.session_completed(&state);
        state
    }

    /// Like [`process`](Self::process), but abandons the session when
    /// `cancel` fires. The in-flight phase is dropped.
    pub async fn process_with_cancel(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> AppResult<ReasoningState> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("[Orchestrator] session cancelled");
                Err(AppError::Cancelled)
            }
            state = self.process(query) => Ok(state),
        }
    }

    async fn run_phases(&self, state: &mut ReasoningState) {
        let ctx = PhaseContext {
            llm: self.llm.as_ref(),
            collector: self.collector.as_ref(),
            rules: &self.rules,
            tracer: self.tracer.as_ref(),
            config: &self.config,
        };

        for runner in &self.phases {
            let phase = runner.phase();
            state.enter_phase(phase);
            self.tracer.phase_started(state.session_id(), phase);

            let result = match AssertUnwindSafe(runner.run(&ctx, state))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => Err(AppError::phase(phase, panic_message(payload.as_ref()))),
            };

            match result {
                Ok(()) => {
                    if phase == ReasoningPhase::Feedback {
                        state.mark_complete();
                    }
                }
                Err(e) => {
                    let message = phase_error_message(phase, e);
                    error!("[Orchestrator] {}", message);
                    self.tracer.error(state.session_id(), &message);
                    state.record_error(message);
                }
            }
        }
    }
}

fn phase_error_message(phase: ReasoningPhase, err: AppError) -> String {
    match err {
        AppError::Phase { .. } => err.to_string(),
        other => AppError::phase(phase, other.to_string()).to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

// ============================================================================
// Answer extraction
// ============================================================================

/// Final text for the operator, taken from the most specific source that
/// has something to say.
pub fn extract_answer(state: &ReasoningState) -> String {
    if let Some(feedback) = feedback_output(state) {
        let feedback = feedback.value();
        if !feedback.summary.trim().is_empty() {
            return feedback.summary.clone();
        }
        if !feedback.recommendations.is_empty() {
            return feedback.recommendations.join("\n");
        }
    }

    if let Some(artifact) = execution_artifact(state) {
        let analysis = artifact.llm_analysis.value();
        if !analysis.main_response.trim().is_empty() {
            return analysis.main_response.clone();
        }
        if !analysis.analysis_results.trim().is_empty() {
            return analysis.analysis_results.clone();
        }
    }

    if let Some(text) = state.latest_step().and_then(step_text) {
        return text;
    }

    format!(
        "Analysis completed. Processed {} reasoning steps.",
        state.steps().len()
    )
}

fn step_text(step: &ReasoningStep) -> Option<String> {
    ["main_response", "summary", "recommendations"]
        .iter()
        .filter_map(|key| step.output.get(*key))
        .map(|value| match value {
            Value::Array(_) => value_to_list(value).join("\n"),
            other => value_to_text(other),
        })
        .find(|text| !text.is_empty())
}

/// Caller-visible record of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    pub execution_summary: ExecutionSummary,
    pub identified_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub action_plan: Vec<String>,
    pub errors: Vec<String>,
    pub reasoning_trace: Vec<ReasoningStep>,
}

pub fn session_summary(state: &ReasoningState) -> SessionSummary {
    SessionSummary {
        session_id: state.session_id().to_string(),
        user_query: state.user_query().to_string(),
        request_type: state.request_type().map(str::to_string),
        execution_summary: state.execution_summary(),
        identified_issues: state.identified_issues().to_vec(),
        recommendations: state.recommendations().to_vec(),
        action_plan: state.action_plan().to_vec(),
        errors: state.error_messages().to_vec(),
        reasoning_trace: state.steps().to_vec(),
    }
}
