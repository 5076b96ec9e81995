//! Reasoning Pipeline
//!
//! Planning -> Execution -> Feedback over a per-session `ReasoningState`.
//!
//! Each phase composes a bounded context from the state, asks the LLM for a
//! phase-specific JSON object, falls back to deterministic rules when the
//! answer is missing or malformed, records a `ReasoningStep` and commits
//! its artifact. The orchestrator sequences the phases and turns any phase
//! failure into a recorded error.

pub mod evidence;
pub mod execution;
pub mod feedback;
pub mod orchestrator;
pub mod parse;
pub mod planning;
pub mod prompts;
pub mod types;

use async_trait::async_trait;
use ops_reasoner_core::{
    PipelineConfig, ReasoningPhase, ReasoningState, ReasoningTracer, TelemetryCollector,
};
use ops_reasoner_llm::{LlmProvider, LlmRequestOptions, LlmResult, Message};
use ops_reasoner_rules::RuleEngine;

use crate::utils::error::AppResult;

pub use evidence::{format_bundle, format_rule_analysis};
pub use execution::ExecutionPhase;
pub use feedback::FeedbackPhase;
pub use orchestrator::{extract_answer, session_summary, Orchestrator, SessionSummary};
pub use parse::{extract_json_object, parse_phase_json, ParseFailure};
pub use planning::PlanningPhase;
pub use types::{
    execution_artifact, feedback_output, planning_output, CollectionSummary, ExecutionAnalysis,
    ExecutionArtifact, FailedCollection, FeedbackOutput, PhaseOutput, PlanningOutput,
};

/// Collaborators a phase may use. Borrowed from the orchestrator for the
/// duration of one session.
pub struct PhaseContext<'a> {
    pub llm: &'a dyn LlmProvider,
    pub collector: &'a dyn TelemetryCollector,
    pub rules: &'a RuleEngine,
    pub tracer: &'a dyn ReasoningTracer,
    pub config: &'a PipelineConfig,
}

impl PhaseContext<'_> {
    /// One JSON-mode completion. Returns the raw text.
    pub async fn ask_llm(
        &self,
        system: String,
        user: String,
        temperature: f32,
    ) -> LlmResult<String> {
        let options = LlmRequestOptions {
            temperature_override: Some(temperature),
            json_response: true,
            ..Default::default()
        };
        let response = self
            .llm
            .send_message(vec![Message::user(user)], Some(system), options)
            .await?;
        Ok(response.text().to_string())
    }
}

/// One stage of the pipeline.
#[async_trait]
pub trait PhaseRunner: Send + Sync {
    fn phase(&self) -> ReasoningPhase;

    /// Run the phase against the session state. Degradable failures (LLM
    /// unavailable, unparseable output, collector errors) are handled inside;
    /// an `Err` here is recorded by the orchestrator as a phase failure.
    async fn run(&self, ctx: &PhaseContext<'_>, state: &mut ReasoningState) -> AppResult<()>;
}

/// The standard three runners, in order.
pub fn default_phases() -> Vec<Box<dyn PhaseRunner>> {
    vec![
        Box::new(PlanningPhase),
        Box::new(ExecutionPhase),
        Box::new(FeedbackPhase),
    ]
}
