//! Feedback Phase
//!
//! Produces the final answer: rule-based recommendations for whatever was
//! collected, refined by the model when it answers usefully.

use std::time::Instant;

use async_trait::async_trait;
use ops_reasoner_core::{ArtifactKey, ReasoningPhase, ReasoningState, ReasoningStep};
use ops_reasoner_rules::RecommendationSet;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::parse::{parse_phase_json, value_to_list, value_to_text, ParseFailure};
use super::prompts::{feedback_system, feedback_user, FEEDBACK_REQUIRED_KEYS};
use super::types::{
    execution_artifact, planning_output, ExecutionAnalysis, FeedbackOutput, PhaseOutput,
};
use super::{PhaseContext, PhaseRunner};
use crate::utils::error::AppResult;

const RULE_AGENT: &str = "ProtocolAgent";
const AGENT_NAME: &str = "FeedbackAgent";

#[derive(Debug, Deserialize)]
struct RawFeedback {
    summary: Value,
    recommendations: Value,
    action_plan: Value,
    #[serde(default)]
    additional_help: Value,
    priority: Value,
}

pub struct FeedbackPhase;

#[async_trait]
impl PhaseRunner for FeedbackPhase {
    fn phase(&self) -> ReasoningPhase {
        ReasoningPhase::Feedback
    }

    async fn run(&self, ctx: &PhaseContext<'_>, state: &mut ReasoningState) -> AppResult<()> {
        let query = state.user_query().to_string();
        let service = planning_output(state)
            .and_then(|plan| plan.value().service_filter().map(str::to_string));
        let analysis = execution_artifact(state).map(|a| a.llm_analysis.into_inner());
        let issues = state.identified_issues().to_vec();

        // ── Rule recommendations ──────────────────────────────────────
        let rule_started = Instant::now();
        let rules = ctx
            .rules
            .generate_recommendations(state.collected_data(), service.as_deref(), &issues);
        let step = ReasoningStep::new(
            ReasoningPhase::Feedback,
            RULE_AGENT,
            ctx.config.rule_step_confidence,
        )
        .with_input(json!({ "issues": issues.len(), "service": service }))
        .with_output(serde_json::to_value(&rules)?)
        .with_rationale(format!(
            "Rule recommendations for status {} (priority {})",
            rules.status, rules.priority
        ))
        .with_duration(rule_started.elapsed());
        ctx.tracer.step_recorded(state.session_id(), &step);
        state.append_step(step);

        // ── Model answer ──────────────────────────────────────────────
        let started = Instant::now();
        let response = ctx
            .ask_llm(
                feedback_system(),
                feedback_user(&query, analysis.as_ref(), &issues, &rules),
                ctx.config.feedback_temperature,
            )
            .await;
        let output = match response {
            Ok(text) => match parse_feedback(&text) {
                Ok(feedback) => PhaseOutput::Parsed(feedback),
                Err(failure) => {
                    warn!("[Feedback] unusable model answer: {}", failure);
                    PhaseOutput::Fallback {
                        value: fallback_feedback(&text, analysis.as_ref(), &issues, &rules),
                        reason: format!("unusable feedback response: {}", failure),
                    }
                }
            },
            Err(e) => {
                warn!("[Feedback] LLM unavailable: {}", e);
                PhaseOutput::Fallback {
                    value: fallback_feedback("", analysis.as_ref(), &issues, &rules),
                    reason: format!("LLM unavailable: {}", e),
                }
            }
        };

        let feedback = output.value();
        let confidence = if output.is_fallback() {
            ctx.config.fallback_confidence()
        } else {
            ctx.config.parsed_confidence
        };
        let step = ReasoningStep::new(ReasoningPhase::Feedback, AGENT_NAME, confidence)
            .with_input(json!({ "user_query": query }))
            .with_output(serde_json::to_value(feedback)?)
            .with_rationale(match output.fallback_reason() {
                Some(reason) => format!("Rule-based answer ({})", reason),
                None => "Model answer refined with rule recommendations".to_string(),
            })
            .with_duration(started.elapsed());
        ctx.tracer.step_recorded(state.session_id(), &step);
        state.append_step(step);

        state.extend_recommendations(
            rules
                .recommendations
                .iter()
                .chain(feedback.recommendations.iter())
                .cloned(),
        );
        if feedback.action_plan.is_empty() {
            state.extend_action_plan(rules.action_plan.iter().cloned());
        } else {
            state.extend_action_plan(feedback.action_plan.iter().cloned());
        }
        info!(
            "[Feedback] {} recommendation(s), {} action(s), fallback={}",
            state.recommendations().len(),
            state.action_plan().len(),
            output.is_fallback()
        );
        ctx.tracer
            .recommendations(state.session_id(), state.recommendations());

        state.commit_artifact(ArtifactKey::FinalFeedback, serde_json::to_value(&output)?)?;
        Ok(())
    }
}

fn parse_feedback(raw: &str) -> Result<FeedbackOutput, ParseFailure> {
    let parsed: RawFeedback = parse_phase_json(raw, FEEDBACK_REQUIRED_KEYS)?;
    let summary = value_to_text(&parsed.summary);
    if summary.trim().is_empty() {
        return Err(ParseFailure::Invalid("empty summary".to_string()));
    }
    let priority = value_to_text(&parsed.priority).to_lowercase();
    Ok(FeedbackOutput {
        summary,
        recommendations: value_to_list(&parsed.recommendations),
        action_plan: value_to_list(&parsed.action_plan),
        additional_help: value_to_text(&parsed.additional_help),
        priority: if priority.is_empty() {
            "medium".to_string()
        } else {
            priority
        },
    })
}

/// Rule-derived answer. Raw model text, when present, becomes the summary.
fn fallback_feedback(
    text: &str,
    analysis: Option<&ExecutionAnalysis>,
    issues: &[String],
    rules: &RecommendationSet,
) -> FeedbackOutput {
    let text = text.trim();
    let summary = if !text.is_empty() {
        text.to_string()
    } else if let Some(analysis) = analysis.filter(|a| !a.main_response.trim().is_empty()) {
        analysis.main_response.clone()
    } else {
        rule_summary(issues, rules)
    };
    FeedbackOutput {
        summary,
        recommendations: rules.recommendations.clone(),
        action_plan: rules.action_plan.clone(),
        additional_help: format!(
            "Estimated resolution time: {}",
            rules.estimated_resolution_time
        ),
        priority: rules.priority.clone(),
    }
}

fn rule_summary(issues: &[String], rules: &RecommendationSet) -> String {
    if issues.is_empty() {
        format!("System status: {}. No issues identified.", rules.status)
    } else {
        format!(
            "System status: {}. {} issue(s) identified: {}",
            rules.status,
            issues.len(),
            issues.join("; ")
        )
    }
}
