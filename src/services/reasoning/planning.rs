//! Planning Phase
//!
//! Decides which telemetry to collect. Falls back to the keyword rule table
//! when the model is unavailable or its answer is unusable, so Execution
//! always receives a non-empty requirement list.

use std::time::Instant;

use async_trait::async_trait;
use ops_reasoner_core::{
    ArtifactKey, DataRequirement, ReasoningPhase, ReasoningState, ReasoningStep,
};
use ops_reasoner_rules::fallback_requirements;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::parse::{parse_phase_json, value_to_list, value_to_text, ParseFailure};
use super::prompts::{planning_system, planning_user, PLANNING_REQUIRED_KEYS};
use super::types::{PhaseOutput, PlanningOutput};
use super::{PhaseContext, PhaseRunner};
use crate::services::history::extract_new_request;
use crate::utils::error::AppResult;

const AGENT_NAME: &str = "PlanningAgent";

/// Planning answer as the model writes it, before vocabulary filtering.
#[derive(Debug, Deserialize)]
struct RawPlanning {
    user_intent: Value,
    analysis_plan: Value,
    data_requirements: Value,
    target_services: Value,
    priority: Value,
}

pub struct PlanningPhase;

#[async_trait]
impl PhaseRunner for PlanningPhase {
    fn phase(&self) -> ReasoningPhase {
        ReasoningPhase::Planning
    }

    async fn run(&self, ctx: &PhaseContext<'_>, state: &mut ReasoningState) -> AppResult<()> {
        let started = Instant::now();
        let query = state.user_query().to_string();

        let response = ctx
            .ask_llm(
                planning_system(),
                planning_user(&query),
                ctx.config.planning_temperature,
            )
            .await;
        let output = match response {
            Ok(text) => match parse_planning(&text) {
                Ok(plan) => PhaseOutput::Parsed(plan),
                Err(failure) => {
                    warn!("[Planning] unusable model answer: {}", failure);
                    PhaseOutput::Fallback {
                        value: fallback_plan(&query),
                        reason: format!("unusable planning response: {}", failure),
                    }
                }
            },
            Err(e) => {
                warn!("[Planning] LLM unavailable: {}", e);
                PhaseOutput::Fallback {
                    value: fallback_plan(&query),
                    reason: format!("LLM unavailable: {}", e),
                }
            }
        };

        let plan = output.value();
        for tag in &plan.ignored_tags {
            debug!("[Planning] ignoring unknown data requirement '{}'", tag);
        }
        info!(
            "[Planning] requirements={:?} services={:?} fallback={}",
            plan.data_requirements.iter().map(|r| r.as_tag()).collect::<Vec<_>>(),
            plan.target_services,
            output.is_fallback()
        );
        ctx.tracer
            .data_requirements(state.session_id(), &plan.data_requirements, &plan.target_services);

        let confidence = if output.is_fallback() {
            ctx.config.fallback_confidence()
        } else {
            ctx.config.parsed_confidence
        };
        let rationale = match output.fallback_reason() {
            Some(reason) => format!("Keyword fallback plan ({})", reason),
            None => format!("Model plan: {}", plan.analysis_plan),
        };
        let step = ReasoningStep::new(ReasoningPhase::Planning, AGENT_NAME, confidence)
            .with_input(json!({ "user_query": query }))
            .with_output(serde_json::to_value(plan)?)
            .with_rationale(rationale)
            .with_duration(started.elapsed());
        ctx.tracer.step_recorded(state.session_id(), &step);
        state.append_step(step);

        state.commit_artifact(ArtifactKey::Planning, serde_json::to_value(&output)?)?;
        Ok(())
    }
}

/// Validate a model answer and map its tags onto the vocabulary.
fn parse_planning(raw: &str) -> Result<PlanningOutput, ParseFailure> {
    let parsed: RawPlanning = parse_phase_json(raw, PLANNING_REQUIRED_KEYS)?;

    let tags = value_to_list(&parsed.data_requirements);
    let (data_requirements, ignored_tags) = DataRequirement::normalize_tags(&tags);
    if data_requirements.is_empty() {
        return Err(ParseFailure::Invalid(format!(
            "no recognised data requirements in {:?}",
            tags
        )));
    }

    let mut target_services = value_to_list(&parsed.target_services);
    if target_services.is_empty() {
        target_services.push("system".to_string());
    }
    let priority = value_to_text(&parsed.priority).to_lowercase();

    Ok(PlanningOutput {
        user_intent: value_to_text(&parsed.user_intent),
        analysis_plan: value_to_text(&parsed.analysis_plan),
        data_requirements,
        target_services,
        priority: if priority.is_empty() {
            "medium".to_string()
        } else {
            priority
        },
        ignored_tags,
    })
}

/// Deterministic plan from the keyword rule table.
pub fn fallback_plan(query: &str) -> PlanningOutput {
    let request = extract_new_request(query);
    let data_requirements = fallback_requirements(request);
    let tags = data_requirements
        .iter()
        .map(|r| r.as_tag())
        .collect::<Vec<_>>()
        .join(", ");

    PlanningOutput {
        user_intent: format!("Investigate: {}", request.chars().take(200).collect::<String>()),
        analysis_plan: format!("Collect {} and check them against static thresholds", tags),
        data_requirements,
        target_services: vec!["system".to_string()],
        priority: "high".to_string(),
        ignored_tags: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_planning_filters_vocabulary() {
        let raw = r#"```json
{
  "user_intent": "Find why checkout is slow",
  "analysis_plan": ["look at cpu", "look at errors"],
  "data_requirements": ["cpu_metrics", "Error Logs", "tracing_spans", "cpu_metrics"],
  "target_services": ["checkout"],
  "priority": "HIGH"
}
```"#;
        let plan = parse_planning(raw).unwrap();
        assert_eq!(
            plan.data_requirements,
            vec![DataRequirement::CpuMetrics, DataRequirement::ErrorLogs]
        );
        assert_eq!(plan.ignored_tags, vec!["tracing_spans".to_string()]);
        assert_eq!(plan.analysis_plan, "look at cpu; look at errors");
        assert_eq!(plan.priority, "high");
        assert_eq!(plan.service_filter(), Some("checkout"));
    }

    #[test]
    fn test_parse_planning_accepts_umbrella_tags() {
        let raw = r#"{"user_intent": "x", "analysis_plan": "y", "data_requirements": ["metrics"],
                      "target_services": [], "priority": "low"}"#;
        let plan = parse_planning(raw).unwrap();
        assert_eq!(plan.data_requirements.len(), 4);
        assert_eq!(plan.target_services, vec!["system".to_string()]);
    }

    #[test]
    fn test_parse_planning_rejects_empty_requirements() {
        let raw = r#"{"user_intent": "x", "analysis_plan": "y", "data_requirements": ["bogus"],
                      "target_services": ["system"], "priority": "low"}"#;
        assert!(matches!(parse_planning(raw), Err(ParseFailure::Invalid(_))));

        let missing = r#"{"user_intent": "x", "analysis_plan": "y"}"#;
        assert!(matches!(parse_planning(missing), Err(ParseFailure::MissingField(_))));
    }

    #[test]
    fn test_fallback_plan_for_slow_server() {
        let plan = fallback_plan("why is the server slow?");
        assert!(plan.data_requirements.contains(&DataRequirement::CpuMetrics));
        assert!(plan.data_requirements.contains(&DataRequirement::MemoryMetrics));
        assert_eq!(plan.priority, "high");
        assert_eq!(plan.target_services, vec!["system".to_string()]);
    }

    #[test]
    fn test_fallback_plan_uses_newest_request_only() {
        let context = "=== History ===\n[2024-05-01 12:00] User: disk full?\nAssistant: no\n\n\
                       === New request ===\nUser: hello";
        let plan = fallback_plan(context);
        assert_eq!(
            plan.data_requirements,
            DataRequirement::BASELINE.to_vec()
        );
    }
}
