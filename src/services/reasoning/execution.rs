//! Execution Phase
//!
//! Collects the planned telemetry, runs the rule engine over it and asks
//! the model to interpret the combined evidence.
//!
//! Collector calls are independent: each failure is caught and recorded in
//! the collection summary, and the phase proceeds with whatever succeeded.
//! Results are merged into the state only after every call has settled.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use ops_reasoner_core::{
    clamp_confidence, ArtifactKey, CollectorError, DataRequirement, ReasoningPhase,
    ReasoningState, ReasoningStep, TelemetryBundle, TelemetryRecords,
};
use ops_reasoner_rules::{fallback_requirements, BundleAnalysis};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::evidence::{format_bundle, format_rule_analysis};
use super::parse::{parse_phase_json, value_to_list, value_to_text, ParseFailure};
use super::prompts::{execution_system, execution_user, EXECUTION_REQUIRED_KEYS};
use super::types::{
    planning_output, CollectionSummary, ExecutionAnalysis, ExecutionArtifact, FailedCollection,
    PhaseOutput,
};
use super::{PhaseContext, PhaseRunner};
use crate::services::history::extract_new_request;
use crate::utils::error::AppResult;

const DATA_AGENT: &str = "DataAgent";
const RULE_AGENT: &str = "ProtocolAgent";
const ANALYST_AGENT: &str = "LLMAnalyst";

#[derive(Debug, Deserialize)]
struct RawExecution {
    response_type: Value,
    main_response: Value,
    system_status: Value,
    identified_issues: Value,
    analysis_results: Value,
    #[serde(default)]
    confidence: Value,
}

pub struct ExecutionPhase;

#[async_trait]
impl PhaseRunner for ExecutionPhase {
    fn phase(&self) -> ReasoningPhase {
        ReasoningPhase::Execution
    }

    async fn run(&self, ctx: &PhaseContext<'_>, state: &mut ReasoningState) -> AppResult<()> {
        let query = state.user_query().to_string();
        let plan = planning_output(state).map(PhaseOutput::into_inner);

        let (mut requirements, ignored_tags, services) = match &plan {
            Some(plan) => (
                plan.data_requirements.clone(),
                plan.ignored_tags.clone(),
                plan.service_filters()
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
            ),
            None => {
                warn!("[Execution] no planning result, using keyword requirements");
                (
                    fallback_requirements(extract_new_request(&query)),
                    Vec::new(),
                    Vec::new(),
                )
            }
        };
        let service = services.first().cloned();
        dedupe_in_order(&mut requirements);
        if requirements.is_empty() {
            requirements.extend(DataRequirement::BASELINE);
        }

        // ── Collection ────────────────────────────────────────────────
        let (bundle, mut summary) = collect_telemetry(ctx, &requirements, &services).await;
        summary.ignored_tags = ignored_tags;
        info!(
            "[Execution] collected {}/{} data types in {}ms",
            summary.successful.len(),
            summary.requested.len(),
            summary.elapsed_ms
        );
        ctx.tracer.data_collected(
            state.session_id(),
            &summary.successful,
            &summary.failed_tags(),
            Duration::from_millis(summary.elapsed_ms),
        );
        state.merge_collected(bundle);

        let confidence = if summary.is_partial() {
            ctx.config.collection_partial_confidence
        } else {
            ctx.config.collection_success_confidence
        };
        let step = ReasoningStep::new(ReasoningPhase::Execution, DATA_AGENT, confidence)
            .with_input(json!({
                "data_requirements": requirements,
                "services": services,
            }))
            .with_output(serde_json::to_value(&summary)?)
            .with_rationale(format!(
                "Collected {} of {} requested data types",
                summary.successful.len(),
                summary.requested.len()
            ))
            .with_duration(Duration::from_millis(summary.elapsed_ms));
        record(ctx, state, step);

        // ── Rule analysis ─────────────────────────────────────────────
        let rule_started = Instant::now();
        let rule_analysis = ctx
            .rules
            .analyze_bundle(state.collected_data(), service.as_deref());
        let step = ReasoningStep::new(
            ReasoningPhase::Execution,
            RULE_AGENT,
            ctx.config.rule_step_confidence,
        )
        .with_input(json!({ "successful": summary.successful, "failed": summary.failed_tags() }))
        .with_output(serde_json::to_value(&rule_analysis)?)
        .with_rationale(format!(
            "Threshold analysis: status {}, {} issue(s)",
            rule_analysis.status,
            rule_analysis.issues_summary.len()
        ))
        .with_duration(rule_started.elapsed());
        record(ctx, state, step);
        state.extend_issues(rule_analysis.issues_summary.clone());
        state.extend_issues(summary.partial_failures().map(|failure| {
            format!(
                "Data collection failed for {} ({}): {}",
                failure.tag,
                failure.service.as_deref().unwrap_or("all services"),
                failure.error
            )
        }));

        // ── Model interpretation ──────────────────────────────────────
        let llm_started = Instant::now();
        let evidence = format_bundle(state.collected_data(), ctx.config.max_evidence_chars);
        let rule_text = format_rule_analysis(&rule_analysis);
        let response = ctx
            .ask_llm(
                execution_system(),
                execution_user(&query, plan.as_ref(), &evidence, &rule_text),
                ctx.config.analysis_temperature,
            )
            .await;

        let llm_analysis = match response {
            Ok(text) => match parse_execution(&text, ctx.config.parsed_confidence) {
                Ok(analysis) => PhaseOutput::Parsed(analysis),
                Err(failure) => {
                    warn!("[Execution] unusable model answer: {}", failure);
                    PhaseOutput::Fallback {
                        value: text_analysis(&text, &rule_analysis, &rule_text),
                        reason: format!("unusable analysis response: {}", failure),
                    }
                }
            },
            Err(e) => {
                warn!("[Execution] LLM unavailable: {}", e);
                PhaseOutput::Fallback {
                    value: text_analysis("", &rule_analysis, &rule_text),
                    reason: format!("LLM unavailable: {}", e),
                }
            }
        };

        let confidence = match &llm_analysis {
            PhaseOutput::Parsed(analysis) => analysis.confidence,
            PhaseOutput::Fallback { .. } => ctx.config.fallback_confidence(),
        };
        let step = ReasoningStep::new(ReasoningPhase::Execution, ANALYST_AGENT, confidence)
            .with_input(json!({ "evidence_chars": evidence.chars().count() }))
            .with_output(serde_json::to_value(llm_analysis.value())?)
            .with_rationale(match llm_analysis.fallback_reason() {
                Some(reason) => format!("Fallback analysis ({})", reason),
                None => "Model interpretation of collected evidence".to_string(),
            })
            .with_duration(llm_started.elapsed());
        record(ctx, state, step);

        state.extend_issues(llm_analysis.value().identified_issues.clone());
        ctx.tracer
            .issues_found(state.session_id(), state.identified_issues());

        let artifact = ExecutionArtifact {
            collection: summary,
            rule_analysis,
            llm_analysis,
        };
        state.commit_artifact(ArtifactKey::Execution, serde_json::to_value(&artifact)?)?;
        Ok(())
    }
}

fn record(ctx: &PhaseContext<'_>, state: &mut ReasoningState, step: ReasoningStep) {
    ctx.tracer.step_recorded(state.session_id(), &step);
    state.append_step(step);
}

fn dedupe_in_order(requirements: &mut Vec<DataRequirement>) {
    let mut seen = Vec::with_capacity(requirements.len());
    requirements.retain(|r| {
        if seen.contains(r) {
            false
        } else {
            seen.push(*r);
            true
        }
    });
}

/// Fan out one collector call per requirement and service, and wait for
/// all of them. With no services every requirement is fetched unscoped.
///
/// Records from several services are concatenated under their requirement.
/// A requirement lands in the bundle's failures only when it failed for
/// every service; per-service failures are kept in the summary.
pub async fn collect_telemetry(
    ctx: &PhaseContext<'_>,
    requirements: &[DataRequirement],
    services: &[String],
) -> (TelemetryBundle, CollectionSummary) {
    let started = Instant::now();
    let scopes: Vec<Option<&str>> = if services.is_empty() {
        vec![None]
    } else {
        services.iter().map(|s| Some(s.as_str())).collect()
    };
    let calls: Vec<(DataRequirement, Option<&str>)> = requirements
        .iter()
        .flat_map(|requirement| scopes.iter().map(move |scope| (*requirement, *scope)))
        .collect();
    let fetches = calls.iter().map(|&(requirement, scope)| async move {
        let result = ctx.collector.fetch(requirement, scope).await;
        (requirement, scope, result)
    });

    let results: Vec<(DataRequirement, Option<&str>, Result<TelemetryRecords, CollectorError>)> =
        if ctx.config.concurrent_collection {
            join_all(fetches).await
        } else {
            let mut settled = Vec::with_capacity(calls.len());
            for fetch in fetches {
                settled.push(fetch.await);
            }
            settled
        };

    let mut summary = CollectionSummary {
        requested: requirements.to_vec(),
        services: services.to_vec(),
        ..Default::default()
    };
    let mut collected: BTreeMap<DataRequirement, TelemetryRecords> = BTreeMap::new();
    for (requirement, scope, result) in results {
        match result {
            Ok(records) => {
                let records = label_service(records, scope);
                match collected.get_mut(&requirement) {
                    Some(existing) => append_records(existing, records),
                    None => {
                        collected.insert(requirement, records);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "[Execution] {} collection failed for {}: {}",
                    requirement,
                    scope.unwrap_or("all services"),
                    e
                );
                summary.failed.push(FailedCollection {
                    tag: requirement,
                    service: scope.map(str::to_string),
                    error: e.to_string(),
                });
            }
        }
    }
    summary.successful = requirements
        .iter()
        .filter(|requirement| collected.contains_key(requirement))
        .copied()
        .collect();

    let mut bundle = TelemetryBundle::new();
    for (requirement, records) in collected {
        bundle.insert(requirement, records);
    }
    for requirement in summary.failed_tags() {
        let errors: Vec<String> = summary
            .failed
            .iter()
            .filter(|failure| failure.tag == requirement)
            .map(|failure| match &failure.service {
                Some(service) if services.len() > 1 => format!("{}: {}", service, failure.error),
                _ => failure.error.clone(),
            })
            .collect();
        bundle.insert_failure(requirement, errors.join("; "));
    }

    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    (bundle, summary)
}

/// Tag unscoped records with the service they were fetched for.
fn label_service(records: TelemetryRecords, scope: Option<&str>) -> TelemetryRecords {
    let Some(service) = scope else {
        return records;
    };
    match records {
        TelemetryRecords::Metrics(mut series) => {
            for s in series.iter_mut().filter(|s| s.scope == "*") {
                s.scope = format!("service:{}", service);
            }
            TelemetryRecords::Metrics(series)
        }
        TelemetryRecords::Logs(mut logs) => {
            for log in logs.iter_mut().filter(|log| log.service.is_none()) {
                log.service = Some(service.to_string());
            }
            TelemetryRecords::Logs(logs)
        }
    }
}

fn append_records(target: &mut TelemetryRecords, more: TelemetryRecords) {
    match (target, more) {
        (TelemetryRecords::Metrics(series), TelemetryRecords::Metrics(more)) => series.extend(more),
        (TelemetryRecords::Logs(logs), TelemetryRecords::Logs(more)) => logs.extend(more),
        (_, more) => warn!("[Execution] dropping {} records of mismatched kind", more.len()),
    }
}

fn parse_execution(raw: &str, default_confidence: f64) -> Result<ExecutionAnalysis, ParseFailure> {
    let parsed: RawExecution = parse_phase_json(raw, EXECUTION_REQUIRED_KEYS)?;
    let confidence = match &parsed.confidence {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .unwrap_or(default_confidence);

    Ok(ExecutionAnalysis {
        response_type: value_to_text(&parsed.response_type),
        main_response: value_to_text(&parsed.main_response),
        system_status: value_to_text(&parsed.system_status).to_lowercase(),
        identified_issues: value_to_list(&parsed.identified_issues),
        analysis_results: value_to_text(&parsed.analysis_results),
        confidence: clamp_confidence(confidence),
    })
}

/// Analysis built from raw model text, or from the rule engine alone when
/// there is no text.
fn text_analysis(text: &str, rules: &BundleAnalysis, rule_text: &str) -> ExecutionAnalysis {
    let text = text.trim();
    let (main_response, analysis_results) = if text.is_empty() {
        (
            format!("Rule-based assessment: system status is {}.", rules.status),
            rule_text.to_string(),
        )
    } else {
        (text.to_string(), text.to_string())
    };
    ExecutionAnalysis {
        response_type: "analysis".to_string(),
        main_response,
        system_status: if text.is_empty() {
            rules.status.to_string()
        } else {
            "unknown".to_string()
        },
        identified_issues: Vec::new(),
        analysis_results,
        confidence: 0.5,
    }
}
