//! Log Tracer
//!
//! `ReasoningTracer` that writes each hook as a structured `tracing` event
//! under the `reasoning` target, and a one-line report when a session ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ops_reasoner_core::{
    DataRequirement, ReasoningPhase, ReasoningState, ReasoningStep, ReasoningTracer,
};
use tracing::{debug, info, warn};

const TARGET: &str = "reasoning";

#[derive(Debug, Default)]
pub struct LogTracer {
    sessions: AtomicU64,
    steps: AtomicU64,
    errors: AtomicU64,
    verbose: bool,
}

impl LogTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log step payloads and full issue/recommendation lists.
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            ..Self::default()
        }
    }

    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

fn tags(requirements: &[DataRequirement]) -> String {
    requirements
        .iter()
        .map(|r| r.as_tag())
        .collect::<Vec<_>>()
        .join(",")
}

impl ReasoningTracer for LogTracer {
    fn session_started(&self, state: &ReasoningState) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
        info!(
            target: TARGET,
            session = state.session_id(),
            request_type = state.request_type().unwrap_or("unknown"),
            "session started: {}",
            state.user_query().chars().take(120).collect::<String>()
        );
    }

    fn phase_started(&self, session_id: &str, phase: ReasoningPhase) {
        debug!(target: TARGET, session = session_id, %phase, "phase started");
    }

    fn step_recorded(&self, session_id: &str, step: &ReasoningStep) {
        self.steps.fetch_add(1, Ordering::Relaxed);
        info!(
            target: TARGET,
            session = session_id,
            phase = %step.phase,
            agent = %step.agent_name,
            confidence = step.confidence,
            duration_ms = step.duration_ms,
            "{}",
            step.rationale
        );
        if self.verbose {
            debug!(target: TARGET, session = session_id, output = %step.output, "step output");
        }
    }

    fn data_requirements(
        &self,
        session_id: &str,
        requirements: &[DataRequirement],
        target_services: &[String],
    ) {
        info!(
            target: TARGET,
            session = session_id,
            requirements = %tags(requirements),
            services = %target_services.join(","),
            "data requirements planned"
        );
    }

    fn data_collected(
        &self,
        session_id: &str,
        successful: &[DataRequirement],
        failed: &[DataRequirement],
        elapsed: Duration,
    ) {
        if failed.is_empty() {
            info!(
                target: TARGET,
                session = session_id,
                successful = %tags(successful),
                elapsed_ms = elapsed.as_millis() as u64,
                "data collected"
            );
        } else {
            warn!(
                target: TARGET,
                session = session_id,
                successful = %tags(successful),
                failed = %tags(failed),
                elapsed_ms = elapsed.as_millis() as u64,
                "data partially collected"
            );
        }
    }

    fn issues_found(&self, session_id: &str, issues: &[String]) {
        info!(target: TARGET, session = session_id, count = issues.len(), "issues identified");
        if self.verbose {
            for issue in issues {
                debug!(target: TARGET, session = session_id, "issue: {}", issue);
            }
        }
    }

    fn recommendations(&self, session_id: &str, recommendations: &[String]) {
        info!(
            target: TARGET,
            session = session_id,
            count = recommendations.len(),
            "recommendations generated"
        );
        if self.verbose {
            for item in recommendations {
                debug!(target: TARGET, session = session_id, "recommendation: {}", item);
            }
        }
    }

    fn error(&self, session_id: &str, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!(target: TARGET, session = session_id, "{}", message);
    }

    fn session_completed(&self, state: &ReasoningState) {
        let summary = state.execution_summary();
        let confidence = format!("{:.2}", summary.overall_confidence);
        let elapsed = format!("{:.2}", summary.total_execution_time_secs);
        info!(
            target: TARGET,
            session = state.session_id(),
            complete = summary.is_complete,
            errors = summary.error_count,
            steps = summary.total_steps,
            confidence = %confidence,
            elapsed_secs = %elapsed,
            "session finished: {} issue(s), {} recommendation(s), {} action(s)",
            summary.issues_found,
            summary.recommendations_generated,
            summary.action_items
        );
    }

    fn flush(&self) {
        info!(
            target: TARGET,
            sessions = self.sessions(),
            steps = self.steps(),
            errors = self.errors(),
            "reasoning trace closed"
        );
    }
}
