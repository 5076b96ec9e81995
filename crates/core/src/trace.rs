//! Reasoning Trace Sink
//!
//! Hooks the orchestrator calls while a session runs. A tracer is injected
//! at construction; there is no process-wide instance.

use std::time::Duration;

use crate::state::{ReasoningPhase, ReasoningState, ReasoningStep};
use crate::telemetry::DataRequirement;

/// Observer of reasoning sessions. Every hook defaults to a no-op.
pub trait ReasoningTracer: Send + Sync {
    fn session_started(&self, _state: &ReasoningState) {}

    fn phase_started(&self, _session_id: &str, _phase: ReasoningPhase) {}

    fn step_recorded(&self, _session_id: &str, _step: &ReasoningStep) {}

    fn data_requirements(
        &self,
        _session_id: &str,
        _requirements: &[DataRequirement],
        _target_services: &[String],
    ) {
    }

    fn data_collected(
        &self,
        _session_id: &str,
        _successful: &[DataRequirement],
        _failed: &[DataRequirement],
        _elapsed: Duration,
    ) {
    }

    fn issues_found(&self, _session_id: &str, _issues: &[String]) {}

    fn recommendations(&self, _session_id: &str, _recommendations: &[String]) {}

    fn error(&self, _session_id: &str, _message: &str) {}

    fn session_completed(&self, _state: &ReasoningState) {}

    /// Flush buffered output. Called once at shutdown.
    fn flush(&self) {}
}

/// Tracer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl ReasoningTracer for NoopTracer {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingTracer {
        steps: Mutex<Vec<String>>,
    }

    impl ReasoningTracer for CountingTracer {
        fn step_recorded(&self, _session_id: &str, step: &ReasoningStep) {
            if let Ok(mut steps) = self.steps.lock() {
                steps.push(step.agent_name.clone());
            }
        }
    }

    #[test]
    fn test_default_hooks_are_noops() {
        let tracer = NoopTracer;
        let state = ReasoningState::new("q");
        tracer.session_started(&state);
        tracer.error(state.session_id(), "boom");
        tracer.session_completed(&state);
        tracer.flush();
    }

    #[test]
    fn test_custom_hook_receives_steps() {
        let tracer = CountingTracer::default();
        let step = ReasoningStep::new(ReasoningPhase::Planning, "PlanningAgent", 0.8);
        tracer.step_recorded("s1", &step);
        assert_eq!(*tracer.steps.lock().unwrap(), vec!["PlanningAgent".to_string()]);
    }
}
