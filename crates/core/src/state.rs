//! Reasoning State
//!
//! The per-session aggregate threaded through Planning, Execution and
//! Feedback. It only grows: steps, errors, issues, recommendations and
//! action items are appended, never removed.
//!
//! `total_confidence` is always the arithmetic mean of the recorded step
//! confidences (0.0 with no steps) and is recomputed on every append.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::telemetry::TelemetryBundle;

// ============================================================================
// ReasoningPhase
// ============================================================================

/// The three ordered stages of a reasoning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPhase {
    Planning,
    Execution,
    Feedback,
}

impl ReasoningPhase {
    pub const ALL: [ReasoningPhase; 3] = [
        ReasoningPhase::Planning,
        ReasoningPhase::Execution,
        ReasoningPhase::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningPhase::Planning => "planning",
            ReasoningPhase::Execution => "execution",
            ReasoningPhase::Feedback => "feedback",
        }
    }

    /// The phase that follows this one, if any.
    pub fn next(&self) -> Option<ReasoningPhase> {
        match self {
            ReasoningPhase::Planning => Some(ReasoningPhase::Execution),
            ReasoningPhase::Execution => Some(ReasoningPhase::Feedback),
            ReasoningPhase::Feedback => None,
        }
    }
}

impl fmt::Display for ReasoningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ReasoningStep
// ============================================================================

/// Immutable audit record of one agent invocation inside a phase.
///
/// Build it with the `with_*` methods, then hand it to
/// [`ReasoningState::append_step`]; the state only ever exposes shared
/// references afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub phase: ReasoningPhase,
    pub timestamp: DateTime<Utc>,
    pub agent_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub rationale: String,
    /// Always within 0.0..=1.0
    pub confidence: f64,
    pub duration_ms: u64,
}

impl ReasoningStep {
    pub fn new(phase: ReasoningPhase, agent_name: impl Into<String>, confidence: f64) -> Self {
        Self {
            phase,
            timestamp: Utc::now(),
            agent_name: agent_name.into(),
            input: Value::Null,
            output: Value::Null,
            rationale: String::new(),
            confidence: clamp_confidence(confidence),
            duration_ms: 0,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// Clamp into 0.0..=1.0; NaN becomes 0.0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// Keys of the processed-data bag. Each key is owned by exactly one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKey {
    Planning,
    Execution,
    FinalFeedback,
}

impl ArtifactKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKey::Planning => "planning",
            ArtifactKey::Execution => "execution",
            ArtifactKey::FinalFeedback => "final_feedback",
        }
    }

    pub fn owner(&self) -> ReasoningPhase {
        match self {
            ArtifactKey::Planning => ReasoningPhase::Planning,
            ArtifactKey::Execution => ReasoningPhase::Execution,
            ArtifactKey::FinalFeedback => ReasoningPhase::Feedback,
        }
    }
}

// ============================================================================
// ReasoningState
// ============================================================================

/// Mutable aggregate root for one reasoning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningState {
    session_id: String,
    user_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_type: Option<String>,
    current_phase: ReasoningPhase,
    steps: Vec<ReasoningStep>,
    collected_data: TelemetryBundle,
    processed_data: BTreeMap<ArtifactKey, Value>,
    identified_issues: Vec<String>,
    recommendations: Vec<String>,
    action_plan: Vec<String>,
    start_time: DateTime<Utc>,
    last_update: DateTime<Utc>,
    total_confidence: f64,
    is_complete: bool,
    has_errors: bool,
    error_messages: Vec<String>,
}

impl ReasoningState {
    /// Start a new session with a fresh v4 session id.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self::with_session_id(Uuid::new_v4().to_string(), user_query)
    }

    pub fn with_session_id(session_id: impl Into<String>, user_query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_query: user_query.into(),
            request_type: None,
            current_phase: ReasoningPhase::Planning,
            steps: Vec::new(),
            collected_data: TelemetryBundle::default(),
            processed_data: BTreeMap::new(),
            identified_issues: Vec::new(),
            recommendations: Vec::new(),
            action_plan: Vec::new(),
            start_time: now,
            last_update: now,
            total_confidence: 0.0,
            is_complete: false,
            has_errors: false,
            error_messages: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn request_type(&self) -> Option<&str> {
        self.request_type.as_deref()
    }

    pub fn current_phase(&self) -> ReasoningPhase {
        self.current_phase
    }

    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    pub fn collected_data(&self) -> &TelemetryBundle {
        &self.collected_data
    }

    pub fn artifact(&self, key: ArtifactKey) -> Option<&Value> {
        self.processed_data.get(&key)
    }

    pub fn identified_issues(&self) -> &[String] {
        &self.identified_issues
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn action_plan(&self) -> &[String] {
        &self.action_plan
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn total_confidence(&self) -> f64 {
        self.total_confidence
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Mark entry into a phase. Phases only move forward.
    pub fn enter_phase(&mut self, phase: ReasoningPhase) {
        if phase >= self.current_phase {
            self.current_phase = phase;
        }
        self.touch();
    }

    /// Append a step, recompute the confidence mean and advance
    /// `current_phase` to the step's phase.
    pub fn append_step(&mut self, step: ReasoningStep) {
        self.current_phase = step.phase;
        self.steps.push(step);
        let sum: f64 = self.steps.iter().map(|s| s.confidence).sum();
        self.total_confidence = sum / self.steps.len() as f64;
        self.touch();
    }

    /// Record a phase failure. Never halts the session.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.has_errors = true;
        self.error_messages.push(message.into());
        self.touch();
    }

    pub fn set_request_type(&mut self, request_type: impl Into<String>) {
        self.request_type = Some(request_type.into());
    }

    /// Store a phase artifact. Only the owning phase may write its key.
    pub fn commit_artifact(&mut self, key: ArtifactKey, value: Value) -> CoreResult<()> {
        if self.current_phase != key.owner() {
            return Err(CoreError::validation(format!(
                "artifact '{}' belongs to the {} phase, current phase is {}",
                key.as_str(),
                key.owner(),
                self.current_phase
            )));
        }
        self.processed_data.insert(key, value);
        self.touch();
        Ok(())
    }

    /// Merge a settled collection bundle into the state.
    pub fn merge_collected(&mut self, bundle: TelemetryBundle) {
        self.collected_data.merge(bundle);
        self.touch();
    }

    /// Append issues not already present. Returns how many were added.
    pub fn extend_issues<I: IntoIterator<Item = String>>(&mut self, issues: I) -> usize {
        let added = append_unique(&mut self.identified_issues, issues);
        self.touch();
        added
    }

    pub fn extend_recommendations<I: IntoIterator<Item = String>>(&mut self, items: I) -> usize {
        let added = append_unique(&mut self.recommendations, items);
        self.touch();
        added
    }

    pub fn extend_action_plan<I: IntoIterator<Item = String>>(&mut self, items: I) -> usize {
        let added = append_unique(&mut self.action_plan, items);
        self.touch();
        added
    }

    /// Set once Feedback finishes cleanly.
    pub fn mark_complete(&mut self) {
        self.is_complete = true;
        self.touch();
    }

    fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn phase_steps(&self, phase: ReasoningPhase) -> Vec<&ReasoningStep> {
        self.steps.iter().filter(|s| s.phase == phase).collect()
    }

    pub fn latest_step(&self) -> Option<&ReasoningStep> {
        self.steps.last()
    }

    pub fn elapsed(&self) -> Duration {
        (self.last_update - self.start_time)
            .to_std()
            .unwrap_or_default()
    }

    /// Read-only aggregate of the session so far.
    pub fn execution_summary(&self) -> ExecutionSummary {
        let mut phase_statistics = BTreeMap::new();
        for phase in ReasoningPhase::ALL {
            let steps = self.phase_steps(phase);
            if steps.is_empty() {
                continue;
            }
            let total: f64 = steps.iter().map(|s| s.confidence).sum();
            phase_statistics.insert(
                phase,
                PhaseStatistics {
                    steps_count: steps.len(),
                    avg_confidence: total / steps.len() as f64,
                    total_time_ms: steps.iter().map(|s| s.duration_ms).sum(),
                },
            );
        }

        ExecutionSummary {
            session_id: self.session_id.clone(),
            total_execution_time_secs: self.elapsed().as_secs_f64(),
            total_steps: self.steps.len(),
            current_phase: self.current_phase,
            overall_confidence: self.total_confidence,
            is_complete: self.is_complete,
            has_errors: self.has_errors,
            error_count: self.error_messages.len(),
            phase_statistics,
            issues_found: self.identified_issues.len(),
            recommendations_generated: self.recommendations.len(),
            action_items: self.action_plan.len(),
        }
    }
}

fn append_unique<I: IntoIterator<Item = String>>(target: &mut Vec<String>, items: I) -> usize {
    let mut added = 0;
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() || target.iter().any(|existing| existing == trimmed) {
            continue;
        }
        target.push(trimmed.to_string());
        added += 1;
    }
    added
}

/// Per-phase aggregate in an [`ExecutionSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatistics {
    pub steps_count: usize,
    pub avg_confidence: f64,
    pub total_time_ms: u64,
}

/// Caller-visible summary of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub session_id: String,
    pub total_execution_time_secs: f64,
    pub total_steps: usize,
    pub current_phase: ReasoningPhase,
    pub overall_confidence: f64,
    pub is_complete: bool,
    pub has_errors: bool,
    pub error_count: usize,
    pub phase_statistics: BTreeMap<ReasoningPhase, PhaseStatistics>,
    pub issues_found: usize,
    pub recommendations_generated: usize,
    pub action_items: usize,
}
