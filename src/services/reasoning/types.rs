//! Reasoning Phase Types
//!
//! Typed outputs of the three phases and the artifacts committed to the
//! reasoning state. Artifacts are stored in the state as JSON and read back
//! through the typed accessors at the bottom of this module.

use ops_reasoner_core::{ArtifactKey, DataRequirement, ReasoningState};
use ops_reasoner_rules::BundleAnalysis;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Result of one phase's LLM step: either the model's own structured
/// answer or a deterministic substitute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data", rename_all = "snake_case")]
pub enum PhaseOutput<T> {
    Parsed(T),
    Fallback { value: T, reason: String },
}

impl<T> PhaseOutput<T> {
    pub fn value(&self) -> &T {
        match self {
            PhaseOutput::Parsed(value) => value,
            PhaseOutput::Fallback { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            PhaseOutput::Parsed(value) => value,
            PhaseOutput::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PhaseOutput::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            PhaseOutput::Parsed(_) => None,
            PhaseOutput::Fallback { reason, .. } => Some(reason),
        }
    }
}

// ============================================================================
// Planning
// ============================================================================

/// What the Planning phase decided to look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningOutput {
    pub user_intent: String,
    pub analysis_plan: String,
    /// Never empty once committed
    pub data_requirements: Vec<DataRequirement>,
    pub target_services: Vec<String>,
    pub priority: String,
    /// Tags the model asked for that are outside the vocabulary
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_tags: Vec<String>,
}

impl PlanningOutput {
    /// Concrete services named by the plan, in order, without umbrella
    /// names (`system`, `all`, `*`) or duplicates.
    pub fn service_filters(&self) -> Vec<&str> {
        let mut services: Vec<&str> = Vec::new();
        for name in self.target_services.iter().map(|s| s.trim()) {
            if name.is_empty() || matches!(name, "system" | "all" | "*") {
                continue;
            }
            if !services.contains(&name) {
                services.push(name);
            }
        }
        services
    }

    /// The primary service, used for per-service thresholds.
    pub fn service_filter(&self) -> Option<&str> {
        self.service_filters().into_iter().next()
    }
}

// ============================================================================
// Execution
// ============================================================================

/// The LLM's interpretation of the collected evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAnalysis {
    pub response_type: String,
    pub main_response: String,
    pub system_status: String,
    pub identified_issues: Vec<String>,
    pub analysis_results: String,
    /// Within 0.0..=1.0
    pub confidence: f64,
}

/// One collector call that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCollection {
    pub tag: DataRequirement,
    /// Service filter of the failed call, `None` for an unscoped call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub error: String,
}

/// Outcome of the collector fan-out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub requested: Vec<DataRequirement>,
    /// Services each requirement was collected for; empty when unscoped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    /// Requirements collected for at least one service
    pub successful: Vec<DataRequirement>,
    pub failed: Vec<FailedCollection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_tags: Vec<String>,
    pub elapsed_ms: u64,
}

impl CollectionSummary {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Requirements that failed for every service.
    pub fn failed_tags(&self) -> Vec<DataRequirement> {
        let mut tags = Vec::new();
        for failure in &self.failed {
            if !self.successful.contains(&failure.tag) && !tags.contains(&failure.tag) {
                tags.push(failure.tag);
            }
        }
        tags
    }

    /// Failures for one service of a requirement that other services served.
    pub fn partial_failures(&self) -> impl Iterator<Item = &FailedCollection> {
        self.failed
            .iter()
            .filter(|failure| self.successful.contains(&failure.tag))
    }
}

/// Everything the Execution phase commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionArtifact {
    pub collection: CollectionSummary,
    pub rule_analysis: BundleAnalysis,
    pub llm_analysis: PhaseOutput<ExecutionAnalysis>,
}

// ============================================================================
// Feedback
// ============================================================================

/// Final answer of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutput {
    pub summary: String,
    pub recommendations: Vec<String>,
    pub action_plan: Vec<String>,
    pub additional_help: String,
    pub priority: String,
}

// ============================================================================
// Typed state accessors
// ============================================================================

fn read_artifact<T: DeserializeOwned>(state: &ReasoningState, key: ArtifactKey) -> Option<T> {
    let value = state.artifact(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("[Reasoning] artifact '{}' is malformed: {}", key.as_str(), e);
            None
        }
    }
}

pub fn planning_output(state: &ReasoningState) -> Option<PhaseOutput<PlanningOutput>> {
    read_artifact(state, ArtifactKey::Planning)
}

pub fn execution_artifact(state: &ReasoningState) -> Option<ExecutionArtifact> {
    read_artifact(state, ArtifactKey::Execution)
}

pub fn feedback_output(state: &ReasoningState) -> Option<PhaseOutput<FeedbackOutput>> {
    read_artifact(state, ArtifactKey::FinalFeedback)
}
