//! Pipeline Configuration Builder
//!
//! `PipelineConfig` carries the tunables of the three-phase pipeline:
//! per-phase LLM temperatures, step confidences, and the character budgets
//! for evidence and chat-history context.
//!
//! ## Builder
//!
//! 1. Create with `PipelineConfigBuilder::new()`
//! 2. Chain `.field(value)` calls
//! 3. Call `.build()` which validates and returns `CoreResult<PipelineConfig>`

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// ============================================================================
// PipelineConfig
// ============================================================================

/// Validated pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub planning_temperature: f32,
    pub analysis_temperature: f32,
    pub feedback_temperature: f32,
    /// Confidence recorded for a step whose LLM output parsed cleanly.
    pub parsed_confidence: f64,
    /// Subtracted from `parsed_confidence` when the fallback path was used.
    pub fallback_confidence_discount: f64,
    pub collection_success_confidence: f64,
    pub collection_partial_confidence: f64,
    /// Confidence of rule-engine steps.
    pub rule_step_confidence: f64,
    pub max_evidence_chars: usize,
    pub max_history_messages: usize,
    pub max_context_chars: usize,
    /// Fan collector calls out concurrently inside Execution.
    pub concurrent_collection: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            planning_temperature: 0.2,
            analysis_temperature: 0.3,
            feedback_temperature: 0.3,
            parsed_confidence: 0.8,
            fallback_confidence_discount: 0.3,
            collection_success_confidence: 0.9,
            collection_partial_confidence: 0.7,
            rule_step_confidence: 0.8,
            max_evidence_chars: 4000,
            max_history_messages: 20,
            max_context_chars: 4000,
            concurrent_collection: true,
        }
    }
}

impl PipelineConfig {
    /// Confidence for a fallback-derived phase result.
    pub fn fallback_confidence(&self) -> f64 {
        (self.parsed_confidence - self.fallback_confidence_discount).max(0.0)
    }

    /// Re-run the builder checks on a deserialized config.
    pub fn validate(&self) -> CoreResult<()> {
        for (name, t) in [
            ("planning_temperature", self.planning_temperature),
            ("analysis_temperature", self.analysis_temperature),
            ("feedback_temperature", self.feedback_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(CoreError::validation(format!(
                    "{} must be between 0.0 and 2.0",
                    name
                )));
            }
        }
        for (name, c) in [
            ("parsed_confidence", self.parsed_confidence),
            ("fallback_confidence_discount", self.fallback_confidence_discount),
            ("collection_success_confidence", self.collection_success_confidence),
            ("collection_partial_confidence", self.collection_partial_confidence),
            ("rule_step_confidence", self.rule_step_confidence),
        ] {
            if !(0.0..=1.0).contains(&c) {
                return Err(CoreError::validation(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }
        if self.fallback_confidence_discount <= 0.0 {
            return Err(CoreError::validation(
                "fallback_confidence_discount must be > 0",
            ));
        }
        if self.max_evidence_chars < 200 {
            return Err(CoreError::validation("max_evidence_chars must be >= 200"));
        }
        if self.max_context_chars < 200 {
            return Err(CoreError::validation("max_context_chars must be >= 200"));
        }
        if self.max_history_messages == 0 {
            return Err(CoreError::validation("max_history_messages must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// PipelineConfigBuilder
// ============================================================================

/// Builder for [`PipelineConfig`] with validation at build time.
///
/// # Example
/// ```ignore
/// let config = PipelineConfigBuilder::new()
///     .planning_temperature(0.1)
///     .max_evidence_chars(6000)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn planning_temperature(mut self, t: f32) -> Self {
        self.config.planning_temperature = t;
        self
    }

    pub fn analysis_temperature(mut self, t: f32) -> Self {
        self.config.analysis_temperature = t;
        self
    }

    pub fn feedback_temperature(mut self, t: f32) -> Self {
        self.config.feedback_temperature = t;
        self
    }

    pub fn parsed_confidence(mut self, c: f64) -> Self {
        self.config.parsed_confidence = c;
        self
    }

    pub fn fallback_confidence_discount(mut self, d: f64) -> Self {
        self.config.fallback_confidence_discount = d;
        self
    }

    pub fn max_evidence_chars(mut self, n: usize) -> Self {
        self.config.max_evidence_chars = n;
        self
    }

    pub fn max_history_messages(mut self, n: usize) -> Self {
        self.config.max_history_messages = n;
        self
    }

    pub fn max_context_chars(mut self, n: usize) -> Self {
        self.config.max_context_chars = n;
        self
    }

    pub fn concurrent_collection(mut self, enabled: bool) -> Self {
        self.config.concurrent_collection = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> CoreResult<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
