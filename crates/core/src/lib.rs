//! Ops Reasoner Core
//!
//! Foundational types for the ops-reasoner workspace: the reasoning-state
//! aggregate, the telemetry data model, the collector and tracer seams, and
//! shared error types. Nothing here performs I/O.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `state` - Reasoning phases, steps and the per-session `ReasoningState`
//! - `telemetry` - Data-requirement vocabulary, records, `TelemetryCollector`
//! - `trace` - Injected `ReasoningTracer` hooks
//! - `builders` - `PipelineConfig` and its validating builder
//! - `proxy` - Proxy configuration shared by all HTTP clients

pub mod builders;
pub mod error;
pub mod proxy;
pub mod state;
pub mod telemetry;
pub mod trace;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Reasoning State ────────────────────────────────────────────────────
pub use state::{
    clamp_confidence, ArtifactKey, ExecutionSummary, PhaseStatistics, ReasoningPhase,
    ReasoningState, ReasoningStep,
};

// ── Telemetry ──────────────────────────────────────────────────────────
pub use telemetry::{
    CollectorError, DataRequirement, LogRecord, MetricPoint, MetricSeries, RequirementKind,
    TelemetryBundle, TelemetryCollector, TelemetryRecords,
};

// ── Tracing Hooks ──────────────────────────────────────────────────────
pub use trace::{NoopTracer, ReasoningTracer};

// ── Configuration ──────────────────────────────────────────────────────
pub use builders::{PipelineConfig, PipelineConfigBuilder};
pub use proxy::{ProxyConfig, ProxyProtocol};
