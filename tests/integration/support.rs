//! Test doubles shared by the integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ops_reasoner::services::reasoning::{PhaseContext, PhaseRunner};
use ops_reasoner::AppError;
use ops_reasoner_core::{
    CollectorError, DataRequirement, LogRecord, MetricPoint, MetricSeries, PipelineConfig,
    ReasoningPhase, ReasoningState, ReasoningTracer, RequirementKind, TelemetryCollector,
    TelemetryRecords,
};
use ops_reasoner_llm::{
    LlmError, LlmProvider, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig,
};
use ops_reasoner_rules::RuleEngine;

use ops_reasoner::services::reasoning::Orchestrator;

// ============================================================================
// LLM
// ============================================================================

/// Replies in order; once the script runs out every call fails.
pub struct ScriptedLlm {
    config: ProviderConfig,
    replies: Mutex<VecDeque<LlmResult<String>>>,
    pub calls: Mutex<usize>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<LlmResult<String>>) -> Self {
        Self {
            config: ProviderConfig::default(),
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn offline() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn send_message(
        &self,
        _messages: Vec<Message>,
        _system: Option<String>,
        _options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        *self.calls.lock().unwrap() += 1;
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(LlmResponse::from_text(text, "scripted-model")),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::NetworkError {
                message: "connection refused".to_string(),
            }),
        }
    }

    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

pub fn plan_json(tags: &[&str]) -> String {
    plan_json_for(tags, &["system"])
}

pub fn plan_json_for(tags: &[&str], services: &[&str]) -> String {
    serde_json::json!({
        "user_intent": "inspect resources",
        "analysis_plan": "collect and compare against thresholds",
        "data_requirements": tags,
        "target_services": services,
        "priority": "high",
    })
    .to_string()
}

// ============================================================================
// Collector
// ============================================================================

/// Serves canned values; requirements listed in `failing` and services
/// listed in `failing_services` return errors.
pub struct ScriptedCollector {
    pub failing: Vec<DataRequirement>,
    pub failing_services: Vec<String>,
    pub cpu_percent: f64,
    pub hang: bool,
    pub requested: Mutex<Vec<DataRequirement>>,
    pub filters: Mutex<Vec<(DataRequirement, Option<String>)>>,
}

impl ScriptedCollector {
    pub fn healthy() -> Self {
        Self {
            failing: Vec::new(),
            failing_services: Vec::new(),
            cpu_percent: 35.0,
            hang: false,
            requested: Mutex::new(Vec::new()),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(failing: Vec<DataRequirement>) -> Self {
        Self {
            failing,
            ..Self::healthy()
        }
    }

    pub fn requested(&self) -> Vec<DataRequirement> {
        self.requested.lock().unwrap().clone()
    }

    /// Every (requirement, service filter) pair fetched, sorted.
    pub fn filters(&self) -> Vec<(DataRequirement, Option<String>)> {
        let mut filters = self.filters.lock().unwrap().clone();
        filters.sort();
        filters
    }
}

fn series(metric: &str, value: f64) -> MetricSeries {
    MetricSeries::new(
        metric,
        vec![MetricPoint {
            timestamp: 1_700_000_000,
            value,
        }],
    )
}

#[async_trait]
impl TelemetryCollector for ScriptedCollector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(
        &self,
        requirement: DataRequirement,
        service_filter: Option<&str>,
    ) -> Result<TelemetryRecords, CollectorError> {
        self.requested.lock().unwrap().push(requirement);
        self.filters
            .lock()
            .unwrap()
            .push((requirement, service_filter.map(str::to_string)));
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let service_down = service_filter
            .map(|service| self.failing_services.iter().any(|s| s == service))
            .unwrap_or(false);
        if self.failing.contains(&requirement) || service_down {
            return Err(CollectorError::Api {
                status: 503,
                message: format!("{} backend unavailable", requirement),
            });
        }
        let records = match requirement {
            DataRequirement::CpuMetrics => {
                TelemetryRecords::Metrics(vec![series("system.cpu.user", self.cpu_percent)])
            }
            DataRequirement::MemoryMetrics => TelemetryRecords::Metrics(vec![
                series("system.mem.used", 4.0),
                series("system.mem.free", 12.0),
            ]),
            DataRequirement::DiskMetrics => {
                TelemetryRecords::Metrics(vec![series("system.disk.in_use", 0.5)])
            }
            other => match other.kind() {
                RequirementKind::Metrics => TelemetryRecords::Metrics(Vec::new()),
                RequirementKind::Logs => TelemetryRecords::Logs(vec![LogRecord::new(
                    "error",
                    "connection timeout to orders-db",
                )]),
            },
        };
        Ok(records)
    }
}

// ============================================================================
// Tracer
// ============================================================================

#[derive(Default)]
pub struct RecordingTracer {
    pub events: Mutex<Vec<String>>,
}

impl RecordingTracer {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ReasoningTracer for RecordingTracer {
    fn session_started(&self, _state: &ReasoningState) {
        self.push("session_started".to_string());
    }

    fn phase_started(&self, _session_id: &str, phase: ReasoningPhase) {
        self.push(format!("phase:{}", phase));
    }

    fn data_collected(
        &self,
        _session_id: &str,
        successful: &[DataRequirement],
        failed: &[DataRequirement],
        _elapsed: Duration,
    ) {
        self.push(format!(
            "collected:{}/{}",
            successful.len(),
            successful.len() + failed.len()
        ));
    }

    fn error(&self, _session_id: &str, message: &str) {
        self.push(format!("error:{}", message));
    }

    fn session_completed(&self, _state: &ReasoningState) {
        self.push("session_completed".to_string());
    }
}

// ============================================================================
// Phases
// ============================================================================

pub struct FailingPhase(pub ReasoningPhase);

#[async_trait]
impl PhaseRunner for FailingPhase {
    fn phase(&self) -> ReasoningPhase {
        self.0
    }

    async fn run(
        &self,
        _ctx: &PhaseContext<'_>,
        _state: &mut ReasoningState,
    ) -> Result<(), AppError> {
        Err(AppError::internal(format!("simulated {} failure", self.0)))
    }
}

pub fn orchestrator(
    llm: ScriptedLlm,
    collector: Arc<ScriptedCollector>,
    tracer: Arc<RecordingTracer>,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(llm),
        collector,
        RuleEngine::new(),
        tracer,
        PipelineConfig::default(),
    )
}
