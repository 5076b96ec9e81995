//! Reasoning Pipeline Integration Tests
//!
//! Full orchestrator sessions against scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ops_reasoner::services::history::{ChatMessage, ContextFormatter};
use ops_reasoner::services::reasoning::{
    execution_artifact, extract_answer, feedback_output, planning_output, PhaseRunner,
};
use ops_reasoner::services::reasoning::{ExecutionPhase, FeedbackPhase};
use ops_reasoner::AppError;
use ops_reasoner_core::{DataRequirement, ReasoningPhase};
use tokio_util::sync::CancellationToken;

use ops_reasoner_core::TelemetryRecords;

use crate::support::{
    orchestrator, plan_json, plan_json_for, FailingPhase, RecordingTracer, ScriptedCollector,
    ScriptedLlm,
};

// ============================================================================
// Planning fallback
// ============================================================================

#[tokio::test]
async fn test_planning_fallback_when_llm_unavailable() {
    let collector = Arc::new(ScriptedCollector::healthy());
    let tracer = Arc::new(RecordingTracer::default());
    let state = orchestrator(ScriptedLlm::offline(), collector.clone(), tracer)
        .process("why is the server slow?")
        .await;

    let plan = planning_output(&state).expect("planning artifact");
    assert!(plan.is_fallback());
    let requirements = &plan.value().data_requirements;
    assert!(requirements.contains(&DataRequirement::CpuMetrics));
    assert!(requirements.contains(&DataRequirement::MemoryMetrics));

    let requested = collector.requested();
    assert!(requested.contains(&DataRequirement::CpuMetrics));
    assert!(requested.contains(&DataRequirement::MemoryMetrics));

    assert!(!state.has_errors());
    assert!(state.is_complete());
    assert!(!extract_answer(&state).is_empty());
}

#[tokio::test]
async fn test_planning_fallback_on_prose_answer() {
    let llm = ScriptedLlm::new(vec![Ok(
        "You should probably look at the CPU and memory graphs.".to_string()
    )]);
    let collector = Arc::new(ScriptedCollector::healthy());
    let state = orchestrator(llm, collector.clone(), Arc::new(RecordingTracer::default()))
        .process("why is the server slow?")
        .await;

    let plan = planning_output(&state).unwrap();
    assert!(plan.is_fallback());
    assert!(!plan.value().data_requirements.is_empty());
    assert!(!collector.requested().is_empty());
}

#[tokio::test]
async fn test_fallback_uses_only_the_new_request() {
    let history = vec![ChatMessage {
        prompt: "is there a memory leak?".to_string(),
        answer: "memory looks stable".to_string(),
        timestamp: Utc::now(),
    }];
    let query = ContextFormatter::default().format_chat_context(&history, "check disk usage");

    let collector = Arc::new(ScriptedCollector::healthy());
    let state = orchestrator(
        ScriptedLlm::offline(),
        collector.clone(),
        Arc::new(RecordingTracer::default()),
    )
    .process(&query)
    .await;

    assert_eq!(collector.requested(), vec![DataRequirement::DiskMetrics]);
    assert_eq!(state.request_type(), Some("monitoring"));
    assert_eq!(state.user_query(), query);
}

// ============================================================================
// Collection
// ============================================================================

#[tokio::test]
async fn test_one_of_three_collectors_failing() {
    let llm = ScriptedLlm::new(vec![Ok(plan_json(&[
        "cpu_metrics",
        "memory_metrics",
        "disk_metrics",
    ]))]);
    let collector = Arc::new(ScriptedCollector::failing(vec![DataRequirement::DiskMetrics]));
    let tracer = Arc::new(RecordingTracer::default());
    let state = orchestrator(llm, collector, tracer.clone())
        .process("check cpu, memory and disk")
        .await;

    let artifact = execution_artifact(&state).expect("execution artifact");
    let summary = &artifact.collection;
    assert_eq!(summary.requested.len(), 3);
    assert_eq!(summary.successful.len(), 2);
    assert!(summary.successful.contains(&DataRequirement::CpuMetrics));
    assert!(summary.successful.contains(&DataRequirement::MemoryMetrics));
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].tag, DataRequirement::DiskMetrics);
    assert!(summary.failed[0].error.contains("503"));

    let data = state.collected_data();
    assert!(data.records.contains_key(&DataRequirement::CpuMetrics));
    assert!(data.records.contains_key(&DataRequirement::MemoryMetrics));
    assert!(!data.records.contains_key(&DataRequirement::DiskMetrics));
    assert!(data.failures.contains_key(&DataRequirement::DiskMetrics));

    assert!(!state.has_errors());
    assert!(state
        .identified_issues()
        .iter()
        .any(|issue| issue.starts_with("Data collection failed for")));

    let data_step = state
        .phase_steps(ReasoningPhase::Execution)
        .into_iter()
        .find(|step| step.agent_name == "DataAgent")
        .expect("data step");
    assert_eq!(data_step.confidence, 0.7);

    assert!(tracer.events().contains(&"collected:2/3".to_string()));
}

#[tokio::test]
async fn test_every_target_service_is_collected() {
    let llm = ScriptedLlm::new(vec![Ok(plan_json_for(
        &["error_logs"],
        &["checkout", "system", "payments"],
    ))]);
    let collector = Arc::new(ScriptedCollector::healthy());
    let state = orchestrator(llm, collector.clone(), Arc::new(RecordingTracer::default()))
        .process("errors in checkout and payments?")
        .await;

    assert_eq!(
        collector.filters(),
        vec![
            (DataRequirement::ErrorLogs, Some("checkout".to_string())),
            (DataRequirement::ErrorLogs, Some("payments".to_string())),
        ]
    );
    let Some(TelemetryRecords::Logs(logs)) =
        state.collected_data().records.get(&DataRequirement::ErrorLogs)
    else {
        panic!("expected error logs");
    };
    let services: Vec<Option<&str>> = logs.iter().map(|l| l.service.as_deref()).collect();
    assert_eq!(services, vec![Some("checkout"), Some("payments")]);

    let artifact = execution_artifact(&state).unwrap();
    assert_eq!(artifact.collection.services, vec!["checkout", "payments"]);
    assert!(artifact.collection.failed.is_empty());
}

#[tokio::test]
async fn test_one_failing_service_is_isolated() {
    let llm = ScriptedLlm::new(vec![Ok(plan_json_for(
        &["error_logs"],
        &["checkout", "payments"],
    ))]);
    let collector = Arc::new(ScriptedCollector {
        failing_services: vec!["payments".to_string()],
        ..ScriptedCollector::healthy()
    });
    let tracer = Arc::new(RecordingTracer::default());
    let state = orchestrator(llm, collector.clone(), tracer.clone())
        .process("errors in checkout and payments?")
        .await;

    assert_eq!(collector.filters().len(), 2);
    let data = state.collected_data();
    assert!(data.records.contains_key(&DataRequirement::ErrorLogs));
    assert!(!data.failures.contains_key(&DataRequirement::ErrorLogs));

    let summary = execution_artifact(&state).unwrap().collection;
    assert_eq!(summary.successful, vec![DataRequirement::ErrorLogs]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].service.as_deref(), Some("payments"));
    assert!(summary.failed_tags().is_empty());

    assert!(!state.has_errors());
    assert!(state
        .identified_issues()
        .iter()
        .any(|issue| issue.starts_with("Data collection failed for error_logs (payments)")));
    let data_step = state
        .phase_steps(ReasoningPhase::Execution)
        .into_iter()
        .find(|step| step.agent_name == "DataAgent")
        .unwrap();
    assert_eq!(data_step.confidence, 0.7);
    assert!(tracer.events().contains(&"collected:1/1".to_string()));
}

#[tokio::test]
async fn test_critical_cpu_reaches_recommendations() {
    let llm = ScriptedLlm::new(vec![Ok(plan_json(&["cpu_metrics"]))]);
    let collector = Arc::new(ScriptedCollector {
        cpu_percent: 95.0,
        ..ScriptedCollector::healthy()
    });
    let state = orchestrator(llm, collector, Arc::new(RecordingTracer::default()))
        .process("check cpu")
        .await;

    assert!(state
        .identified_issues()
        .iter()
        .any(|issue| issue.starts_with("[critical]") && issue.contains("cpu_usage")));
    assert!(state
        .recommendations()
        .contains(&"Identify CPU-heavy processes and optimize hot paths".to_string()));
    assert!(state
        .action_plan()
        .contains(&"Verify resolution and continue monitoring".to_string()));

    let feedback = feedback_output(&state).unwrap();
    assert!(feedback.is_fallback());
    assert_eq!(feedback.value().priority, "high");
}

// ============================================================================
// Phase failures
// ============================================================================

#[tokio::test]
async fn test_all_phases_failing_still_returns_state() {
    let tracer = Arc::new(RecordingTracer::default());
    let phases: Vec<Box<dyn PhaseRunner>> = vec![
        Box::new(FailingPhase(ReasoningPhase::Planning)),
        Box::new(FailingPhase(ReasoningPhase::Execution)),
        Box::new(FailingPhase(ReasoningPhase::Feedback)),
    ];
    let orch = orchestrator(
        ScriptedLlm::offline(),
        Arc::new(ScriptedCollector::healthy()),
        tracer.clone(),
    )
    .with_phases(phases)
    .unwrap();

    let state = orch.process("why is the server slow?").await;

    assert!(state.has_errors());
    assert!(!state.is_complete());
    assert_eq!(state.error_messages().len(), 3);
    assert!(state.error_messages()[1].starts_with("execution phase failed:"));
    assert_eq!(
        extract_answer(&state),
        "Analysis completed. Processed 0 reasoning steps."
    );

    let errors = tracer
        .events()
        .into_iter()
        .filter(|e| e.starts_with("error:"))
        .count();
    assert_eq!(errors, 3);
}

#[tokio::test]
async fn test_planning_failure_does_not_stop_execution() {
    let collector = Arc::new(ScriptedCollector::healthy());
    let phases: Vec<Box<dyn PhaseRunner>> = vec![
        Box::new(FailingPhase(ReasoningPhase::Planning)),
        Box::new(ExecutionPhase),
        Box::new(FeedbackPhase),
    ];
    let orch = orchestrator(
        ScriptedLlm::offline(),
        collector.clone(),
        Arc::new(RecordingTracer::default()),
    )
    .with_phases(phases)
    .unwrap();

    let state = orch.process("show me the error logs").await;

    assert_eq!(state.error_messages().len(), 1);
    assert!(state.is_complete());
    assert!(planning_output(&state).is_none());
    assert!(collector.requested().contains(&DataRequirement::ErrorLogs));
    assert!(execution_artifact(&state).is_some());
    assert!(!extract_answer(&state).is_empty());
}

// ============================================================================
// State invariants
// ============================================================================

#[tokio::test]
async fn test_confidence_is_mean_and_steps_ordered() {
    let tracer = Arc::new(RecordingTracer::default());
    let state = orchestrator(
        ScriptedLlm::offline(),
        Arc::new(ScriptedCollector::healthy()),
        tracer.clone(),
    )
    .process("check memory")
    .await;

    let steps = state.steps();
    assert!(steps.len() >= 6);
    let mean = steps.iter().map(|s| s.confidence).sum::<f64>() / steps.len() as f64;
    assert!((state.total_confidence() - mean).abs() < 1e-9);

    let phases: Vec<ReasoningPhase> = steps.iter().map(|s| s.phase).collect();
    assert!(phases.windows(2).all(|w| w[0] <= w[1]));

    let events = tracer.events();
    assert_eq!(events.first().map(String::as_str), Some("session_started"));
    assert_eq!(events.last().map(String::as_str), Some("session_completed"));
    let phase_events: Vec<&String> = events.iter().filter(|e| e.starts_with("phase:")).collect();
    assert_eq!(
        phase_events,
        vec!["phase:planning", "phase:execution", "phase:feedback"]
    );
}

#[tokio::test]
async fn test_cancellation_abandons_session() {
    let collector = Arc::new(ScriptedCollector {
        hang: true,
        ..ScriptedCollector::healthy()
    });
    let orch = orchestrator(
        ScriptedLlm::offline(),
        collector,
        Arc::new(RecordingTracer::default()),
    );

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = orch.process_with_cancel("check cpu", &token).await;
    assert!(matches!(result, Err(AppError::Cancelled)));
}
