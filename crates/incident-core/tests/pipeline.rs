//! End-to-end pipeline runs against deterministic collaborators

use incident_core::agents::candidate_actions;
use incident_core::keys;
use incident_core::prelude::*;
use incident_core::types::ActionType;
use incident_core::PipelineRun;
use incident_events::Subscription;
use incident_test_utils::{
    self as fixtures, FailingCatalog, FailingLogSource, ScriptedExecutor, ScriptedHealthChecker,
    StaticInfrastructure,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn doubles(
    infrastructure: StaticInfrastructure,
    executor: ScriptedExecutor,
    health: ScriptedHealthChecker,
) -> (Collaborators, Arc<ScriptedExecutor>, Arc<ScriptedHealthChecker>) {
    let executor = Arc::new(executor);
    let health = Arc::new(health);
    let collaborators = fixtures::collaborators(infrastructure, executor.clone(), health.clone());
    (collaborators, executor, health)
}

fn kinds(events: &[Arc<Event>]) -> Vec<EventType> {
    events.iter().map(|event| event.event_type).collect()
}

async fn run(pipeline: &IncidentPipeline) -> (PipelineRun, Vec<Arc<Event>>) {
    let session = SessionId::new();
    let events = pipeline.bus().subscribe(&session.to_string());
    let run = pipeline
        .run(fixtures::alert(), &session, &CancellationToken::new())
        .await;
    (run, events.collect_all().await)
}

#[tokio::test]
async fn resolves_on_second_attempt() {
    let (collaborators, executor, health) = doubles(
        StaticInfrastructure::quiet(),
        ScriptedExecutor::new([false, true]),
        ScriptedHealthChecker::healthy_on(2),
    );
    let pipeline = fixtures::pipeline(collaborators);
    let (run, events) = run(&pipeline).await;

    assert_eq!(run.outcome, PipelineOutcome::Resolved);
    assert_eq!(
        kinds(&events),
        vec![
            EventType::Received,
            EventType::Enriching,
            EventType::Enriched,
            EventType::Triaging,
            EventType::Triaged,
            EventType::DiagnosingLogs,
            EventType::DiagnosingMetrics,
            EventType::DiagnosingConfig,
            EventType::DiagnosticsComplete,
            EventType::Remediating,
            EventType::RemediationAttempted,
            EventType::Verifying,
            EventType::VerificationResult,
            EventType::RemediationAttempted,
            EventType::Verifying,
            EventType::VerificationResult,
            EventType::Resolved,
        ]
    );
    let sequences: Vec<u64> = events.iter().map(|event| event.sequence).collect();
    assert_eq!(sequences, (1..=17).collect::<Vec<u64>>());

    assert_eq!(
        executor.calls(),
        vec![(ActionType::RestartService, 1), (ActionType::ScaleUp, 2)]
    );
    assert_eq!(health.checks(), vec![1, 2]);

    let resolved = events.last().unwrap();
    assert_eq!(resolved.field("total_actions"), Some(&serde_json::json!(2)));
    assert_eq!(resolved.field("iterations"), Some(&serde_json::json!(2)));

    let report: IncidentReport = run.context.require(keys::REPORT).unwrap();
    assert_eq!(
        report.resolution_summary,
        "Incident resolved via scale_up on attempt 2. Total actions taken: 2."
    );
    assert_eq!(report.severity, Severity::P2);
    assert_eq!(report.escalation_history.len(), 2);
    assert_eq!(report.diagnostics.len(), 3);
    let milestones: Vec<&str> = report.timeline.iter().map(|t| t.event.as_str()).collect();
    assert_eq!(milestones.first(), Some(&"alert_received"));
    assert_eq!(milestones.last(), Some(&"resolved"));

    // One failed verification moved the P2 incident from L1 to L2
    assert_eq!(
        run.context.require::<EscalationLevel>(keys::ESCALATION_LEVEL).unwrap(),
        EscalationLevel::L2Oncall
    );
    assert!(pipeline.bus().is_closed(&resolved.session_id));

    let verdicts: Vec<(Option<&serde_json::Value>, Option<&serde_json::Value>)> = events
        .iter()
        .filter(|event| event.event_type == EventType::VerificationResult)
        .map(|event| (event.field("healthy"), event.field("iteration")))
        .collect();
    assert_eq!(
        verdicts,
        vec![
            (Some(&serde_json::json!(false)), Some(&serde_json::json!(1))),
            (Some(&serde_json::json!(true)), Some(&serde_json::json!(2))),
        ]
    );
}

#[tokio::test]
async fn exhaustion_hands_over_to_a_human() {
    let (collaborators, _, health) = doubles(
        StaticInfrastructure::quiet(),
        ScriptedExecutor::failing(),
        ScriptedHealthChecker::never(),
    );
    let pipeline = fixtures::pipeline(collaborators);
    let (run, events) = run(&pipeline).await;

    assert_eq!(run.outcome, PipelineOutcome::HumanTakeover);
    assert_eq!(health.checks(), vec![1, 2, 3]);

    let tail = kinds(&events[events.len() - 2..]);
    assert_eq!(tail, vec![EventType::Escalating, EventType::HumanTakeover]);
    let attempts = events
        .iter()
        .filter(|event| event.event_type == EventType::RemediationAttempted)
        .count();
    assert_eq!(attempts, 3);

    let escalating = &events[events.len() - 2];
    assert_eq!(escalating.field("escalation_level"), Some(&serde_json::json!("L4_MANAGEMENT")));
    assert_eq!(escalating.field("iterations_exhausted"), Some(&serde_json::json!(3)));

    assert!(run.context.flag(keys::LOOP_EXHAUSTED_KEY));
    let report: IncidentReport = run.context.require(keys::REPORT).unwrap();
    assert_eq!(
        report.resolution_summary,
        "Automated remediation exhausted after 3 attempts. Escalated to L4_MANAGEMENT."
    );
    let milestones: Vec<&str> = report.timeline.iter().map(|t| t.event.as_str()).collect();
    assert!(milestones.ends_with(&["escalation", "human_takeover"]));
}

#[tokio::test]
async fn single_attempt_budget() {
    let (collaborators, executor, _) = doubles(
        StaticInfrastructure::quiet(),
        ScriptedExecutor::failing(),
        ScriptedHealthChecker::never(),
    );
    let config = fixtures::config().with_max_escalation_levels(1);
    let pipeline = IncidentPipeline::new(config, collaborators, EventBus::new());
    let (run, events) = run(&pipeline).await;

    assert_eq!(run.outcome, PipelineOutcome::HumanTakeover);
    assert_eq!(executor.calls().len(), 1);
    let takeover = events.last().unwrap();
    assert_eq!(takeover.field("attempts"), Some(&serde_json::json!(1)));
}

#[tokio::test]
async fn actions_stay_within_each_iterations_candidates() {
    let (collaborators, executor, _) = doubles(
        StaticInfrastructure::memory_pressure(),
        ScriptedExecutor::failing(),
        ScriptedHealthChecker::never(),
    );
    let pipeline = fixtures::pipeline(collaborators);
    let (run, _) = run(&pipeline).await;
    assert_eq!(run.outcome, PipelineOutcome::HumanTakeover);

    let calls = executor.calls();
    assert_eq!(
        calls,
        vec![
            (ActionType::RestartService, 1),
            (ActionType::RestartService, 2),
            (ActionType::RollbackDeploy, 3),
        ]
    );
    for (action, iteration) in calls {
        assert!(candidate_actions(iteration).contains(&action));
    }
}

#[tokio::test]
async fn escalation_level_never_decreases() {
    let (collaborators, _, _) = doubles(
        StaticInfrastructure::quiet(),
        ScriptedExecutor::failing(),
        ScriptedHealthChecker::never(),
    );
    let pipeline = fixtures::pipeline(collaborators);
    let session = SessionId::new();
    let events = pipeline.bus().subscribe(&session.to_string());
    let alert = fixtures::outage_alert();
    pipeline.run(alert, &session, &CancellationToken::new()).await;

    let levels: Vec<EscalationLevel> = events
        .collect_all()
        .await
        .iter()
        .filter_map(|event| event.field("escalation_level").cloned())
        .map(|value| serde_json::from_value(value).unwrap())
        .collect();
    // P1 starts at L2 and climbs to the cap
    assert_eq!(levels.first(), Some(&EscalationLevel::L2Oncall));
    assert_eq!(levels.last(), Some(&EscalationLevel::L4Management));
    assert!(levels.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn diagnostic_branch_failure_is_isolated() {
    let (collaborators, _, _) = doubles(
        StaticInfrastructure::quiet(),
        ScriptedExecutor::new([true]),
        ScriptedHealthChecker::healthy_on(1),
    );
    let pipeline = fixtures::pipeline(collaborators.with_logs(Arc::new(FailingLogSource)));
    let (run, events) = run(&pipeline).await;

    assert_eq!(run.outcome, PipelineOutcome::Resolved);
    let complete = events
        .iter()
        .find(|event| event.event_type == EventType::DiagnosticsComplete)
        .unwrap();
    let errors = complete.field("errors").unwrap().as_object().unwrap();
    assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["log_analyzer"]);
    assert!(complete.field("summary").unwrap().get("logs").is_none());
    assert!(complete.field("summary").unwrap().get("metrics").is_some());
    assert_eq!(complete.message, "Diagnostics complete. Found issues in: metrics, config");
    assert!(run.context.errors().contains_key("log_analyzer"));
}

#[tokio::test]
async fn collaborator_outage_fails_the_run() {
    let (collaborators, executor, _) = doubles(
        StaticInfrastructure::quiet(),
        ScriptedExecutor::new([true]),
        ScriptedHealthChecker::healthy_on(1),
    );
    let pipeline = fixtures::pipeline(collaborators.with_catalog(Arc::new(FailingCatalog)));
    let (run, events) = run(&pipeline).await;

    let PipelineOutcome::Failed(message) = &run.outcome else {
        panic!("expected failure, got {:?}", run.outcome);
    };
    assert!(message.contains("service registry unavailable"));
    assert!(executor.calls().is_empty());

    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::Error);
    assert_eq!(last.field("error"), Some(&serde_json::json!(message)));
    assert_eq!(last.message, format!("Pipeline error: {message}"));
    assert_eq!(run.context.require::<String>(keys::ERROR).unwrap(), *message);
    // Nothing from the failed phase leaks into the context
    assert!(run.context.get::<Severity>(keys::SEVERITY).unwrap().is_none());
}

#[tokio::test]
async fn cancelled_before_start() {
    let (collaborators, executor, _) = doubles(
        StaticInfrastructure::quiet(),
        ScriptedExecutor::new([true]),
        ScriptedHealthChecker::healthy_on(1),
    );
    let pipeline = fixtures::pipeline(collaborators);
    let session = SessionId::new();
    let events = pipeline.bus().subscribe(&session.to_string());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = pipeline.run(fixtures::alert(), &session, &cancel).await;
    assert_eq!(run.outcome, PipelineOutcome::Cancelled);
    assert!(executor.calls().is_empty());

    let events = events.collect_all().await;
    assert!(events.iter().all(|event| !event.is_terminal()));
    assert!(pipeline.bus().is_closed(&session.to_string()));
}

async fn wait_for(events: &mut Subscription, kind: EventType) {
    while let Some(event) = events.recv().await {
        if event.event_type == kind {
            return;
        }
    }
    panic!("stream ended before {kind}");
}

#[tokio::test]
async fn cancelled_during_remediation() {
    let (collaborators, executor, health) = doubles(
        StaticInfrastructure::quiet(),
        ScriptedExecutor::new([true]).with_delay(Duration::from_secs(30)),
        ScriptedHealthChecker::healthy_on(1),
    );
    let pipeline = fixtures::pipeline(collaborators);
    let session = SessionId::new();
    let mut events = pipeline.bus().subscribe(&session.to_string());
    let cancel = CancellationToken::new();

    let handle = {
        let pipeline = pipeline.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { pipeline.run(fixtures::alert(), &session, &cancel).await })
    };
    wait_for(&mut events, EventType::Remediating).await;
    cancel.cancel();

    let run = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.outcome, PipelineOutcome::Cancelled);
    assert!(health.checks().is_empty());
    assert!(executor.calls().len() <= 1);
    // Context stays at the last completed phase
    assert!(run.context.get::<IncidentReport>(keys::REPORT).unwrap().is_none());
    assert_eq!(run.context.require::<Severity>(keys::SEVERITY).unwrap(), Severity::P2);

    let rest = events.collect_all().await;
    assert!(rest.iter().all(|event| !event.is_terminal()));
}
