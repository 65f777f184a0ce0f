//! Incident workflow builders
//!
//! - [`sequential_triage`]: enrich, triage, assign responder
//! - [`parallel_diagnostics`]: logs, metrics and config side by side
//! - [`escalation_loop`]: remediate then verify, up to `max_escalation_levels` times

use crate::agents::{
    ConfigAuditor, ContextEnricher, LogAnalyzer, MetricsChecker, RemediationAgent,
    ResponderAssigner, TriageAgent, VerificationAgent,
};
use crate::collaborators::Collaborators;
use crate::config::OrchestratorConfig;
use incident_workflow::{Loop, Parallel, Sequential, SharedAgent, WorkflowError};
use std::sync::Arc;

/// Name of the triage sequence
pub const TRIAGE_PIPELINE: &str = "sequential_triage_pipeline";
/// Name of the diagnostics fan-out
pub const PARALLEL_DIAGNOSTICS: &str = "parallel_diagnostics";
/// Name of the escalation loop
pub const ESCALATION_LOOP: &str = "escalation_loop";

/// Enrich, triage, assign responder
pub fn sequential_triage(collaborators: &Collaborators) -> Result<Sequential, WorkflowError> {
    Sequential::new(
        TRIAGE_PIPELINE,
        vec![
            Arc::new(ContextEnricher::new(collaborators.catalog.clone())),
            Arc::new(TriageAgent::new(collaborators.classifier.clone())),
            Arc::new(ResponderAssigner::new(collaborators.catalog.clone())),
        ],
    )
}

/// Log analysis, metrics check and config audit as isolated branches
pub fn parallel_diagnostics(
    collaborators: &Collaborators,
    config: &OrchestratorConfig,
) -> Result<Parallel, WorkflowError> {
    let window = config.log_window_minutes;
    Parallel::new(
        PARALLEL_DIAGNOSTICS,
        vec![
            Arc::new(LogAnalyzer::new(collaborators.logs.clone(), window)),
            Arc::new(MetricsChecker::new(collaborators.metrics.clone(), window)),
            Arc::new(ConfigAuditor::new(collaborators.config.clone())),
        ],
    )
}

/// Remediator and verifier making up the loop body
#[must_use]
pub fn escalation_agents(
    collaborators: &Collaborators,
    config: &OrchestratorConfig,
) -> (SharedAgent, SharedAgent) {
    (
        Arc::new(RemediationAgent::new(
            collaborators.executor.clone(),
            collaborators.runbooks.clone(),
            config.remediation_timeout(),
        )),
        Arc::new(VerificationAgent::new(collaborators.health.clone())),
    )
}

/// Loop over a custom remediator / verifier pair
pub fn escalation_loop_with(
    remediator: SharedAgent,
    verifier: SharedAgent,
    max_iterations: u32,
) -> Result<Loop, WorkflowError> {
    Loop::new(ESCALATION_LOOP, vec![remediator, verifier], max_iterations)
}

/// Remediate then verify until healthy or `max_escalation_levels` attempts
pub fn escalation_loop(
    collaborators: &Collaborators,
    config: &OrchestratorConfig,
) -> Result<Loop, WorkflowError> {
    let (remediator, verifier) = escalation_agents(collaborators, config);
    escalation_loop_with(remediator, verifier, config.max_escalation_levels)
}
