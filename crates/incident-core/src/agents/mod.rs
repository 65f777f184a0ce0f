//! Incident agents
//!
//! Triage (run sequentially):
//! - [`ContextEnricher`]: service metadata, deploys, on-call, related incidents
//! - [`TriageAgent`]: P1..P4 classification with reasoning
//! - [`ResponderAssigner`]: initial responder, escalation path, channels
//!
//! Diagnostics (run in parallel):
//! - [`LogAnalyzer`], [`MetricsChecker`], [`ConfigAuditor`]
//!
//! Escalation loop body:
//! - [`RemediationAgent`], [`VerificationAgent`]

mod config_auditor;
mod enricher;
mod log_analyzer;
mod metrics_checker;
mod remediator;
mod responder;
mod triage;
mod verifier;

pub use config_auditor::ConfigAuditor;
pub use enricher::ContextEnricher;
pub use log_analyzer::LogAnalyzer;
pub use metrics_checker::MetricsChecker;
pub use remediator::{candidate_actions, select_action, symptoms_for, RemediationAgent};
pub use responder::{escalation_path, notification_channels, ResponderAssigner};
pub use triage::{adjust_for_tier, KeywordClassifier, TriageAgent};
pub use verifier::VerificationAgent;

use crate::keys;
use crate::types::{Alert, DiagnosticResult};
use incident_workflow::{WorkflowContext, WorkflowError};

/// Alert the run was started with
pub(crate) fn alert_of(ctx: &WorkflowContext) -> Result<Alert, WorkflowError> {
    Ok(ctx.require(keys::ALERT)?)
}

/// Diagnostic results present in the context, in logs, metrics, config order
pub(crate) fn diagnostics_of(ctx: &WorkflowContext) -> Result<Vec<DiagnosticResult>, WorkflowError> {
    let mut results = Vec::new();
    for (key, _) in keys::DIAGNOSTIC_KEYS {
        if let Some(result) = ctx.get::<DiagnosticResult>(key)? {
            results.push(result);
        }
    }
    Ok(results)
}
