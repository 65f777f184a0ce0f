//! Incident report assembly
//!
//! Reports are built from the terminal context of a run; a partial report is
//! produced when the escalation loop is exhausted.

use crate::agents::{alert_of, diagnostics_of};
use crate::keys;
use crate::types::{
    EscalationLevel, EscalationRecord, IncidentReport, RemediationAction, Severity, TimelineEntry,
};
use chrono::Utc;
use incident_workflow::{WorkflowContext, WorkflowError};
use uuid::Uuid;

/// Characters of executor output kept per escalation record
pub const HISTORY_OUTPUT_LIMIT: usize = 200;

/// First `max` characters of `text`
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// `RPT-` followed by eight upper-case hex characters
#[must_use]
pub fn report_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("RPT-{}", hex[..8].to_uppercase())
}

/// One-line outcome of a run
#[must_use]
pub fn resolution_summary(
    actions: &[RemediationAction],
    resolved: bool,
    iteration: u32,
    level: EscalationLevel,
) -> String {
    if !resolved {
        return format!(
            "Automated remediation exhausted after {} attempts. Escalated to {level}.",
            actions.len()
        );
    }
    match actions.iter().rev().find(|action| action.success) {
        Some(last) => format!(
            "Incident resolved via {} on attempt {iteration}. Total actions taken: {}.",
            last.action_type,
            actions.len()
        ),
        None => "Incident resolved after automated diagnostics and remediation.".to_string(),
    }
}

/// Build the final (`resolved`) or partial report from a run's context
pub fn build_report(
    ctx: &WorkflowContext,
    session_id: &str,
    resolved: bool,
) -> Result<IncidentReport, WorkflowError> {
    let alert = alert_of(ctx)?;
    let severity: Severity = ctx.get_or(keys::SEVERITY, Severity::P4)?;
    let remediations: Vec<RemediationAction> = ctx.get_or(keys::REMEDIATION_ACTIONS, Vec::new())?;
    let iteration: u32 = ctx.get_or(keys::LOOP_ITERATION_KEY, 0)?;
    let level: EscalationLevel = ctx.get_or(keys::ESCALATION_LEVEL, EscalationLevel::L4Management)?;
    let timeline: Vec<TimelineEntry> = ctx.get_or(keys::TIMELINE, Vec::new())?;

    let escalation_history = remediations
        .iter()
        .zip(1_u32..)
        .map(|(action, iteration)| EscalationRecord {
            iteration,
            action: action.action_type,
            success: action.success,
            output: truncate_chars(&action.output, HISTORY_OUTPUT_LIMIT),
        })
        .collect();

    Ok(IncidentReport {
        id: report_id(),
        session_id: session_id.to_string(),
        alert,
        severity,
        diagnostics: diagnostics_of(ctx)?,
        resolution_summary: resolution_summary(&remediations, resolved, iteration, level),
        remediations,
        escalation_history,
        timeline,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionType, Alert, DiagnosticResult};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn action(action_type: ActionType, success: bool, output: &str) -> RemediationAction {
        RemediationAction {
            action_type,
            description: String::new(),
            runbook_id: "RB-001".into(),
            parameters: BTreeMap::new(),
            executed: true,
            success,
            output: output.into(),
        }
    }

    #[test]
    fn report_id_shape() {
        let id = report_id();
        assert_eq!(id.len(), 12);
        assert!(id.starts_with("RPT-"));
        assert!(id[4..].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ok", 10), "ok");
    }

    #[test]
    fn summaries() {
        let actions = [
            action(ActionType::RestartService, false, "no"),
            action(ActionType::ScaleUp, true, "yes"),
        ];
        assert_eq!(
            resolution_summary(&actions, true, 2, EscalationLevel::L2Oncall),
            "Incident resolved via scale_up on attempt 2. Total actions taken: 2."
        );
        assert_eq!(
            resolution_summary(&actions[..1], true, 1, EscalationLevel::L1Auto),
            "Incident resolved after automated diagnostics and remediation."
        );
        assert_eq!(
            resolution_summary(&actions, false, 2, EscalationLevel::L4Management),
            "Automated remediation exhausted after 2 attempts. Escalated to L4_MANAGEMENT."
        );
    }

    #[test]
    fn report_collects_context() {
        let long_output = "x".repeat(450);
        let mut ctx = WorkflowContext::new()
            .with(keys::ALERT, &Alert::new("payment-service", "Errors"))
            .unwrap()
            .with(keys::SEVERITY, &Severity::P2)
            .unwrap()
            .with(keys::CONFIG_DIAGNOSTICS, &DiagnosticResult::new("config_auditor"))
            .unwrap()
            .with(keys::LOG_DIAGNOSTICS, &DiagnosticResult::new("log_analyzer"))
            .unwrap()
            .with(keys::LOOP_ITERATION_KEY, &1_u32)
            .unwrap();
        ctx.push(
            keys::REMEDIATION_ACTIONS,
            &action(ActionType::RestartService, true, &long_output),
        )
        .unwrap();

        let report = build_report(&ctx, "01J0SESSION", true).unwrap();
        assert_eq!(report.severity, Severity::P2);
        let agents: Vec<&str> = report.diagnostics.iter().map(|d| d.agent_name.as_str()).collect();
        assert_eq!(agents, ["log_analyzer", "config_auditor"]);
        assert_eq!(report.escalation_history[0].output.len(), HISTORY_OUTPUT_LIMIT);
        assert_eq!(report.remediations[0].output.len(), 450);
        assert_eq!(
            report.resolution_summary,
            "Incident resolved via restart_service on attempt 1. Total actions taken: 1."
        );
    }
}
