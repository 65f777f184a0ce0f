//! Context keys shared by the incident agents and the pipeline
//!
//! The terminal context of a run exposes every result under these names, so
//! session stores read them instead of a bespoke API.

pub use incident_workflow::{ERRORS_KEY, LOOP_COMPLETE_KEY, LOOP_EXHAUSTED_KEY, LOOP_ITERATION_KEY};

/// Triggering [`Alert`](crate::types::Alert)
pub const ALERT: &str = "alert";
/// Session identifier string
pub const SESSION_ID: &str = "session_id";
/// Milestones recorded by the pipeline
pub const TIMELINE: &str = "timeline";

/// Enriched [`IncidentContext`](crate::types::IncidentContext)
pub const INCIDENT_CONTEXT: &str = "incident_context";
/// Owning team name
pub const OWNER_TEAM: &str = "owner_team";
/// Registry entry for the service
pub const SERVICE_INFO: &str = "service_info";

/// Classified [`Severity`](crate::types::Severity)
pub const SEVERITY: &str = "severity";
/// Human-readable triage explanation
pub const TRIAGE_REASONING: &str = "triage_reasoning";
/// Initial [`ResponderAssignment`](crate::types::ResponderAssignment)
pub const ASSIGNED_RESPONDER: &str = "assigned_responder";
/// Four-step escalation chain
pub const ESCALATION_PATH: &str = "escalation_path";
/// Current [`EscalationLevel`](crate::types::EscalationLevel)
pub const ESCALATION_LEVEL: &str = "escalation_level";
/// Channels to notify
pub const NOTIFICATION_CHANNELS: &str = "notification_channels";

/// Log analyzer result
pub const LOG_DIAGNOSTICS: &str = "log_diagnostics";
/// Metrics checker result
pub const METRICS_DIAGNOSTICS: &str = "metrics_diagnostics";
/// Config auditor result
pub const CONFIG_DIAGNOSTICS: &str = "config_diagnostics";

/// Diagnostic keys paired with their summary labels, in report order
pub const DIAGNOSTIC_KEYS: [(&str, &str); 3] = [
    (LOG_DIAGNOSTICS, "logs"),
    (METRICS_DIAGNOSTICS, "metrics"),
    (CONFIG_DIAGNOSTICS, "config"),
];

/// Ordered remediation history
pub const REMEDIATION_ACTIONS: &str = "remediation_actions";
/// Most recent remediation
pub const LAST_REMEDIATION: &str = "last_remediation";
/// Latest [`HealthReport`](crate::types::HealthReport)
pub const VERIFICATION_RESULT: &str = "verification_result";
/// Set when the last verification failed
pub const NEEDS_ESCALATION: &str = "needs_escalation";

/// Final or partial [`IncidentReport`](crate::types::IncidentReport)
pub const REPORT: &str = "report";
/// Pipeline failure message
pub const ERROR: &str = "error";
