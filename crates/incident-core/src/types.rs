//! Domain model for incident response
//!
//! Defines:
//! - alerts and the enriched incident context
//! - severity, service tier, escalation level and lifecycle state
//! - diagnostic results, remediation actions and health reports
//! - the final incident report

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use incident_events::EventType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use ulid::Ulid;

/// Unique session identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|_| CoreError::SessionNotFound(s.to_string()))
    }
}

// ============================================================================
// Alert and context
// ============================================================================

/// Incoming alert from a monitoring system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert ID
    pub id: String,
    /// Originating system (datadog, prometheus, ...)
    pub source: String,
    /// Short title
    pub title: String,
    /// Longer description
    pub description: String,
    /// Affected service
    pub service: String,
    /// Affected host
    #[serde(default)]
    pub host: String,
    /// When the alert fired
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Source-specific fields
    #[serde(default)]
    pub raw_data: BTreeMap<String, Value>,
}

impl Alert {
    /// Create an alert with a generated `ALT-XXXXXX` ID
    #[must_use]
    pub fn new(service: impl Into<String>, title: impl Into<String>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string()[..6].to_uppercase();
        Self {
            id: format!("ALT-{suffix}"),
            source: "api".to_string(),
            title: title.into(),
            description: String::new(),
            service: service.into(),
            host: String::new(),
            timestamp: Utc::now(),
            raw_data: BTreeMap::new(),
        }
    }

    /// With explicit ID
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With source system
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// With host
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// With one raw data field
    #[inline]
    #[must_use]
    pub fn with_raw(mut self, key: impl Into<String>, value: Value) -> Self {
        self.raw_data.insert(key.into(), value);
        self
    }

    /// Lower-cased title, description and raw values for keyword matching
    #[must_use]
    pub fn search_text(&self) -> String {
        let raw: Vec<String> = self
            .raw_data
            .values()
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect();
        format!("{} {} {}", self.title, self.description, raw.join(" ")).to_lowercase()
    }
}

/// Service criticality tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    /// Customer-facing, revenue critical
    Critical,
    /// Important internal service
    High,
    /// Standard service
    #[default]
    Medium,
    /// Best effort
    Low,
}

impl ServiceTier {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-call rotation for a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OncallRotation {
    /// Team name
    pub team: String,
    /// First-line on-call
    pub l1_oncall: String,
    /// Primary on-call engineer
    pub l2_oncall: String,
    /// Senior / staff engineer
    pub l3_senior: String,
    /// Engineering manager
    pub l4_manager: String,
    /// Team Slack channel
    pub slack_channel: String,
    /// Escalation policy name
    pub escalation_policy: String,
    /// PagerDuty service ID
    pub pagerduty_service: String,
}

impl OncallRotation {
    /// Rotation used when no team rotation is known
    #[must_use]
    pub fn placeholder(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            l1_oncall: "unknown".to_string(),
            l2_oncall: "unknown".to_string(),
            l3_senior: "unknown".to_string(),
            l4_manager: "unknown".to_string(),
            slack_channel: "#incidents".to_string(),
            escalation_policy: "default".to_string(),
            pagerduty_service: "default".to_string(),
        }
    }

    /// Assignee for an escalation tier
    #[must_use]
    pub fn assignee(&self, level: EscalationLevel) -> &str {
        match level {
            EscalationLevel::L1Auto => &self.l1_oncall,
            EscalationLevel::L2Oncall => &self.l2_oncall,
            EscalationLevel::L3Senior => &self.l3_senior,
            EscalationLevel::L4Management => &self.l4_manager,
        }
    }
}

/// Service registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Kubernetes namespace
    pub namespace: String,
    /// Owning team
    pub owner_team: String,
    /// Criticality tier
    #[serde(default)]
    pub tier: ServiceTier,
    /// Declared replica count
    pub replicas: u32,
    /// CPU limit
    pub cpu_limit: String,
    /// Memory limit
    pub memory_limit: String,
    /// Upstream dependencies
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Deployed image
    pub image: String,
    /// Health endpoint path
    pub health_endpoint: String,
    /// Owner team's rotation, filled in by enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oncall: Option<OncallRotation>,
}

impl ServiceInfo {
    /// Entry for a service missing from the registry
    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "default".to_string(),
            owner_team: "unknown".to_string(),
            tier: ServiceTier::default(),
            replicas: 1,
            cpu_limit: String::new(),
            memory_limit: String::new(),
            dependencies: Vec::new(),
            image: "unknown".to_string(),
            health_endpoint: "/health".to_string(),
            oncall: None,
        }
    }
}

/// Recorded deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Version tag
    pub version: String,
    /// Deployment time
    pub deployed_at: DateTime<Utc>,
    /// Actor
    pub deployed_by: String,
    /// Commit hash
    pub commit: String,
    /// Changelog summary
    pub changelog: String,
    /// Whether a rollback target exists
    pub rollback_available: bool,
}

/// Related historical context for an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelatedIncident {
    /// Past incident on the same service
    Incident {
        /// Incident ID
        incident_id: String,
        /// Title
        title: String,
        /// Severity at the time
        severity: Severity,
        /// Resolution time
        resolved_at: DateTime<Utc>,
        /// Root cause
        root_cause: String,
        /// Fix applied
        resolution: String,
    },
    /// Blast-radius note about upstream dependencies
    DependencyNote {
        /// Note text
        message: String,
        /// Expected impact
        impact: String,
    },
}

/// Alert enriched with operational context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentContext {
    /// Triggering alert
    pub alert: Alert,
    /// Registry entry (with on-call rotation)
    pub service_info: ServiceInfo,
    /// Most recent deployments, newest first
    pub recent_deploys: Vec<Deployment>,
    /// Owning team
    pub owner_team: String,
    /// Related incidents and notes
    pub related_incidents: Vec<RelatedIncident>,
}

// ============================================================================
// Severity, escalation and lifecycle
// ============================================================================

/// Incident severity (P1 most severe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Critical: service down, customer-facing impact
    P1,
    /// High: significant degradation
    P2,
    /// Medium: elevated errors, performance issues
    P3,
    /// Low: minor anomaly
    P4,
}

impl Severity {
    /// All severities, most severe first
    pub const ALL: [Severity; 4] = [Self::P1, Self::P2, Self::P3, Self::P4];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
            Self::P4 => "P4",
        }
    }

    /// One level more severe, saturating at P1
    #[must_use]
    pub const fn raised(self) -> Self {
        match self {
            Self::P1 | Self::P2 => Self::P1,
            Self::P3 => Self::P2,
            Self::P4 => Self::P3,
        }
    }

    /// Base escalation timeout in minutes
    #[must_use]
    pub const fn base_timeout_minutes(self) -> u32 {
        match self {
            Self::P1 => 5,
            Self::P2 => 15,
            Self::P3 => 30,
            Self::P4 => 60,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::config(format!("invalid severity: {s}")))
    }
}

/// Responsibility tier for an unresolved incident
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EscalationLevel {
    /// Automated response
    #[default]
    #[serde(rename = "L1_AUTO")]
    L1Auto,
    /// Primary on-call engineer
    #[serde(rename = "L2_ONCALL")]
    L2Oncall,
    /// Senior / staff engineer
    #[serde(rename = "L3_SENIOR")]
    L3Senior,
    /// Engineering management
    #[serde(rename = "L4_MANAGEMENT")]
    L4Management,
}

impl EscalationLevel {
    /// All levels in ascending order
    pub const ALL: [EscalationLevel; 4] = [
        Self::L1Auto,
        Self::L2Oncall,
        Self::L3Senior,
        Self::L4Management,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L1Auto => "L1_AUTO",
            Self::L2Oncall => "L2_ONCALL",
            Self::L3Senior => "L3_SENIOR",
            Self::L4Management => "L4_MANAGEMENT",
        }
    }

    /// Next tier, capped at L4_MANAGEMENT
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::L1Auto => Self::L2Oncall,
            Self::L2Oncall => Self::L3Senior,
            Self::L3Senior | Self::L4Management => Self::L4Management,
        }
    }

    /// Whether this is the highest tier
    #[inline]
    #[must_use]
    pub const fn is_highest(self) -> bool {
        matches!(self, Self::L4Management)
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscalationLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::InvalidLevel(s.to_string()))
    }
}

/// Lifecycle state of an incident session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    /// Alert accepted
    Received,
    /// Gathering context
    Enriching,
    /// Classifying severity
    Triaging,
    /// Running diagnostics
    Diagnosing,
    /// Executing remediation
    Remediating,
    /// Checking health
    Verifying,
    /// Escalated to a higher tier
    Escalating,
    /// Resolved (terminal)
    Resolved,
    /// Handed to a human (terminal)
    HumanTakeover,
    /// Pipeline failed (terminal)
    Failed,
}

impl IncidentState {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Enriching => "enriching",
            Self::Triaging => "triaging",
            Self::Diagnosing => "diagnosing",
            Self::Remediating => "remediating",
            Self::Verifying => "verifying",
            Self::Escalating => "escalating",
            Self::Resolved => "resolved",
            Self::HumanTakeover => "human_takeover",
            Self::Failed => "failed",
        }
    }

    /// Whether the session can no longer progress on its own
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::HumanTakeover | Self::Failed)
    }

    /// State implied by a pipeline event
    #[must_use]
    pub const fn from_event(event: EventType) -> Self {
        match event {
            EventType::Received => Self::Received,
            EventType::Enriching | EventType::Enriched => Self::Enriching,
            EventType::Triaging | EventType::Triaged => Self::Triaging,
            EventType::DiagnosingLogs
            | EventType::DiagnosingMetrics
            | EventType::DiagnosingConfig
            | EventType::DiagnosticsComplete => Self::Diagnosing,
            EventType::Remediating | EventType::RemediationAttempted => Self::Remediating,
            EventType::Verifying | EventType::VerificationResult => Self::Verifying,
            EventType::Escalating => Self::Escalating,
            EventType::Resolved => Self::Resolved,
            EventType::HumanTakeover => Self::HumanTakeover,
            EventType::Error => Self::Failed,
        }
    }
}

impl std::fmt::Display for IncidentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Triage outputs
// ============================================================================

/// Initial responder for an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponderAssignment {
    /// Assignee (person or `automation`)
    pub name: String,
    /// Owning team
    pub team: String,
    /// Starting escalation tier
    pub level: EscalationLevel,
    /// PagerDuty service ID
    pub pagerduty_service: String,
    /// Slack channel
    pub slack_channel: String,
}

/// One step of the escalation chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStep {
    /// Tier
    pub level: EscalationLevel,
    /// What happens at this tier
    pub action: String,
    /// Minutes before moving on
    pub timeout_minutes: u32,
    /// Who is responsible
    pub assignee: String,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Severity of a metric anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    /// Above baseline
    Warning,
    /// Far above baseline
    Critical,
}

/// Metric deviating from its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAnomaly {
    /// Metric name
    pub metric: String,
    /// Current value
    pub current: f64,
    /// Baseline value
    pub baseline: f64,
    /// Percent above baseline
    pub deviation_pct: f64,
    /// Severity
    pub severity: AnomalySeverity,
}

/// Severity of a configuration drift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    /// Cosmetic
    Low,
    /// Worth fixing
    Medium,
    /// Likely contributes to incidents
    High,
    /// Directly causes failures
    Critical,
}

/// Difference between declared and running configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDrift {
    /// Config field path
    pub field: String,
    /// Declared value
    pub expected: String,
    /// Running value
    pub actual: String,
    /// Severity
    pub severity: DriftSeverity,
    /// Expected impact
    pub impact: String,
}

/// Log severity as reported by the log index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Warning
    Warn,
    /// Error
    Error,
    /// Fatal
    Fatal,
}

impl LogLevel {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated log pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Most recent occurrence
    pub timestamp: DateTime<Utc>,
    /// Level
    pub level: LogLevel,
    /// Message pattern
    pub message: String,
    /// Emitting logger
    pub logger: String,
    /// Sample trace ID (may be empty)
    #[serde(default)]
    pub trace_id: String,
    /// Occurrences in the window
    pub count: u64,
    /// Attached stack trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Log index query result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQueryResult {
    /// Queried service
    pub service: String,
    /// Window in minutes
    pub window_minutes: u32,
    /// Aggregated patterns
    pub entries: Vec<LogEntry>,
}

impl LogQueryResult {
    /// Sum of occurrences across patterns
    #[must_use]
    pub fn total_entries(&self) -> u64 {
        self.entries.iter().map(|entry| entry.count).sum()
    }
}

/// Current and baseline metric values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Queried service
    pub service: String,
    /// Window in minutes
    pub window_minutes: u32,
    /// Current values
    pub current: BTreeMap<String, f64>,
    /// Baseline values
    pub baseline: BTreeMap<String, f64>,
    /// Metrics flagged by the source
    pub anomalies: Vec<MetricAnomaly>,
}

/// Configuration compliance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigStatus {
    /// Running config matches the declared state
    Compliant,
    /// At least one drift
    Drifted,
    /// Service unknown to the config store
    Unknown,
}

/// Config drift audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAudit {
    /// Audited service
    pub service: String,
    /// Compliance status
    pub status: ConfigStatus,
    /// Declared image
    #[serde(default)]
    pub expected_image: String,
    /// Detected drifts
    #[serde(default)]
    pub drifts: Vec<ConfigDrift>,
    /// Last GitOps sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Structured anomaly found by a diagnostic agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    /// Log entry carrying a stack trace
    StackTrace {
        /// Log message
        message: String,
        /// Occurrences
        count: u64,
        /// Trace (truncated)
        stack_trace: String,
    },
    /// Repeated error message
    ErrorSpike {
        /// Log message
        message: String,
        /// Occurrences
        count: u64,
        /// Log level
        level: String,
    },
    /// Timeout messages
    Timeout {
        /// Log message
        message: String,
        /// Occurrences
        count: u64,
    },
    /// Certificate / TLS failures
    TlsFailure {
        /// Log message
        message: String,
        /// Occurrences
        count: u64,
    },
    /// Metric over baseline
    Metric(MetricAnomaly),
    /// Configuration drift
    ConfigDrift(ConfigDrift),
}

/// Output of one diagnostic agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    /// Producing agent
    pub agent_name: String,
    /// Human-readable findings, in discovery order
    pub findings: Vec<String>,
    /// Structured anomalies, in discovery order
    pub anomalies: Vec<Anomaly>,
    /// Severity indicator tags
    pub severity_indicators: BTreeSet<String>,
    /// Raw collaborator response
    pub raw_data: Value,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticResult {
    /// Empty result for an agent
    #[must_use]
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            findings: Vec::new(),
            anomalies: Vec::new(),
            severity_indicators: BTreeSet::new(),
            raw_data: Value::Null,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Remediation and verification
// ============================================================================

/// Remediation action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Rolling restart
    RestartService,
    /// Horizontal scale-up
    ScaleUp,
    /// Roll back to previous deployment
    RollbackDeploy,
    /// Invalidate caches
    ClearCache,
    /// Rotate TLS certificates
    RotateCerts,
    /// Drain and reset connection pools
    DrainConnections,
}

impl ActionType {
    /// All actions in runbook order
    pub const ALL: [ActionType; 6] = [
        Self::RestartService,
        Self::ScaleUp,
        Self::RollbackDeploy,
        Self::ClearCache,
        Self::RotateCerts,
        Self::DrainConnections,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RestartService => "restart_service",
            Self::ScaleUp => "scale_up",
            Self::RollbackDeploy => "rollback_deploy",
            Self::ClearCache => "clear_cache",
            Self::RotateCerts => "rotate_certs",
            Self::DrainConnections => "drain_connections",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| CoreError::config(format!("unknown action type: {s}")))
    }
}

/// Executed remediation step; immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    /// Action kind
    pub action_type: ActionType,
    /// Description
    pub description: String,
    /// Runbook reference
    pub runbook_id: String,
    /// Parameters passed to the executor
    pub parameters: BTreeMap<String, Value>,
    /// Whether the executor ran it
    pub executed: bool,
    /// Whether it succeeded
    pub success: bool,
    /// Executor output
    pub output: String,
}

/// Result reported by a remediation executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Whether the action succeeded
    pub success: bool,
    /// Free-text output
    pub output: String,
}

/// Health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Healthy
    Pass,
    /// Unhealthy
    Fail,
}

impl Verdict {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual health checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthChecks {
    /// Passed check names
    pub passed: Vec<String>,
    /// Failed check names
    pub failed: Vec<String>,
}

/// Post-remediation health report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Checked service
    pub service: String,
    /// Remediation attempt this check follows
    pub iteration: u32,
    /// Check time
    pub timestamp: DateTime<Utc>,
    /// Overall health
    pub healthy: bool,
    /// Health endpoint status
    pub http_status: u16,
    /// Observed error rate
    pub error_rate: f64,
    /// Observed p99 latency
    pub p99_latency_ms: u64,
    /// Uptime since last restart
    pub uptime_seconds: u64,
    /// Individual checks
    pub checks: HealthChecks,
    /// PASS / FAIL
    pub verdict: Verdict,
    /// Supporting evidence
    pub evidence: Vec<String>,
}

impl HealthReport {
    /// Minimal report with the verdict derived from `healthy`
    #[must_use]
    pub fn new(service: impl Into<String>, iteration: u32, healthy: bool) -> Self {
        Self {
            service: service.into(),
            iteration,
            timestamp: Utc::now(),
            healthy,
            http_status: if healthy { 200 } else { 503 },
            error_rate: 0.0,
            p99_latency_ms: 0,
            uptime_seconds: 0,
            checks: HealthChecks::default(),
            verdict: if healthy { Verdict::Pass } else { Verdict::Fail },
            evidence: Vec::new(),
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Remediation attempt summary in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// 1-based attempt number
    pub iteration: u32,
    /// Action taken
    pub action: ActionType,
    /// Outcome
    pub success: bool,
    /// Output (truncated)
    pub output: String,
}

/// Timestamped milestone of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Milestone name
    pub event: String,
    /// Description
    pub description: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl TimelineEntry {
    /// Entry stamped now
    #[must_use]
    pub fn now(event: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Final (or partial) incident report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    /// `RPT-XXXXXXXX`
    pub id: String,
    /// Owning session
    pub session_id: String,
    /// Triggering alert
    pub alert: Alert,
    /// Final severity
    pub severity: Severity,
    /// Diagnostic results in logs, metrics, config order
    pub diagnostics: Vec<DiagnosticResult>,
    /// Remediation history
    pub remediations: Vec<RemediationAction>,
    /// Per-attempt summary
    pub escalation_history: Vec<EscalationRecord>,
    /// One-line outcome
    pub resolution_summary: String,
    /// Milestones
    pub timeline: Vec<TimelineEntry>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escalation_next_is_capped() {
        assert_eq!(EscalationLevel::L1Auto.next(), EscalationLevel::L2Oncall);
        assert_eq!(EscalationLevel::L3Senior.next(), EscalationLevel::L4Management);
        assert_eq!(EscalationLevel::L4Management.next(), EscalationLevel::L4Management);
        assert!(EscalationLevel::L1Auto < EscalationLevel::L4Management);
    }

    #[test]
    fn escalation_wire_names() {
        assert_eq!(serde_json::to_value(EscalationLevel::L2Oncall).unwrap(), json!("L2_ONCALL"));
        assert_eq!("l3_senior".parse::<EscalationLevel>().unwrap(), EscalationLevel::L3Senior);
        assert!(matches!(
            "L5_CEO".parse::<EscalationLevel>(),
            Err(CoreError::InvalidLevel(_))
        ));
    }

    #[test]
    fn severity_raise_saturates() {
        assert_eq!(Severity::P4.raised(), Severity::P3);
        assert_eq!(Severity::P3.raised(), Severity::P2);
        assert_eq!(Severity::P1.raised(), Severity::P1);
        assert!(Severity::P1 < Severity::P4);
    }

    #[test]
    fn state_from_event() {
        assert_eq!(IncidentState::from_event(EventType::DiagnosingMetrics), IncidentState::Diagnosing);
        assert_eq!(IncidentState::from_event(EventType::Error), IncidentState::Failed);
        assert!(IncidentState::from_event(EventType::HumanTakeover).is_terminal());
        assert!(!IncidentState::Escalating.is_terminal());
    }

    #[test]
    fn alert_search_text() {
        let alert = Alert::new("payment-service", "High CPU")
            .with_description("Pods THROTTLED")
            .with_raw("status", json!(503));
        let text = alert.search_text();
        assert!(text.contains("high cpu"));
        assert!(text.contains("throttled"));
        assert!(text.contains("503"));
        assert!(alert.id.starts_with("ALT-"));
        assert_eq!(alert.id.len(), 10);
    }

    #[test]
    fn anomaly_tagging() {
        let anomaly = Anomaly::Metric(MetricAnomaly {
            metric: "cpu_pct".into(),
            current: 99.0,
            baseline: 45.0,
            deviation_pct: 120.0,
            severity: AnomalySeverity::Warning,
        });
        let encoded = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(encoded["type"], json!("metric"));
        assert_eq!(encoded["severity"], json!("warning"));
        let decoded: Anomaly = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, anomaly);
    }
}
