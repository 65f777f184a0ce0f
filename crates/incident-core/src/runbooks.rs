//! Standard remediation runbooks
//!
//! Six procedures in fixed order. Symptom lookup walks them in that order and
//! returns the first runbook declaring the symptom.

use crate::collaborators::RunbookRegistry;
use crate::types::ActionType;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Runbook risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Safe to run unattended
    Low,
    /// Visible impact possible
    Medium,
    /// Needs explicit approval
    High,
}

/// Parameterised remediation procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runbook {
    /// Action this runbook implements
    pub action_type: ActionType,
    /// `RB-NNN`
    pub id: String,
    /// Display name
    pub name: String,
    /// What the procedure does
    pub description: String,
    /// Ordered steps
    pub steps: Vec<String>,
    /// Risk classification
    pub risk_level: RiskLevel,
    /// Whether it may run without approval
    pub auto_approve: bool,
    /// Expected wall-clock duration
    pub expected_duration_secs: u64,
    /// Symptoms this runbook addresses
    pub applicable_symptoms: Vec<String>,
}

impl Runbook {
    /// Whether the runbook declares `symptom`
    #[inline]
    #[must_use]
    pub fn applies_to(&self, symptom: &str) -> bool {
        self.applicable_symptoms.iter().any(|s| s == symptom)
    }
}

#[allow(clippy::too_many_arguments)]
fn runbook(
    action_type: ActionType,
    id: &str,
    name: &str,
    description: &str,
    steps: &[&str],
    risk_level: RiskLevel,
    auto_approve: bool,
    expected_duration_secs: u64,
    symptoms: &[&str],
) -> Runbook {
    Runbook {
        action_type,
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        steps: steps.iter().map(ToString::to_string).collect(),
        risk_level,
        auto_approve,
        expected_duration_secs,
        applicable_symptoms: symptoms.iter().map(ToString::to_string).collect(),
    }
}

static CATALOG: Lazy<IndexMap<ActionType, Runbook>> = Lazy::new(|| {
    [
        runbook(
            ActionType::RestartService,
            "RB-001",
            "Service Rolling Restart",
            "Rolling restart of the deployment to clear transient state, reset connections and reload configuration.",
            &[
                "Verify current pod status and replica count",
                "Initiate rolling restart",
                "Wait for all pods to reach Ready state (timeout: 120s)",
                "Verify health endpoint returns 200 OK",
                "Check error rate returns to baseline within 60s",
            ],
            RiskLevel::Low,
            true,
            180,
            &["memory_leak", "connection_pool_exhaustion", "stale_cache", "thread_pool_exhaustion"],
        ),
        runbook(
            ActionType::ScaleUp,
            "RB-002",
            "Horizontal Scale-Up",
            "Increase the replica count to absorb elevated traffic or reduce per-pod resource pressure.",
            &[
                "Check current replica count and autoscaler configuration",
                "Calculate target replicas from current load",
                "Scale deployment to target replica count",
                "Wait for new pods to be scheduled and Ready",
                "Verify load is distributed across new replicas",
                "Monitor error rate and latency for 60s after scaling",
            ],
            RiskLevel::Low,
            true,
            300,
            &["high_cpu", "high_latency", "connection_pool_exhaustion", "traffic_spike"],
        ),
        runbook(
            ActionType::RollbackDeploy,
            "RB-003",
            "Deployment Rollback",
            "Roll back to the previous known-good version when a recent deploy correlates with the incident.",
            &[
                "Identify current and previous deployment versions",
                "Verify previous version is available in the registry",
                "Initiate rollback",
                "Wait for all pods to run the previous version",
                "Verify health endpoint returns 200 OK",
                "Monitor error rate for 120s to confirm improvement",
                "Tag current version as rolled-back",
            ],
            RiskLevel::Medium,
            false,
            240,
            &[
                "regression_after_deploy",
                "new_error_patterns",
                "config_drift",
                "performance_degradation",
            ],
        ),
        runbook(
            ActionType::ClearCache,
            "RB-004",
            "Cache Invalidation",
            "Clear application caches to resolve issues caused by stale or corrupted cached data.",
            &[
                "Identify cache backends used by the service",
                "Flush cache keys matching the service prefix",
                "Trigger in-memory cache clear via admin endpoint",
                "Invalidate CDN cache for affected paths",
                "Monitor cache hit rate recovery over 60s",
                "Verify error rate decrease after cache rebuild",
            ],
            RiskLevel::Low,
            true,
            60,
            &["stale_data", "inconsistent_responses", "serialization_errors"],
        ),
        runbook(
            ActionType::RotateCerts,
            "RB-005",
            "Certificate Rotation",
            "Rotate TLS certificates through certificate renewal or manual replacement.",
            &[
                "Check current certificate expiry and issuer",
                "Trigger certificate renewal",
                "Wait for the new certificate to be issued (timeout: 300s)",
                "Verify the new certificate is valid",
                "Restart pods to pick up the new certificate",
                "Verify TLS handshake succeeds",
                "Update certificate monitoring to track the new expiry",
            ],
            RiskLevel::Medium,
            false,
            420,
            &["certificate_expiry", "tls_handshake_failure", "ssl_error"],
        ),
        runbook(
            ActionType::DrainConnections,
            "RB-006",
            "Connection Pool Drain",
            "Gracefully drain and reset connection pools to resolve exhaustion or stale connections.",
            &[
                "Reduce incoming traffic via load balancer weight",
                "Wait for in-flight requests to complete (timeout: 30s)",
                "Reset connection pool configuration",
                "Gradually restore traffic weight",
                "Monitor connection pool utilization for 60s",
            ],
            RiskLevel::Medium,
            true,
            120,
            &["connection_pool_exhaustion", "connection_timeout", "stale_connections"],
        ),
    ]
    .into_iter()
    .map(|runbook| (runbook.action_type, runbook))
    .collect()
});

/// Built-in runbook catalogue
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRunbooks;

impl StandardRunbooks {
    /// Create registry handle
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RunbookRegistry for StandardRunbooks {
    fn get(&self, action: ActionType) -> Option<Runbook> {
        CATALOG.get(&action).cloned()
    }

    fn list(&self) -> Vec<Runbook> {
        CATALOG.values().cloned().collect()
    }

    fn select_for_symptom(&self, symptom: &str) -> Option<ActionType> {
        CATALOG
            .values()
            .find(|runbook| runbook.applies_to(symptom))
            .map(|runbook| runbook.action_type)
    }
}
