//! Configuration drift audit

use super::alert_of;
use crate::collaborators::ConfigSource;
use crate::keys;
use crate::types::{Anomaly, ConfigAudit, ConfigDrift, ConfigStatus, DiagnosticResult, DriftSeverity};
use incident_workflow::{Agent, WorkflowContext, WorkflowError};
use std::sync::Arc;

/// Compares running configuration with the declared GitOps state
pub struct ConfigAuditor {
    config: Arc<dyn ConfigSource>,
}

impl ConfigAuditor {
    /// Agent name
    pub const NAME: &'static str = "config_auditor";

    /// Create with a drift detector
    #[must_use]
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self { config }
    }
}

fn drift_indicators(drift: &ConfigDrift) -> impl Iterator<Item = &'static str> {
    let field = drift.field.to_lowercase();
    [
        (field.contains("memory") || field.contains("cpu"), "resource_limit_drift"),
        (field.contains("image"), "image_version_mismatch"),
        (field.contains("env"), "env_var_drift"),
        (drift.severity == DriftSeverity::Critical, "critical_config_drift"),
    ]
    .into_iter()
    .filter_map(|(hit, indicator)| hit.then_some(indicator))
}

fn audit_findings(service: &str, audit: &ConfigAudit, result: &mut DiagnosticResult) {
    match audit.status {
        ConfigStatus::Compliant => result.findings.push(format!(
            "No configuration drift detected for {service}. Running config matches declared GitOps state."
        )),
        ConfigStatus::Drifted => {
            result.findings.push(format!(
                "Configuration drift detected for {service}: {} drift item(s) found.",
                audit.drifts.len()
            ));
            for drift in &audit.drifts {
                result.findings.push(format!(
                    "Config drift in '{}': expected='{}', actual='{}'. Impact: {}",
                    drift.field, drift.expected, drift.actual, drift.impact
                ));
                result
                    .severity_indicators
                    .extend(drift_indicators(drift).map(str::to_string));
                result.anomalies.push(Anomaly::ConfigDrift(drift.clone()));
            }
        }
        ConfigStatus::Unknown => result.findings.push(format!(
            "Unable to determine configuration status for {service}."
        )),
    }

    let last_sync = audit
        .last_sync
        .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());
    result.findings.push(format!("Last GitOps sync: {last_sync}"));
}

#[async_trait::async_trait]
impl Agent for ConfigAuditor {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        let alert = alert_of(&ctx)?;
        let service = alert.service.as_str();

        let audit = self
            .config
            .check_config(service)
            .await
            .map_err(|e| e.in_agent(Self::NAME))?;

        let mut result = DiagnosticResult::new(Self::NAME);
        audit_findings(service, &audit, &mut result);

        tracing::info!(
            "{}: config audit complete ({:?}, {} drifts)",
            service,
            audit.status,
            audit.drifts.len()
        );
        result.raw_data = serde_json::to_value(&audit).unwrap_or_default();
        ctx.insert(keys::CONFIG_DIAGNOSTICS, &result)?;
        Ok(ctx)
    }
}
