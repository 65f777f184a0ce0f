//! Testing utilities for the incident-response workspace
//!
//! Deterministic collaborator doubles and fixtures. Nothing here draws random
//! numbers, so assertions can rely on exact outcomes.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::Utc;
use incident_core::collaborators::{
    ConfigSource, HealthChecker, LogSource, MetricsSource, RemediationExecutor, ServiceCatalog,
};
use incident_core::types::{
    ActionType, AnomalySeverity, ConfigAudit, ConfigDrift, ConfigStatus, Deployment, DriftSeverity,
    ExecutionOutcome, HealthReport, LogEntry, LogLevel, LogQueryResult, MetricAnomaly,
    MetricsSnapshot, OncallRotation, RelatedIncident, ServiceInfo, ServiceTier,
};
use incident_core::{
    Alert, CollaboratorError, Collaborators, IncidentPipeline, OrchestratorConfig, SessionManager,
};
use incident_events::EventBus;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const SERVICE: &str = "payment-service";
pub const TEAM: &str = "payments";

// ============================================================================
// Fixtures
// ============================================================================

/// P2 alert for the fixture service
pub fn alert() -> Alert {
    Alert::new(SERVICE, "High error rate on checkout")
        .with_id("ALERT-001")
        .with_description("5xx responses above threshold")
        .with_source("prometheus")
}

/// P1 alert for the fixture service
pub fn outage_alert() -> Alert {
    Alert::new(SERVICE, "Checkout outage").with_id("ALERT-002")
}

/// Default config with no simulated latency and a fixed seed
pub fn config() -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_latency_scale(0.0)
        .with_seed(7)
}

pub fn rotation() -> OncallRotation {
    OncallRotation {
        team: TEAM.to_string(),
        l1_oncall: "engineer-alice".to_string(),
        l2_oncall: "engineer-bob".to_string(),
        l3_senior: "staff-eng-grace".to_string(),
        l4_manager: "em-henry".to_string(),
        slack_channel: "#payments-oncall".to_string(),
        escalation_policy: "payments-critical".to_string(),
        pagerduty_service: "PSVC001".to_string(),
    }
}

pub fn service_info(tier: ServiceTier) -> ServiceInfo {
    ServiceInfo {
        name: SERVICE.to_string(),
        namespace: TEAM.to_string(),
        owner_team: TEAM.to_string(),
        tier,
        replicas: 4,
        cpu_limit: "2000m".to_string(),
        memory_limit: "4Gi".to_string(),
        dependencies: vec!["db-proxy".to_string()],
        image: format!("registry.example.com/{SERVICE}:v2.14.3"),
        health_endpoint: "/healthz".to_string(),
        oncall: None,
    }
}

pub fn log_entry(level: LogLevel, message: &str, count: u64) -> LogEntry {
    LogEntry {
        timestamp: Utc::now(),
        level,
        message: message.to_string(),
        logger: "com.example.Checkout".to_string(),
        trace_id: "trace-0001".to_string(),
        count,
        stack_trace: None,
    }
}

pub fn anomaly(metric: &str, current: f64, baseline: f64, severity: AnomalySeverity) -> MetricAnomaly {
    MetricAnomaly {
        metric: metric.to_string(),
        current,
        baseline,
        deviation_pct: (current - baseline) / baseline * 100.0,
        severity,
    }
}

pub fn drift(field: &str, severity: DriftSeverity) -> ConfigDrift {
    ConfigDrift {
        field: field.to_string(),
        expected: "declared".to_string(),
        actual: "running".to_string(),
        severity,
        impact: format!("{field} differs from the declared state"),
    }
}

/// Collaborators backed entirely by deterministic doubles
pub fn collaborators(
    infrastructure: StaticInfrastructure,
    executor: Arc<ScriptedExecutor>,
    health: Arc<ScriptedHealthChecker>,
) -> Collaborators {
    let infrastructure = Arc::new(infrastructure);
    Collaborators::simulated(&config())
        .with_catalog(infrastructure.clone())
        .with_logs(infrastructure.clone())
        .with_metrics(infrastructure.clone())
        .with_config(infrastructure)
        .with_executor(executor)
        .with_health(health)
}

pub fn pipeline(collaborators: Collaborators) -> IncidentPipeline {
    IncidentPipeline::new(config(), collaborators, EventBus::new())
}

pub fn sessions(collaborators: Collaborators) -> SessionManager {
    SessionManager::new(pipeline(collaborators))
}

// ============================================================================
// Infrastructure
// ============================================================================

/// Fixed catalog, logs, metrics and config for one service
#[derive(Debug, Clone)]
pub struct StaticInfrastructure {
    pub service: ServiceInfo,
    pub deploys: Vec<Deployment>,
    pub rotation: Option<OncallRotation>,
    pub related: Vec<RelatedIncident>,
    pub logs: Vec<LogEntry>,
    pub anomalies: Vec<MetricAnomaly>,
    pub drifts: Vec<ConfigDrift>,
}

impl StaticInfrastructure {
    /// Critical-tier service with no diagnostic signal
    pub fn quiet() -> Self {
        Self {
            service: service_info(ServiceTier::Critical),
            deploys: vec![Deployment {
                version: "v2.14.3".to_string(),
                deployed_at: Utc::now() - chrono::Duration::hours(2),
                deployed_by: "ci-bot".to_string(),
                commit: "a1b2c3d".to_string(),
                changelog: "Fix race condition in refund processing".to_string(),
                rollback_available: true,
            }],
            rotation: Some(rotation()),
            related: Vec::new(),
            logs: Vec::new(),
            anomalies: Vec::new(),
            drifts: Vec::new(),
        }
    }

    /// Memory pressure: maps to the `memory_leak` symptom only
    pub fn memory_pressure() -> Self {
        Self::quiet().with_anomaly(anomaly("memory_pct", 96.0, 60.0, AnomalySeverity::Warning))
    }

    #[must_use]
    pub fn with_tier(mut self, tier: ServiceTier) -> Self {
        self.service.tier = tier;
        self
    }

    #[must_use]
    pub fn with_log(mut self, entry: LogEntry) -> Self {
        self.logs.push(entry);
        self
    }

    #[must_use]
    pub fn with_anomaly(mut self, anomaly: MetricAnomaly) -> Self {
        self.anomalies.push(anomaly);
        self
    }

    #[must_use]
    pub fn with_drift(mut self, drift: ConfigDrift) -> Self {
        self.drifts.push(drift);
        self
    }

    #[must_use]
    pub fn without_rotation(mut self) -> Self {
        self.rotation = None;
        self
    }

    fn known(&self, service: &str) -> Result<(), CollaboratorError> {
        if service == self.service.name {
            Ok(())
        } else {
            Err(CollaboratorError::NotFound(service.to_string()))
        }
    }
}

#[async_trait]
impl ServiceCatalog for StaticInfrastructure {
    async fn service_info(&self, service: &str) -> Result<ServiceInfo, CollaboratorError> {
        self.known(service)?;
        Ok(self.service.clone())
    }

    async fn recent_deploys(
        &self,
        service: &str,
        limit: usize,
    ) -> Result<Vec<Deployment>, CollaboratorError> {
        self.known(service)?;
        Ok(self.deploys.iter().take(limit).cloned().collect())
    }

    async fn oncall(&self, team: &str) -> Result<Option<OncallRotation>, CollaboratorError> {
        Ok(self.rotation.clone().filter(|rotation| rotation.team == team))
    }

    async fn related_incidents(
        &self,
        _service: &str,
    ) -> Result<Vec<RelatedIncident>, CollaboratorError> {
        Ok(self.related.clone())
    }
}

#[async_trait]
impl LogSource for StaticInfrastructure {
    async fn query_logs(
        &self,
        service: &str,
        window_minutes: u32,
    ) -> Result<LogQueryResult, CollaboratorError> {
        Ok(LogQueryResult {
            service: service.to_string(),
            window_minutes,
            entries: self.logs.clone(),
        })
    }
}

#[async_trait]
impl MetricsSource for StaticInfrastructure {
    async fn query_metrics(
        &self,
        service: &str,
        window_minutes: u32,
    ) -> Result<MetricsSnapshot, CollaboratorError> {
        let baseline: BTreeMap<String, f64> = self
            .anomalies
            .iter()
            .map(|a| (a.metric.clone(), a.baseline))
            .collect();
        let current = self
            .anomalies
            .iter()
            .map(|a| (a.metric.clone(), a.current))
            .collect();
        Ok(MetricsSnapshot {
            service: service.to_string(),
            window_minutes,
            current,
            baseline,
            anomalies: self.anomalies.clone(),
        })
    }
}

#[async_trait]
impl ConfigSource for StaticInfrastructure {
    async fn check_config(&self, service: &str) -> Result<ConfigAudit, CollaboratorError> {
        let status = if self.drifts.is_empty() {
            ConfigStatus::Compliant
        } else {
            ConfigStatus::Drifted
        };
        Ok(ConfigAudit {
            service: service.to_string(),
            status,
            expected_image: self.service.image.clone(),
            drifts: self.drifts.clone(),
            last_sync: None,
        })
    }
}

/// Log index that is always down
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingLogSource;

#[async_trait]
impl LogSource for FailingLogSource {
    async fn query_logs(
        &self,
        _service: &str,
        _window_minutes: u32,
    ) -> Result<LogQueryResult, CollaboratorError> {
        Err(CollaboratorError::unavailable("log index", "connection refused"))
    }
}

/// Catalog that is always down
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCatalog;

#[async_trait]
impl ServiceCatalog for FailingCatalog {
    async fn service_info(&self, _service: &str) -> Result<ServiceInfo, CollaboratorError> {
        Err(CollaboratorError::unavailable("service registry", "connection refused"))
    }

    async fn recent_deploys(
        &self,
        _service: &str,
        _limit: usize,
    ) -> Result<Vec<Deployment>, CollaboratorError> {
        Err(CollaboratorError::unavailable("deploy tracker", "connection refused"))
    }

    async fn oncall(&self, _team: &str) -> Result<Option<OncallRotation>, CollaboratorError> {
        Err(CollaboratorError::unavailable("on-call schedule", "connection refused"))
    }

    async fn related_incidents(
        &self,
        _service: &str,
    ) -> Result<Vec<RelatedIncident>, CollaboratorError> {
        Err(CollaboratorError::unavailable("incident history", "connection refused"))
    }
}

// ============================================================================
// Remediation
// ============================================================================

/// Executor replaying a fixed list of outcomes
///
/// Attempts past the end of the script fail. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: Vec<bool>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(ActionType, u32)>>,
}

impl ScriptedExecutor {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt fails
    pub fn failing() -> Self {
        Self::new([])
    }

    /// Sleep before answering each call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Actions executed so far with their iteration
    pub fn calls(&self) -> Vec<(ActionType, u32)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemediationExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        action: ActionType,
        service: &str,
        iteration: u32,
    ) -> Result<ExecutionOutcome, CollaboratorError> {
        let attempt = {
            let mut calls = self.calls.lock();
            calls.push((action, iteration));
            calls.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let success = self.script.get(attempt - 1).copied().unwrap_or(false);
        let output = if success {
            format!("{action} completed for {service}")
        } else {
            format!("{action} failed for {service}")
        };
        Ok(ExecutionOutcome { success, output })
    }
}

/// Health checker replaying a fixed list of verdicts
///
/// Checks past the end of the script report unhealthy.
#[derive(Debug, Default)]
pub struct ScriptedHealthChecker {
    script: Vec<bool>,
    checks: Mutex<Vec<u32>>,
}

impl ScriptedHealthChecker {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
            checks: Mutex::new(Vec::new()),
        }
    }

    /// Healthy on the `n`th check (1-based), unhealthy before
    pub fn healthy_on(n: usize) -> Self {
        Self::new((1..=n).map(|i| i == n))
    }

    /// Never healthy
    pub fn never() -> Self {
        Self::new([])
    }

    /// Iterations checked so far
    pub fn checks(&self) -> Vec<u32> {
        self.checks.lock().clone()
    }
}

#[async_trait]
impl HealthChecker for ScriptedHealthChecker {
    async fn check(&self, service: &str, iteration: u32) -> Result<HealthReport, CollaboratorError> {
        let index = {
            let mut checks = self.checks.lock();
            checks.push(iteration);
            checks.len() - 1
        };
        let healthy = self.script.get(index).copied().unwrap_or(false);
        let mut report = HealthReport::new(service, iteration, healthy);
        report.evidence.push(if healthy {
            "health endpoint returned 200".to_string()
        } else {
            "health endpoint returned 503".to_string()
        });
        Ok(report)
    }
}
