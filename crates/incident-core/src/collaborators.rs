//! External collaborator seams
//!
//! Agents only talk to infrastructure through these traits:
//! - async: service catalog, log / metrics / config sources, remediation
//!   executor, health checker
//! - sync and read-only: runbook registry, severity classifier
//!
//! [`Collaborators`] bundles one handle of each; tests swap individual
//! handles with the `with_*` methods.

use crate::config::OrchestratorConfig;
use crate::error::CollaboratorError;
use crate::runbooks::Runbook;
use crate::types::{
    ActionType, ConfigAudit, Deployment, ExecutionOutcome, HealthReport, LogQueryResult,
    MetricsSnapshot, OncallRotation, RelatedIncident, ServiceInfo, Severity,
};
use std::sync::Arc;

/// Service registry, deploy tracker, on-call schedule and incident history
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// Registry entry; `NotFound` for unknown services
    async fn service_info(&self, service: &str) -> Result<ServiceInfo, CollaboratorError>;

    /// Most recent deployments, newest first
    async fn recent_deploys(
        &self,
        service: &str,
        limit: usize,
    ) -> Result<Vec<Deployment>, CollaboratorError>;

    /// On-call rotation of a team, if the team has one
    async fn oncall(&self, team: &str) -> Result<Option<OncallRotation>, CollaboratorError>;

    /// Related past incidents and dependency notes
    async fn related_incidents(
        &self,
        service: &str,
    ) -> Result<Vec<RelatedIncident>, CollaboratorError>;
}

/// Centralised log index
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    /// Error patterns for the service over the last `window_minutes`
    async fn query_logs(
        &self,
        service: &str,
        window_minutes: u32,
    ) -> Result<LogQueryResult, CollaboratorError>;
}

/// Metrics platform
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetricsSource: Send + Sync {
    /// Current and baseline values for the service
    async fn query_metrics(
        &self,
        service: &str,
        window_minutes: u32,
    ) -> Result<MetricsSnapshot, CollaboratorError>;
}

/// Configuration drift detector
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    /// Compare running and declared configuration
    async fn check_config(&self, service: &str) -> Result<ConfigAudit, CollaboratorError>;
}

/// Executes remediation actions against infrastructure
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RemediationExecutor: Send + Sync {
    /// Run `action` for the service; `iteration` is the 1-based attempt
    async fn execute(
        &self,
        action: ActionType,
        service: &str,
        iteration: u32,
    ) -> Result<ExecutionOutcome, CollaboratorError>;
}

/// Post-remediation health checks
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HealthChecker: Send + Sync {
    /// Check the service after remediation attempt `iteration`
    async fn check(&self, service: &str, iteration: u32) -> Result<HealthReport, CollaboratorError>;
}

/// Read-only runbook lookup
pub trait RunbookRegistry: Send + Sync {
    /// Runbook implementing `action`
    fn get(&self, action: ActionType) -> Option<Runbook>;

    /// Every runbook in catalogue order
    fn list(&self) -> Vec<Runbook>;

    /// First runbook in catalogue order that addresses `symptom`
    fn select_for_symptom(&self, symptom: &str) -> Option<ActionType>;
}

/// Result of severity classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Base severity
    pub severity: Severity,
    /// Keyword that decided it, if any
    pub keyword: Option<String>,
}

/// Maps alert text to a base severity
pub trait SeverityClassifier: Send + Sync {
    /// Classify lower-cased alert text
    fn classify(&self, text: &str) -> Classification;
}

/// One handle per collaborator
#[derive(Clone)]
pub struct Collaborators {
    /// Service catalog
    pub catalog: Arc<dyn ServiceCatalog>,
    /// Log index
    pub logs: Arc<dyn LogSource>,
    /// Metrics platform
    pub metrics: Arc<dyn MetricsSource>,
    /// Config drift detector
    pub config: Arc<dyn ConfigSource>,
    /// Remediation executor
    pub executor: Arc<dyn RemediationExecutor>,
    /// Health checker
    pub health: Arc<dyn HealthChecker>,
    /// Runbook registry
    pub runbooks: Arc<dyn RunbookRegistry>,
    /// Severity classifier
    pub classifier: Arc<dyn SeverityClassifier>,
}

impl Collaborators {
    /// Simulated infrastructure seeded from `config.simulation`
    #[must_use]
    pub fn simulated(config: &OrchestratorConfig) -> Self {
        use crate::simulated::{SimulatedExecutor, SimulatedHealthChecker, SimulatedInfrastructure};

        let seed = config.simulation.seed;
        let infrastructure = Arc::new(SimulatedInfrastructure::new(seed));
        Self {
            catalog: infrastructure.clone(),
            logs: infrastructure.clone(),
            metrics: infrastructure.clone(),
            config: infrastructure,
            executor: Arc::new(SimulatedExecutor::new(
                config.simulation.latency_scale,
                seed.map(|s| s.wrapping_add(1)),
            )),
            health: Arc::new(SimulatedHealthChecker::new(seed.map(|s| s.wrapping_add(2)))),
            runbooks: Arc::new(crate::runbooks::StandardRunbooks::new()),
            classifier: Arc::new(crate::agents::KeywordClassifier::new()),
        }
    }

    /// Replace the service catalog
    #[inline]
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn ServiceCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the log source
    #[inline]
    #[must_use]
    pub fn with_logs(mut self, logs: Arc<dyn LogSource>) -> Self {
        self.logs = logs;
        self
    }

    /// Replace the metrics source
    #[inline]
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the config source
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.config = config;
        self
    }

    /// Replace the remediation executor
    #[inline]
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn RemediationExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the health checker
    #[inline]
    #[must_use]
    pub fn with_health(mut self, health: Arc<dyn HealthChecker>) -> Self {
        self.health = health;
        self
    }

    /// Replace the runbook registry
    #[inline]
    #[must_use]
    pub fn with_runbooks(mut self, runbooks: Arc<dyn RunbookRegistry>) -> Self {
        self.runbooks = runbooks;
        self
    }

    /// Replace the severity classifier
    #[inline]
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn SeverityClassifier>) -> Self {
        self.classifier = classifier;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
