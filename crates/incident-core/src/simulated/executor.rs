//! Simulated remediation executor and health checker
//!
//! Both improve with the attempt number:
//! - executor success probability `min(0.4 + (i-1)*0.2, 0.85)`
//! - health pass probability `min(0.3 + (i-1)*0.35, 0.95)`

use super::SharedRng;
use crate::collaborators::{HealthChecker, RemediationExecutor, RunbookRegistry};
use crate::error::CollaboratorError;
use crate::runbooks::StandardRunbooks;
use crate::types::{ActionType, ExecutionOutcome, HealthChecks, HealthReport};
use chrono::Utc;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::time::Duration;

const FAILURE_REASONS: [&str; 4] = [
    "Step 3 failed: health check returned non-200 status",
    "Timeout waiting for pods to reach Ready state",
    "Error rate did not decrease within expected timeframe",
    "Partial success: some pods healthy but not all replicas",
];

const HEALTH_CHECKS: [&str; 4] = ["http_health", "error_rate", "latency_sla", "dependency_check"];

fn base_delay_secs(action: ActionType) -> f64 {
    match action {
        ActionType::RestartService => 2.0,
        ActionType::ClearCache => 1.0,
        ActionType::ScaleUp => 3.0,
        ActionType::RollbackDeploy => 4.0,
        ActionType::RotateCerts => 5.0,
        ActionType::DrainConnections => 2.5,
    }
}

fn success_probability(iteration: u32) -> f64 {
    (0.4 + f64::from(iteration.saturating_sub(1)) * 0.2).min(0.85)
}

fn pass_probability(iteration: u32) -> f64 {
    (0.3 + f64::from(iteration.saturating_sub(1)) * 0.35).min(0.95)
}

/// Executor that sleeps for a scaled, action-specific delay and rolls the outcome
#[derive(Debug)]
pub struct SimulatedExecutor {
    latency_scale: f64,
    runbooks: StandardRunbooks,
    rng: SharedRng,
}

impl SimulatedExecutor {
    /// Create with a delay multiplier and optional seed
    #[must_use]
    pub fn new(latency_scale: f64, seed: Option<u64>) -> Self {
        Self {
            latency_scale: latency_scale.max(0.0),
            runbooks: StandardRunbooks::new(),
            rng: SharedRng::new(seed),
        }
    }

    /// Delay applied before reporting an outcome
    #[must_use]
    pub fn delay_for(&self, action: ActionType) -> Duration {
        Duration::from_secs_f64(base_delay_secs(action) * self.latency_scale)
    }
}

#[async_trait::async_trait]
impl RemediationExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        action: ActionType,
        service: &str,
        iteration: u32,
    ) -> Result<ExecutionOutcome, CollaboratorError> {
        let runbook = self
            .runbooks
            .get(action)
            .ok_or_else(|| CollaboratorError::NotFound(format!("runbook for {action}")))?;

        tokio::time::sleep(self.delay_for(action)).await;

        let (success, reason) = self.rng.with(|rng| {
            let success = rng.random_bool(success_probability(iteration));
            let reason = FAILURE_REASONS.choose(rng).copied().unwrap_or(FAILURE_REASONS[0]);
            (success, reason)
        });

        let steps = runbook.steps.len();
        let output = if success {
            format!(
                "Successfully executed {} on {service}. Steps completed: {steps} of {steps}. Service is responding to health checks.",
                runbook.name
            )
        } else {
            format!(
                "Remediation {} on {service} did not fully succeed. Reason: {reason}",
                runbook.name
            )
        };
        tracing::debug!("{}: simulated {} attempt {} -> {}", service, action, iteration, success);
        Ok(ExecutionOutcome { success, output })
    }
}

/// Health checker whose pass rate climbs with the attempt number
#[derive(Debug)]
pub struct SimulatedHealthChecker {
    rng: SharedRng,
}

impl SimulatedHealthChecker {
    /// Create with an optional seed
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: SharedRng::new(seed),
        }
    }
}

#[async_trait::async_trait]
impl HealthChecker for SimulatedHealthChecker {
    async fn check(&self, service: &str, iteration: u32) -> Result<HealthReport, CollaboratorError> {
        let report = self.rng.with(|rng| {
            let healthy = rng.random_bool(pass_probability(iteration));
            let mut report = HealthReport::new(service, iteration, healthy);
            report.timestamp = Utc::now();

            if healthy {
                report.error_rate = (rng.random_range(0.0001..0.005_f64) * 10_000.0).round() / 10_000.0;
                report.p99_latency_ms = rng.random_range(20..=200);
                report.http_status = 200;
                report.uptime_seconds = rng.random_range(60..=7200);
                report.checks = HealthChecks {
                    passed: HEALTH_CHECKS.iter().map(ToString::to_string).collect(),
                    failed: Vec::new(),
                };
                report.evidence = vec![
                    format!("Health endpoint returned HTTP {}", report.http_status),
                    format!("Error rate {:.4} below threshold 0.01", report.error_rate),
                    format!("P99 latency {}ms within SLA", report.p99_latency_ms),
                    format!("Service uptime: {}s since last restart", report.uptime_seconds),
                ];
            } else {
                report.error_rate = (rng.random_range(0.05..0.25_f64) * 10_000.0).round() / 10_000.0;
                report.p99_latency_ms = rng.random_range(1000..=10_000);
                report.http_status = [200_u16, 503, 502].choose(rng).copied().unwrap_or(503);
                report.uptime_seconds = rng.random_range(5..=60);
                let dependency_ok = rng.random_bool(0.5);
                let (passed, failed) = HEALTH_CHECKS
                    .iter()
                    .map(ToString::to_string)
                    .partition(|check| dependency_ok && check == "dependency_check");
                report.checks = HealthChecks { passed, failed };
                report.evidence = vec![
                    format!("Health endpoint returned HTTP {}", report.http_status),
                    format!("Error rate {:.4} exceeds threshold 0.01", report.error_rate),
                    format!("P99 latency {}ms exceeds SLA", report.p99_latency_ms),
                    "Service has not stabilized after remediation".to_string(),
                ];
            }
            report
        });
        tracing::debug!("{}: simulated health check {} -> {}", service, iteration, report.verdict);
        Ok(report)
    }
}
