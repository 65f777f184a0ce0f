//! Post-remediation verification, second half of the escalation loop body

use super::alert_of;
use crate::collaborators::HealthChecker;
use crate::keys;
use crate::types::{EscalationLevel, HealthReport};
use incident_workflow::{Agent, WorkflowContext, WorkflowError};
use std::sync::Arc;

/// Checks service health; completes the loop or raises the escalation level
pub struct VerificationAgent {
    health: Arc<dyn HealthChecker>,
}

impl VerificationAgent {
    /// Agent name
    pub const NAME: &'static str = "verifier";

    /// Create with a health checker
    #[must_use]
    pub fn new(health: Arc<dyn HealthChecker>) -> Self {
        Self { health }
    }
}

#[async_trait::async_trait]
impl Agent for VerificationAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        let alert = alert_of(&ctx)?;
        let service = alert.service.as_str();
        let iteration: u32 = ctx.get_or(keys::LOOP_ITERATION_KEY, 1)?;

        let report: HealthReport = self
            .health
            .check(service, iteration)
            .await
            .map_err(|e| e.in_agent(Self::NAME))?;
        ctx.insert(keys::VERIFICATION_RESULT, &report)?;

        if report.healthy {
            tracing::info!("{}: verification passed on attempt {}", service, iteration);
            ctx.insert(keys::LOOP_COMPLETE_KEY, &true)?;
            ctx.insert(keys::NEEDS_ESCALATION, &false)?;
        } else {
            let current: EscalationLevel = ctx.get_or(keys::ESCALATION_LEVEL, EscalationLevel::default())?;
            let next = current.next();
            tracing::warn!(
                "{}: verification failed on attempt {}, escalating {} -> {} ({})",
                service,
                iteration,
                current,
                next,
                report.evidence.join("; ")
            );
            ctx.insert(keys::ESCALATION_LEVEL, &next)?;
            ctx.insert(keys::NEEDS_ESCALATION, &true)?;
            ctx.insert(keys::LOOP_COMPLETE_KEY, &false)?;
        }
        Ok(ctx)
    }
}
