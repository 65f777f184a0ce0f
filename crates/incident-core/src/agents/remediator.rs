//! Runbook-driven remediation, first half of the escalation loop body
//!
//! Each attempt picks from a fixed candidate set that grows more aggressive
//! with the loop iteration:
//!
//! | attempt | candidates |
//! |---------|------------|
//! | 1       | restart_service, clear_cache, drain_connections |
//! | 2       | scale_up, drain_connections, restart_service |
//! | 3+      | rollback_deploy, scale_up, rotate_certs |

use super::{alert_of, diagnostics_of};
use crate::collaborators::{RemediationExecutor, RunbookRegistry};
use crate::keys;
use crate::types::{ActionType, ExecutionOutcome, RemediationAction};
use incident_workflow::{Agent, WorkflowContext, WorkflowError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

const INDICATOR_TO_SYMPTOM: [(&str, &str); 14] = [
    ("cpu_critical", "high_cpu"),
    ("memory_critical", "memory_leak"),
    ("extreme_error_rate", "regression_after_deploy"),
    ("latency_degradation", "high_latency"),
    ("connection_pressure", "connection_pool_exhaustion"),
    ("stack_trace_present", "regression_after_deploy"),
    ("error_spike", "regression_after_deploy"),
    ("timeout_pattern", "connection_timeout"),
    ("fatal_log", "memory_leak"),
    ("resource_limit_drift", "memory_leak"),
    ("image_version_mismatch", "regression_after_deploy"),
    ("env_var_drift", "config_drift"),
    ("critical_config_drift", "config_drift"),
    ("tls_failure", "tls_handshake_failure"),
];

const TLS_SYMPTOMS: [&str; 2] = ["certificate_expiry", "tls_handshake_failure"];

/// Candidate actions for a 1-based attempt number
#[must_use]
pub fn candidate_actions(iteration: u32) -> [ActionType; 3] {
    use ActionType::{
        ClearCache, DrainConnections, RestartService, RollbackDeploy, RotateCerts, ScaleUp,
    };
    match iteration {
        0 | 1 => [RestartService, ClearCache, DrainConnections],
        2 => [ScaleUp, DrainConnections, RestartService],
        _ => [RollbackDeploy, ScaleUp, RotateCerts],
    }
}

/// Symptom categories for a set of severity indicators, sorted
///
/// Unknown indicators are ignored.
pub fn symptoms_for<'a>(indicators: impl IntoIterator<Item = &'a str>) -> BTreeSet<&'static str> {
    indicators
        .into_iter()
        .filter_map(|indicator| {
            INDICATOR_TO_SYMPTOM
                .iter()
                .find(|(known, _)| *known == indicator)
                .map(|(_, symptom)| *symptom)
        })
        .collect()
}

/// Action for an attempt given the observed symptoms
///
/// Order of preference: a symptom's runbook action that is a candidate for this
/// attempt, cert rotation for TLS symptoms, rollback for config drift from the
/// second attempt on, then the attempt's first candidate.
#[must_use]
pub fn select_action(
    symptoms: &BTreeSet<&str>,
    iteration: u32,
    runbooks: &dyn RunbookRegistry,
) -> ActionType {
    let candidates = candidate_actions(iteration);

    let matched = symptoms
        .iter()
        .filter_map(|symptom| runbooks.select_for_symptom(symptom))
        .find(|action| candidates.contains(action));
    if let Some(action) = matched {
        return action;
    }
    if TLS_SYMPTOMS.iter().any(|symptom| symptoms.contains(symptom)) {
        return ActionType::RotateCerts;
    }
    if symptoms.contains("config_drift") && iteration >= 2 {
        return ActionType::RollbackDeploy;
    }
    candidates[0]
}

fn parameters(action: ActionType, service: &str) -> BTreeMap<String, Value> {
    let mut parameters = BTreeMap::from([
        ("service".to_string(), Value::from(service)),
        ("namespace".to_string(), Value::from("production")),
    ]);
    match action {
        ActionType::ScaleUp => {
            parameters.insert("scale_factor".into(), Value::from(1.5));
            parameters.insert("target_replicas".into(), Value::from(6));
        }
        ActionType::RollbackDeploy => {
            parameters.insert("target_version".into(), Value::from("previous"));
        }
        _ => {}
    }
    parameters
}

/// Selects and executes one remediation action per loop iteration
pub struct RemediationAgent {
    executor: Arc<dyn RemediationExecutor>,
    runbooks: Arc<dyn RunbookRegistry>,
    timeout: Duration,
}

impl RemediationAgent {
    /// Agent name
    pub const NAME: &'static str = "remediator";

    /// Create with an executor, a runbook registry and a per-call deadline
    #[must_use]
    pub fn new(
        executor: Arc<dyn RemediationExecutor>,
        runbooks: Arc<dyn RunbookRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            runbooks,
            timeout,
        }
    }

    /// Executor outcome; errors and missed deadlines count as failures
    async fn execute(&self, action: ActionType, service: &str, iteration: u32) -> ExecutionOutcome {
        let call = self.executor.execute(action, service, iteration);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::warn!("{}: {} attempt {} failed: {}", service, action, iteration, err);
                ExecutionOutcome {
                    success: false,
                    output: err.to_string(),
                }
            }
            Err(_) => {
                tracing::warn!(
                    "{}: {} attempt {} timed out after {:?}",
                    service,
                    action,
                    iteration,
                    self.timeout
                );
                ExecutionOutcome {
                    success: false,
                    output: format!("{action} timed out after {}s", self.timeout.as_secs()),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Agent for RemediationAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        let alert = alert_of(&ctx)?;
        let service = alert.service.as_str();
        let iteration: u32 = ctx.get_or(keys::LOOP_ITERATION_KEY, 1)?;

        let diagnostics = diagnostics_of(&ctx)?;
        let symptoms = symptoms_for(
            diagnostics
                .iter()
                .flat_map(|d| d.severity_indicators.iter().map(String::as_str)),
        );
        let action = select_action(&symptoms, iteration, self.runbooks.as_ref());
        tracing::info!(
            "{}: attempt {} selected {} (symptoms {:?})",
            service,
            iteration,
            action,
            symptoms
        );

        let runbook = self.runbooks.get(action);
        let (runbook_id, runbook_name) = runbook.map_or_else(
            || ("RB-000".to_string(), action.to_string()),
            |rb| (rb.id, rb.name),
        );

        let outcome = self.execute(action, service, iteration).await;
        metrics::counter!(
            "incident_remediation_attempts_total",
            "action" => action.as_str(),
            "success" => if outcome.success { "true" } else { "false" }
        )
        .increment(1);

        let record = RemediationAction {
            action_type: action,
            description: format!("Execute {runbook_name} for {service} (attempt {iteration})"),
            runbook_id,
            parameters: parameters(action, service),
            executed: true,
            success: outcome.success,
            output: outcome.output,
        };
        tracing::info!("{}: {} success={}", service, action, record.success);

        ctx.push(keys::REMEDIATION_ACTIONS, &record)?;
        ctx.insert(keys::LAST_REMEDIATION, &record)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockRemediationExecutor;
    use crate::error::CollaboratorError;
    use crate::runbooks::StandardRunbooks;
    use crate::types::{Alert, DiagnosticResult};
    use proptest::prelude::*;

    fn set<'a>(items: &[&'a str]) -> BTreeSet<&'a str> {
        items.iter().copied().collect()
    }

    #[test]
    fn indicators_map_to_sorted_symptoms() {
        let symptoms = symptoms_for(["error_spike", "cpu_critical", "unknown_tag", "fatal_log"]);
        assert_eq!(
            symptoms.into_iter().collect::<Vec<_>>(),
            ["high_cpu", "memory_leak", "regression_after_deploy"]
        );
    }

    #[test]
    fn symptom_match_within_candidates() {
        let registry = StandardRunbooks::new();
        // memory_leak -> restart_service, a first-attempt candidate
        assert_eq!(
            select_action(&set(&["memory_leak"]), 1, &registry),
            ActionType::RestartService
        );
        // high_cpu -> scale_up, not a first-attempt candidate
        assert_eq!(
            select_action(&set(&["high_cpu"]), 1, &registry),
            ActionType::RestartService
        );
        assert_eq!(select_action(&set(&["high_cpu"]), 2, &registry), ActionType::ScaleUp);
    }

    #[test]
    fn overrides_apply_after_symptom_match() {
        let registry = StandardRunbooks::new();
        assert_eq!(
            select_action(&set(&["tls_handshake_failure"]), 1, &registry),
            ActionType::RotateCerts
        );
        assert_eq!(
            select_action(&set(&["config_drift"]), 1, &registry),
            ActionType::RestartService
        );
        assert_eq!(
            select_action(&set(&["config_drift"]), 2, &registry),
            ActionType::RollbackDeploy
        );
        assert_eq!(select_action(&set(&[]), 3, &registry), ActionType::RollbackDeploy);
    }

    proptest! {
        #[test]
        fn selection_stays_in_candidate_set(
            iteration in 1_u32..6,
            picks in proptest::sample::subsequence(
                vec!["high_cpu", "memory_leak", "high_latency", "regression_after_deploy",
                     "connection_pool_exhaustion", "connection_timeout"],
                0..6,
            ),
        ) {
            let symptoms: BTreeSet<&str> = picks.into_iter().collect();
            let action = select_action(&symptoms, iteration, &StandardRunbooks::new());
            prop_assert!(candidate_actions(iteration).contains(&action));
        }
    }

    fn ctx_with_indicators(indicators: &[&str]) -> WorkflowContext {
        let mut diag = DiagnosticResult::new("metrics_checker");
        diag.severity_indicators = indicators.iter().map(ToString::to_string).collect();
        WorkflowContext::new()
            .with(keys::ALERT, &Alert::new("payment-service", "Errors"))
            .unwrap()
            .with(keys::METRICS_DIAGNOSTICS, &diag)
            .unwrap()
            .with(keys::LOOP_ITERATION_KEY, &2_u32)
            .unwrap()
    }

    #[tokio::test]
    async fn records_action_with_parameters() {
        let mut executor = MockRemediationExecutor::new();
        executor
            .expect_execute()
            .withf(|action, service, iteration| {
                *action == ActionType::ScaleUp && service == "payment-service" && *iteration == 2
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(ExecutionOutcome {
                    success: true,
                    output: "scaled".into(),
                })
            });

        let agent = RemediationAgent::new(
            Arc::new(executor),
            Arc::new(StandardRunbooks::new()),
            Duration::from_secs(5),
        );
        let out = agent.run(ctx_with_indicators(&["cpu_critical"])).await.unwrap();

        let actions: Vec<RemediationAction> = out.require(keys::REMEDIATION_ACTIONS).unwrap();
        assert_eq!(actions.len(), 1);
        let last: RemediationAction = out.require(keys::LAST_REMEDIATION).unwrap();
        assert_eq!(last, actions[0]);
        assert_eq!(last.runbook_id, "RB-002");
        assert_eq!(
            last.description,
            "Execute Horizontal Scale-Up for payment-service (attempt 2)"
        );
        assert_eq!(last.parameters["target_replicas"], Value::from(6));
        assert_eq!(last.parameters["namespace"], Value::from("production"));
    }

    #[tokio::test]
    async fn executor_error_is_a_failed_action() {
        let mut executor = MockRemediationExecutor::new();
        executor
            .expect_execute()
            .returning(|_, _, _| Err(CollaboratorError::Failed("kubectl exited with 1".into())));

        let agent = RemediationAgent::new(
            Arc::new(executor),
            Arc::new(StandardRunbooks::new()),
            Duration::from_secs(5),
        );
        let out = agent.run(ctx_with_indicators(&[])).await.unwrap();
        let last: RemediationAction = out.require(keys::LAST_REMEDIATION).unwrap();
        assert!(!last.success);
        assert!(last.executed);
        assert_eq!(last.output, "kubectl exited with 1");
    }
}
