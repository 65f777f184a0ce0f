//! Incident pipeline orchestrator
//!
//! Drives one alert end to end:
//!
//! 1. Sequential triage (enrich, classify, assign responder)
//! 2. Parallel diagnostics (logs, metrics, config)
//! 3. Escalation loop (remediate, verify) with live per-attempt events
//! 4. Resolution report, or escalation and human takeover
//!
//! Every phase is raced against the run's cancellation token. Whatever the
//! outcome, the session's event stream is closed before `run` returns.

use crate::collaborators::Collaborators;
use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::keys;
use crate::report::{self, truncate_chars};
use crate::types::{
    Alert, DiagnosticResult, EscalationLevel, HealthReport, IncidentContext, RemediationAction,
    ResponderAssignment, SessionId, Severity, TimelineEntry,
};
use crate::workflows;
use incident_events::{EventBus, EventType};
use incident_workflow::{Agent, ContextError, SharedAgent, WorkflowContext, WorkflowError};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Characters of executor output carried by `remediation_attempted` events
const EVENT_OUTPUT_LIMIT: usize = 500;
/// Characters of triage reasoning quoted in the `triaged` message
const REASONING_PREVIEW: usize = 200;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Verification passed within the attempt budget
    Resolved,
    /// Attempts exhausted; a human owns the incident now
    HumanTakeover,
    /// A phase failed; carries the user-facing message
    Failed(String),
    /// The cancellation token fired before the run finished
    Cancelled,
}

impl PipelineOutcome {
    /// Metric label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::HumanTakeover => "human_takeover",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome plus the terminal context
///
/// The context carries every result under the names in [`keys`].
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// How the run ended
    pub outcome: PipelineOutcome,
    /// Context as of the last completed phase
    pub context: WorkflowContext,
}

/// Why a run stopped early
enum Halt {
    Cancelled,
    Failed(CoreError),
}

impl From<WorkflowError> for Halt {
    fn from(err: WorkflowError) -> Self {
        Self::Failed(err.into())
    }
}

impl From<ContextError> for Halt {
    fn from(err: ContextError) -> Self {
        Self::Failed(err.into())
    }
}

/// Per-run handles: event sink and cancellation
struct RunScope<'a> {
    bus: &'a EventBus,
    session: String,
    cancel: &'a CancellationToken,
}

impl RunScope<'_> {
    fn emit(&self, kind: EventType, payload: Value, message: impl Into<String>) {
        self.bus.emit(&self.session, kind, payload, message);
    }

    /// Race a phase against cancellation; cancellation wins ties
    async fn guard<T>(
        &self,
        phase: impl Future<Output = Result<T, WorkflowError>>,
    ) -> Result<T, Halt> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Halt::Cancelled),
            result = phase => result.map_err(Halt::from),
        }
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        Ok(())
    }

    fn narrate(&self, inner: SharedAgent, step: LoopStep, service: &str) -> SharedAgent {
        Arc::new(Narrated {
            inner,
            step,
            bus: self.bus.clone(),
            session: self.session.clone(),
            service: service.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum LoopStep {
    Remediate,
    Verify,
}

/// Emits loop progress around a remediator or verifier as each attempt runs
struct Narrated {
    inner: SharedAgent,
    step: LoopStep,
    bus: EventBus,
    session: String,
    service: String,
}

#[async_trait::async_trait]
impl Agent for Narrated {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        if let LoopStep::Verify = self.step {
            self.bus.emit(
                &self.session,
                EventType::Verifying,
                json!({ "service": self.service }),
                "Verifying service health...",
            );
        }

        let out = self.inner.run(ctx).await?;

        match self.step {
            LoopStep::Remediate => {
                if let Some(action) = out.get::<RemediationAction>(keys::LAST_REMEDIATION)? {
                    let status = if action.success { "success" } else { "failed" };
                    self.bus.emit(
                        &self.session,
                        EventType::RemediationAttempted,
                        json!({
                            "action_type": action.action_type,
                            "success": action.success,
                            "output": truncate_chars(&action.output, EVENT_OUTPUT_LIMIT),
                        }),
                        format!("Remediation: {} - {status}", action.action_type),
                    );
                }
            }
            LoopStep::Verify => {
                if let Some(report) = out.get::<HealthReport>(keys::VERIFICATION_RESULT)? {
                    let payload =
                        serde_json::to_value(&report).map_err(|source| ContextError::Encode {
                            key: keys::VERIFICATION_RESULT.to_string(),
                            source,
                        })?;
                    self.bus.emit(
                        &self.session,
                        EventType::VerificationResult,
                        payload,
                        format!("Verification: {}", report.verdict),
                    );
                }
            }
        }
        Ok(out)
    }
}

fn mark(
    ctx: &mut WorkflowContext,
    event: &str,
    description: impl Into<String>,
) -> Result<(), ContextError> {
    ctx.push(keys::TIMELINE, &TimelineEntry::now(event, description))
}

/// Runs alerts through triage, diagnostics and the escalation loop
#[derive(Debug, Clone)]
pub struct IncidentPipeline {
    config: OrchestratorConfig,
    collaborators: Collaborators,
    bus: EventBus,
}

impl IncidentPipeline {
    /// Create a pipeline publishing to `bus`
    #[must_use]
    pub fn new(config: OrchestratorConfig, collaborators: Collaborators, bus: EventBus) -> Self {
        Self {
            config,
            collaborators,
            bus,
        }
    }

    /// Event bus runs publish to
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Process one alert under `session_id`
    ///
    /// Never returns an error: failures become [`PipelineOutcome::Failed`] after an
    /// `error` event, cancellation becomes [`PipelineOutcome::Cancelled`].
    pub async fn run(
        &self,
        alert: Alert,
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        let started = Instant::now();
        let scope = RunScope {
            bus: &self.bus,
            session: session_id.to_string(),
            cancel,
        };
        tracing::info!(
            "{}: pipeline started for alert {} on {}",
            scope.session,
            alert.id,
            alert.service
        );

        let mut ctx = WorkflowContext::new();
        let outcome = match self.drive(&scope, &alert, &mut ctx).await {
            Ok(outcome) => outcome,
            Err(Halt::Cancelled) => {
                tracing::info!("{}: pipeline cancelled", scope.session);
                PipelineOutcome::Cancelled
            }
            Err(Halt::Failed(err)) => {
                let message = err.user_message();
                tracing::error!("{}: pipeline failed: {}", scope.session, message);
                if let Err(e) = mark(&mut ctx, "error", message.as_str()) {
                    tracing::warn!("{}: timeline not updated: {}", scope.session, e);
                }
                ctx.insert_value(keys::ERROR, Value::String(message.clone()));
                scope.emit(
                    EventType::Error,
                    json!({ "error": message }),
                    format!("Pipeline error: {message}"),
                );
                PipelineOutcome::Failed(message)
            }
        };

        self.bus.close(&scope.session);
        metrics::counter!("incident_pipeline_outcomes_total", "outcome" => outcome.as_str())
            .increment(1);
        metrics::histogram!("incident_pipeline_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            "{}: pipeline finished ({}) in {:?}",
            scope.session,
            outcome.as_str(),
            started.elapsed()
        );
        PipelineRun {
            outcome,
            context: ctx,
        }
    }

    async fn drive(
        &self,
        scope: &RunScope<'_>,
        alert: &Alert,
        ctx: &mut WorkflowContext,
    ) -> Result<PipelineOutcome, Halt> {
        let service = alert.service.as_str();
        ctx.insert(keys::ALERT, alert)?;
        ctx.insert(keys::SESSION_ID, &scope.session)?;
        ctx.insert(keys::TIMELINE, &Vec::<TimelineEntry>::new())?;

        scope.emit(
            EventType::Received,
            json!({ "alert_id": alert.id, "service": service, "title": alert.title }),
            format!("Alert received: {}", alert.title),
        );
        mark(ctx, "alert_received", format!("Alert {} received from {}", alert.id, alert.source))?;

        // Triage
        scope.emit(
            EventType::Enriching,
            json!({ "service": service }),
            format!("Enriching context for {service}..."),
        );
        mark(ctx, "enrichment_started", "Context enrichment started")?;
        let triage = workflows::sequential_triage(&self.collaborators)?;
        *ctx = scope.guard(triage.run(ctx.clone())).await?;

        let owner_team: String = ctx.get_or(keys::OWNER_TEAM, "unknown".to_string())?;
        let recent_deploys = ctx
            .get::<IncidentContext>(keys::INCIDENT_CONTEXT)?
            .map_or(0, |incident| incident.recent_deploys.len());
        scope.emit(
            EventType::Enriched,
            json!({ "owner_team": owner_team, "recent_deploys": recent_deploys }),
            format!("Context enriched. Owner team: {owner_team}"),
        );
        mark(ctx, "enrichment_complete", "Context enrichment complete")?;

        scope.emit(
            EventType::Triaging,
            json!({ "service": service }),
            "Classifying incident severity...",
        );
        let severity: Severity = ctx.get_or(keys::SEVERITY, Severity::P4)?;
        let reasoning: String = ctx.get_or(keys::TRIAGE_REASONING, String::new())?;
        let responder: Option<ResponderAssignment> = ctx.get(keys::ASSIGNED_RESPONDER)?;
        let level: EscalationLevel = ctx.get_or(keys::ESCALATION_LEVEL, EscalationLevel::L1Auto)?;
        scope.emit(
            EventType::Triaged,
            json!({
                "severity": severity,
                "reasoning": reasoning,
                "assigned_responder": responder,
                "escalation_level": level,
            }),
            format!(
                "Severity classified as {severity}. {}",
                truncate_chars(&reasoning, REASONING_PREVIEW)
            ),
        );
        let responder_name = responder.as_ref().map_or("N/A", |r| r.name.as_str());
        mark(
            ctx,
            "triage_complete",
            format!("Severity: {severity}, Responder: {responder_name}"),
        )?;

        // Diagnostics
        scope.emit(
            EventType::DiagnosingLogs,
            json!({ "service": service }),
            "Analyzing application logs...",
        );
        scope.emit(
            EventType::DiagnosingMetrics,
            json!({ "service": service }),
            "Checking infrastructure metrics...",
        );
        scope.emit(
            EventType::DiagnosingConfig,
            json!({ "service": service }),
            "Auditing service configuration...",
        );
        mark(ctx, "diagnostics_started", "Parallel diagnostics started")?;
        let diagnostics = workflows::parallel_diagnostics(&self.collaborators, &self.config)?;
        *ctx = scope.guard(diagnostics.run(ctx.clone())).await?;

        let mut summary = serde_json::Map::new();
        let mut labels = Vec::new();
        let mut total_anomalies = 0;
        for (key, label) in keys::DIAGNOSTIC_KEYS {
            if let Some(result) = ctx.get::<DiagnosticResult>(key)? {
                total_anomalies += result.anomalies.len();
                labels.push(label);
                summary.insert(
                    label.to_string(),
                    json!({
                        "findings": result.findings.len(),
                        "anomalies": result.anomalies.len(),
                        "severity_indicators": result.severity_indicators,
                    }),
                );
            }
        }
        let errors = ctx.errors();
        for (agent, message) in &errors {
            tracing::warn!("{}: diagnostic branch {} failed: {}", scope.session, agent, message);
        }
        scope.emit(
            EventType::DiagnosticsComplete,
            json!({ "summary": summary, "errors": errors }),
            format!("Diagnostics complete. Found issues in: {}", labels.join(", ")),
        );
        mark(
            ctx,
            "diagnostics_complete",
            format!("Diagnostics: {total_anomalies} total anomalies"),
        )?;

        // Escalation loop
        let max = self.config.max_escalation_levels;
        scope.emit(
            EventType::Remediating,
            json!({ "service": service, "max_iterations": max }),
            "Starting automated remediation loop...",
        );
        mark(ctx, "remediation_started", "Remediation loop started")?;
        let (remediator, verifier) = workflows::escalation_agents(&self.collaborators, &self.config);
        let escalation = workflows::escalation_loop_with(
            scope.narrate(remediator, LoopStep::Remediate, service),
            scope.narrate(verifier, LoopStep::Verify, service),
            max,
        )?;
        *ctx = scope.guard(escalation.run(ctx.clone())).await?;
        scope.checkpoint()?;

        let actions: Vec<RemediationAction> = ctx.get_or(keys::REMEDIATION_ACTIONS, Vec::new())?;
        let iterations: u32 = ctx.get_or(keys::LOOP_ITERATION_KEY, 0)?;

        if ctx.flag(keys::LOOP_COMPLETE_KEY) {
            let mut report = report::build_report(ctx, &scope.session, true)?;
            mark(ctx, "resolved", report.resolution_summary.as_str())?;
            report.timeline = ctx.get_or(keys::TIMELINE, Vec::new())?;
            ctx.insert(keys::REPORT, &report)?;

            tracing::info!("{}: resolved ({})", scope.session, severity);
            scope.emit(
                EventType::Resolved,
                json!({
                    "severity": severity,
                    "resolution_summary": report.resolution_summary,
                    "total_actions": actions.len(),
                    "iterations": iterations,
                }),
                format!("Incident resolved! {}", report.resolution_summary),
            );
            return Ok(PipelineOutcome::Resolved);
        }

        let level: EscalationLevel =
            ctx.get_or(keys::ESCALATION_LEVEL, EscalationLevel::L4Management)?;
        scope.emit(
            EventType::Escalating,
            json!({ "escalation_level": level, "iterations_exhausted": max }),
            format!("Automated remediation exhausted ({max} attempts). Escalating to {level}."),
        );
        mark(ctx, "escalation", format!("Escalated to {level} after {max} attempts"))?;

        let mut report = report::build_report(ctx, &scope.session, false)?;
        mark(ctx, "human_takeover", "Incident handed to human operator")?;
        report.timeline = ctx.get_or(keys::TIMELINE, Vec::new())?;
        ctx.insert(keys::REPORT, &report)?;

        tracing::warn!(
            "{}: human takeover required ({}, {})",
            scope.session,
            severity,
            level
        );
        scope.emit(
            EventType::HumanTakeover,
            json!({
                "severity": severity,
                "escalation_level": level,
                "assigned_responder": responder,
                "attempts": max,
            }),
            format!("Human takeover required. Severity: {severity}. Escalation level: {level}."),
        );
        Ok(PipelineOutcome::HumanTakeover)
    }
}
