//! In-memory incident session store
//!
//! Each submitted alert gets a session and a background pipeline run. A tracker
//! subscription moves the session through its non-terminal states as events
//! arrive; when the run finishes its results are copied onto the session.
//!
//! Operators can escalate, resolve or take over a session while it runs. A
//! manually set terminal state always wins over the run's own outcome.

use crate::collaborators::Collaborators;
use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::keys;
use crate::pipeline::{IncidentPipeline, PipelineOutcome, PipelineRun};
use crate::types::{
    Alert, DiagnosticResult, EscalationLevel, IncidentContext, IncidentReport, IncidentState,
    RemediationAction, SessionId, Severity,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use incident_events::{Event, EventBus, EventType, Subscription};
use incident_workflow::WorkflowContext;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Full state of one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSession {
    /// Session ID
    pub id: SessionId,
    /// Lifecycle state
    pub state: IncidentState,
    /// Triggering alert
    pub alert: Alert,
    /// Severity (P4 until triaged)
    pub severity: Severity,
    /// Enriched context
    pub context: Option<IncidentContext>,
    /// Diagnostic results in logs, metrics, config order
    pub diagnostics: Vec<DiagnosticResult>,
    /// Remediation history
    pub remediations: Vec<RemediationAction>,
    /// Current escalation tier
    pub escalation_level: EscalationLevel,
    /// Final or partial report
    pub report: Option<IncidentReport>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
    /// Failure message for failed runs
    pub error: Option<String>,
}

impl IncidentSession {
    /// Fresh session in the `received` state
    #[must_use]
    pub fn new(id: SessionId, alert: Alert) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: IncidentState::Received,
            alert,
            severity: Severity::P4,
            context: None,
            diagnostics: Vec::new(),
            remediations: Vec::new(),
            escalation_level: EscalationLevel::L1Auto,
            report: None,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

struct RunHandle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

struct Inner {
    pipeline: IncidentPipeline,
    sessions: DashMap<SessionId, IncidentSession>,
    runs: DashMap<SessionId, RunHandle>,
}

/// Session store driving one pipeline run per submitted alert
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a store over an existing pipeline
    #[must_use]
    pub fn new(pipeline: IncidentPipeline) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                sessions: DashMap::new(),
                runs: DashMap::new(),
            }),
        }
    }

    /// Store over simulated collaborators and a fresh bus sized from `config`
    #[must_use]
    pub fn simulated(config: OrchestratorConfig) -> Self {
        let collaborators = Collaborators::simulated(&config);
        let bus = EventBus::with_capacity(config.event_queue_capacity);
        Self::new(IncidentPipeline::new(config, collaborators, bus))
    }

    /// Event bus sessions publish to
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        self.inner.pipeline.bus()
    }

    /// Create a session and start its pipeline in the background
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, alert: Alert) -> SessionId {
        let id = SessionId::new();
        let session_key = id.to_string();
        tracing::info!("{}: session created for alert {} on {}", id, alert.id, alert.service);

        self.inner.sessions.insert(id, IncidentSession::new(id, alert.clone()));
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.inner.runs.insert(
            id,
            RunHandle {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );
        metrics::counter!("incident_sessions_submitted_total").increment(1);

        // Subscribe before the run starts so the tracker sees every event
        let events = self.bus().subscribe(&session_key);
        tokio::spawn(track(Arc::clone(&self.inner), id, events));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let run = inner.pipeline.run(alert, &id, &cancel).await;
            inner.complete(id, run);
            done_tx.send_replace(true);
        });
        id
    }

    /// Snapshot of a session
    pub fn get(&self, id: &SessionId) -> Result<IncidentSession, CoreError> {
        self.inner
            .sessions
            .get(id)
            .map(|session| session.clone())
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))
    }

    /// Sessions matching the filters, newest first
    #[must_use]
    pub fn list(&self, state: Option<IncidentState>, severity: Option<Severity>) -> Vec<IncidentSession> {
        let mut sessions: Vec<IncidentSession> = self
            .inner
            .sessions
            .iter()
            .filter(|s| state.is_none_or_eq(s.state) && severity.is_none_or_eq(s.severity))
            .map(|s| s.clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        sessions
    }

    /// Number of stored sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Replay and follow a session's events
    pub fn subscribe(&self, id: &SessionId) -> Result<Subscription, CoreError> {
        if !self.inner.sessions.contains_key(id) {
            return Err(CoreError::SessionNotFound(id.to_string()));
        }
        Ok(self.bus().subscribe(&id.to_string()))
    }

    /// Wait for the session's run to finish, then return the session
    pub async fn wait(&self, id: &SessionId) -> Result<IncidentSession, CoreError> {
        let done = self.inner.runs.get(id).map(|run| run.done.clone());
        if let Some(mut done) = done {
            if done.wait_for(|finished| *finished).await.is_err() {
                tracing::debug!("{}: run dropped before reporting completion", id);
            }
        }
        self.get(id)
    }

    /// Manually escalate; defaults to `L3_SENIOR`
    ///
    /// Resolved and failed sessions cannot be escalated, and the level never
    /// goes down. A session already handed to a human keeps that state.
    pub fn escalate(
        &self,
        id: &SessionId,
        level: Option<EscalationLevel>,
        reason: &str,
    ) -> Result<EscalationLevel, CoreError> {
        let target = level.unwrap_or(EscalationLevel::L3Senior);
        {
            let mut session = self
                .inner
                .sessions
                .get_mut(id)
                .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))?;
            if matches!(session.state, IncidentState::Resolved | IncidentState::Failed) {
                return Err(CoreError::InvalidTransition {
                    action: "escalate",
                    state: session.state,
                });
            }
            if target < session.escalation_level {
                return Err(CoreError::EscalationDowngrade {
                    current: session.escalation_level,
                    requested: target,
                });
            }
            session.escalation_level = target;
            if session.state != IncidentState::HumanTakeover {
                session.state = IncidentState::Escalating;
            }
            session.touch();
        }

        tracing::info!("{}: manually escalated to {} ({})", id, target, reason);
        self.bus().emit(
            &id.to_string(),
            EventType::Escalating,
            json!({ "escalation_level": target, "reason": reason }),
            format!("Manually escalated to {target}: {reason}"),
        );
        Ok(target)
    }

    /// Manually resolve and stop the run
    ///
    /// Only resolved sessions are rejected, so an operator can close out a
    /// session after a takeover or failure. Such a session's stream already
    /// ended at its first terminal event: the `resolved` event is recorded in
    /// history but no subscriber or replay will see it.
    pub fn resolve(&self, id: &SessionId, summary: &str) -> Result<(), CoreError> {
        self.finish_manually(id, "resolve", IncidentState::Resolved)?;
        tracing::info!("{}: manually resolved ({})", id, summary);
        self.bus().emit(
            &id.to_string(),
            EventType::Resolved,
            json!({ "resolution_summary": summary }),
            format!("Incident manually resolved: {summary}"),
        );
        self.cancel_run(id);
        Ok(())
    }

    /// Hand the session to a human operator and stop the run
    ///
    /// As with [`resolve`](Self::resolve), a session that already ended only
    /// records the event in history.
    pub fn takeover(&self, id: &SessionId, operator: &str, reason: &str) -> Result<(), CoreError> {
        self.finish_manually(id, "take over", IncidentState::HumanTakeover)?;
        tracing::info!("{}: taken over by {} ({})", id, operator, reason);
        self.bus().emit(
            &id.to_string(),
            EventType::HumanTakeover,
            json!({ "operator": operator, "reason": reason }),
            format!("Human takeover by {operator}: {reason}"),
        );
        self.cancel_run(id);
        Ok(())
    }

    /// Drop terminal sessions idle for longer than the session TTL
    ///
    /// Returns how many were removed. Their event history is cleared as well.
    /// Sessions whose run is still winding down are kept until it finishes.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.inner.pipeline.config().session_ttl();
        let expired: Vec<SessionId> = self
            .inner
            .sessions
            .iter()
            .filter(|s| {
                s.state.is_terminal()
                    && (now - s.updated_at).to_std().is_ok_and(|age| age > ttl)
                    && self.inner.run_finished(&s.id)
            })
            .map(|s| s.id)
            .collect();

        for id in &expired {
            self.inner.sessions.remove(id);
            self.inner.runs.remove(id);
            self.bus().clear(&id.to_string());
        }
        if !expired.is_empty() {
            tracing::info!("purged {} expired sessions", expired.len());
        }
        expired.len()
    }

    /// Cancel every run and wait for them to finish
    pub async fn shutdown(&self) {
        let pending: Vec<(SessionId, watch::Receiver<bool>)> = self
            .inner
            .runs
            .iter()
            .map(|run| {
                run.cancel.cancel();
                (*run.key(), run.done.clone())
            })
            .collect();
        tracing::info!("shutting down ({} runs)", pending.len());
        for (id, mut done) in pending {
            if done.wait_for(|finished| *finished).await.is_err() {
                tracing::debug!("{}: run dropped before reporting completion", id);
            }
        }
    }

    fn finish_manually(
        &self,
        id: &SessionId,
        action: &'static str,
        state: IncidentState,
    ) -> Result<(), CoreError> {
        let mut session = self
            .inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))?;
        if session.state == IncidentState::Resolved {
            return Err(CoreError::InvalidTransition {
                action,
                state: session.state,
            });
        }
        session.state = state;
        session.touch();
        Ok(())
    }

    fn cancel_run(&self, id: &SessionId) {
        if let Some(run) = self.inner.runs.get(id) {
            run.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.inner.sessions.len())
            .field("runs", &self.inner.runs.len())
            .finish()
    }
}

trait OptionFilter<T> {
    fn is_none_or_eq(&self, value: T) -> bool;
}

impl<T: PartialEq> OptionFilter<T> for Option<T> {
    fn is_none_or_eq(&self, value: T) -> bool {
        self.as_ref().map_or(true, |wanted| *wanted == value)
    }
}

/// Decode a context value, logging instead of failing
fn read<T: DeserializeOwned>(ctx: &WorkflowContext, key: &str) -> Option<T> {
    ctx.get(key).unwrap_or_else(|err| {
        tracing::warn!("session result '{}' unreadable: {}", key, err);
        None
    })
}

impl Inner {
    fn run_finished(&self, id: &SessionId) -> bool {
        self.runs.get(id).map_or(true, |run| *run.done.borrow())
    }

    /// Copy a finished run onto its session
    fn complete(&self, id: SessionId, run: PipelineRun) {
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return;
        };
        let ctx = &run.context;

        if let Some(severity) = read(ctx, keys::SEVERITY) {
            session.severity = severity;
        }
        if let Some(context) = read(ctx, keys::INCIDENT_CONTEXT) {
            session.context = Some(context);
        }
        session.diagnostics = keys::DIAGNOSTIC_KEYS
            .iter()
            .filter_map(|(key, _)| read(ctx, key))
            .collect();
        session.remediations = read(ctx, keys::REMEDIATION_ACTIONS).unwrap_or_default();
        if let Some(level) = read::<EscalationLevel>(ctx, keys::ESCALATION_LEVEL) {
            session.escalation_level = session.escalation_level.max(level);
        }
        if let Some(report) = read(ctx, keys::REPORT) {
            session.report = Some(report);
        }

        if session.state.is_terminal() {
            tracing::debug!("{}: keeping manual state {}", id, session.state);
        } else {
            session.state = match &run.outcome {
                PipelineOutcome::Resolved => IncidentState::Resolved,
                PipelineOutcome::HumanTakeover => IncidentState::HumanTakeover,
                PipelineOutcome::Failed(message) => {
                    session.error = Some(message.clone());
                    IncidentState::Failed
                }
                PipelineOutcome::Cancelled => {
                    session.error = Some("run cancelled".to_string());
                    IncidentState::Failed
                }
            };
        }
        session.touch();
        tracing::info!("{}: session settled in state {}", id, session.state);
    }

    /// Apply one pipeline event to a non-terminal session
    fn observe(&self, id: SessionId, event: &Event) {
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return;
        };
        if session.state.is_terminal() || event.is_terminal() {
            return;
        }
        session.state = IncidentState::from_event(event.event_type);
        if event.event_type == EventType::Triaged {
            let field = |name: &str| event.field(name).cloned();
            if let Some(severity) = field("severity").and_then(|v| serde_json::from_value(v).ok()) {
                session.severity = severity;
            }
            if let Some(level) = field("escalation_level").and_then(|v| serde_json::from_value(v).ok()) {
                session.escalation_level = session.escalation_level.max(level);
            }
        }
        session.updated_at = event.timestamp;
    }
}

async fn track(inner: Arc<Inner>, id: SessionId, mut events: Subscription) {
    while let Some(event) = events.recv().await {
        inner.observe(id, &event);
    }
    tracing::debug!("{}: tracker finished", id);
}
