//! Event model
//!
//! Events are immutable once emitted and ordered by `sequence` within a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

/// Workflow progress event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Alert accepted
    Received,
    /// Context enrichment started
    Enriching,
    /// Context enrichment finished
    Enriched,
    /// Severity classification started
    Triaging,
    /// Severity and responder assigned
    Triaged,
    /// Log analysis started
    DiagnosingLogs,
    /// Metrics check started
    DiagnosingMetrics,
    /// Config audit started
    DiagnosingConfig,
    /// All diagnostic branches joined
    DiagnosticsComplete,
    /// Escalation loop started
    Remediating,
    /// One remediation action executed
    RemediationAttempted,
    /// Health verification started
    Verifying,
    /// Health verification finished
    VerificationResult,
    /// Incident escalated to a higher tier
    Escalating,
    /// Incident resolved (terminal)
    Resolved,
    /// Incident handed to a human (terminal)
    HumanTakeover,
    /// Pipeline failed (terminal)
    Error,
}

impl EventType {
    /// Every event type in pipeline order
    pub const ALL: [EventType; 17] = [
        Self::Received,
        Self::Enriching,
        Self::Enriched,
        Self::Triaging,
        Self::Triaged,
        Self::DiagnosingLogs,
        Self::DiagnosingMetrics,
        Self::DiagnosingConfig,
        Self::DiagnosticsComplete,
        Self::Remediating,
        Self::RemediationAttempted,
        Self::Verifying,
        Self::VerificationResult,
        Self::Escalating,
        Self::Resolved,
        Self::HumanTakeover,
        Self::Error,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Enriching => "enriching",
            Self::Enriched => "enriched",
            Self::Triaging => "triaging",
            Self::Triaged => "triaged",
            Self::DiagnosingLogs => "diagnosing_logs",
            Self::DiagnosingMetrics => "diagnosing_metrics",
            Self::DiagnosingConfig => "diagnosing_config",
            Self::DiagnosticsComplete => "diagnostics_complete",
            Self::Remediating => "remediating",
            Self::RemediationAttempted => "remediation_attempted",
            Self::Verifying => "verifying",
            Self::VerificationResult => "verification_result",
            Self::Escalating => "escalating",
            Self::Resolved => "resolved",
            Self::HumanTakeover => "human_takeover",
            Self::Error => "error",
        }
    }

    /// Whether this type ends every subscriber's stream
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::HumanTakeover | Self::Error)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown event type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct ParseEventTypeError(pub String);

impl FromStr for EventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEventTypeError(s.to_string()))
    }
}

/// Immutable workflow event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,
    /// 1-based position in the session's history
    pub sequence: u64,
    /// Event kind
    pub event_type: EventType,
    /// Owning session
    pub session_id: String,
    /// Structured payload (always a JSON object)
    pub payload: Value,
    /// Human-readable message
    pub message: String,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Build an event stamped with a fresh ID and the current time
    ///
    /// Non-object payloads are normalized: `null` becomes `{}`, anything else
    /// is wrapped as `{"value": ...}`.
    #[must_use]
    pub fn new(
        sequence: u64,
        event_type: EventType,
        session_id: impl Into<String>,
        payload: Value,
        message: impl Into<String>,
    ) -> Self {
        let payload = match payload {
            Value::Object(_) => payload,
            Value::Null => Value::Object(Map::new()),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Value::Object(map)
            }
        };
        Self {
            id: Uuid::new_v4(),
            sequence,
            event_type,
            session_id: session_id.into(),
            payload,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether this event ends the stream
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }

    /// Payload field lookup
    #[inline]
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}
