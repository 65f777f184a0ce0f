//! Error types for the incident pipeline
//!
//! - [`CollaboratorError`]: failures reported by infrastructure collaborators
//! - [`CoreError`]: pipeline, session and configuration failures

use crate::types::{EscalationLevel, IncidentState};
use incident_workflow::{ContextError, WorkflowError};

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Backend could not be reached
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        /// Collaborator name
        collaborator: String,
        /// Cause
        reason: String,
    },

    /// Requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Call exceeded its deadline
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline in seconds
        secs: u64,
    },

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

impl CollaboratorError {
    /// Create unavailable error
    #[inline]
    pub fn unavailable(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }

    /// Attribute this failure to an agent
    #[must_use]
    pub fn in_agent(self, agent: &str) -> WorkflowError {
        WorkflowError::agent(agent, self.to_string())
    }
}

/// Main error type for the incident pipeline
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Workflow composition or agent failure
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Context read/write failure outside an agent
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// Collaborator failure outside an agent
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown session
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Operation not allowed in the session's current state
    #[error("cannot {action} incident in state '{state}'")]
    InvalidTransition {
        /// Rejected operation
        action: &'static str,
        /// State at the time of the request
        state: IncidentState,
    },

    /// Requested level is below the current one
    #[error("cannot lower escalation from {current} to {requested}")]
    EscalationDowngrade {
        /// Current level
        current: EscalationLevel,
        /// Requested level
        requested: EscalationLevel,
    },

    /// Unparseable escalation level
    #[error("invalid escalation level: {0} (valid: L1_AUTO, L2_ONCALL, L3_SENIOR, L4_MANAGEMENT)")]
    InvalidLevel(String),

    /// Run was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Create configuration error
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the failure may succeed on a later attempt
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Collaborator(
                CollaboratorError::Unavailable { .. } | CollaboratorError::Timeout { .. }
            ) | Self::Workflow(WorkflowError::AgentFailed { .. })
        )
    }

    /// Check if the run was cancelled
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Workflow(WorkflowError::Cancelled))
    }

    /// Message suitable for an `error` event
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Workflow(err) => err.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_error_names_agent() {
        let err = CollaboratorError::unavailable("log-index", "connection refused").in_agent("log_analyzer");
        assert!(matches!(
            err,
            WorkflowError::AgentFailed { ref agent, ref message }
                if agent == "log_analyzer" && message == "log-index unavailable: connection refused"
        ));
    }

    #[test]
    fn retryable_and_cancelled() {
        let timeout = CoreError::from(CollaboratorError::Timeout {
            operation: "health check".into(),
            secs: 5,
        });
        assert!(timeout.is_retryable());
        assert!(!CoreError::config("bad").is_retryable());
        assert!(CoreError::Cancelled.is_cancelled());
        assert!(CoreError::from(WorkflowError::Cancelled).is_cancelled());
    }

    #[test]
    fn downgrade_message() {
        let err = CoreError::EscalationDowngrade {
            current: EscalationLevel::L3Senior,
            requested: EscalationLevel::L2Oncall,
        };
        assert_eq!(err.to_string(), "cannot lower escalation from L3_SENIOR to L2_ONCALL");
    }
}
