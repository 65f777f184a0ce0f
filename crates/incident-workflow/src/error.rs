//! Error types for workflow composition
//!
//! Two layers:
//! - [`ContextError`]: typed access to a [`WorkflowContext`](crate::WorkflowContext) failed
//! - [`WorkflowError`]: an agent or combinator failed

/// Typed context access errors
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Required key is absent
    #[error("missing context key: {0}")]
    MissingKey(String),

    /// Value could not be serialized into the context
    #[error("cannot encode context key '{key}': {source}")]
    Encode {
        /// Key being written
        key: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Stored value does not match the requested type
    #[error("cannot decode context key '{key}': {source}")]
    Decode {
        /// Key being read
        key: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// A key that must hold a list or map holds something else
    #[error("context key '{key}' must hold {expected}")]
    Malformed {
        /// Offending key
        key: String,
        /// Expected JSON shape
        expected: &'static str,
    },
}

/// Workflow execution errors
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A leaf agent reported a failure
    #[error("agent '{agent}' failed: {message}")]
    AgentFailed {
        /// Failing agent name
        agent: String,
        /// Human-readable cause
        message: String,
    },

    /// Context read/write failed
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// Combinator was built from a malformed agent list
    #[error("invalid composition '{name}': {reason}")]
    InvalidComposition {
        /// Combinator name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Run was cancelled before completion
    #[error("workflow cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Create an agent failure
    #[inline]
    pub fn agent(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentFailed {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Create a composition error
    #[inline]
    pub fn composition(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidComposition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Message recorded in a Parallel `errors` map for this failure
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::AgentFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Check if error is a programming/contract violation rather than a runtime failure
    #[inline]
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidComposition { .. } | Self::Context(ContextError::Malformed { .. })
        )
    }
}
