//! Sequential combinator
//!
//! Runs agents one at a time; the output of agent *i* is the input of agent *i+1*.
//! The first failure aborts the chain and is returned unchanged.

use crate::agent::{Agent, SharedAgent};
use crate::context::WorkflowContext;
use crate::error::WorkflowError;

/// Ordered chain of agents
#[derive(Clone)]
pub struct Sequential {
    name: String,
    agents: Vec<SharedAgent>,
}

impl Sequential {
    /// Create a chain; rejects an empty agent list
    pub fn new(name: impl Into<String>, agents: Vec<SharedAgent>) -> Result<Self, WorkflowError> {
        let name = name.into();
        if agents.is_empty() {
            return Err(WorkflowError::composition(name, "sequence has no agents"));
        }
        Ok(Self { name, agents })
    }

    /// Agents in execution order
    #[inline]
    #[must_use]
    pub fn agents(&self) -> &[SharedAgent] {
        &self.agents
    }
}

impl std::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequential")
            .field("name", &self.name)
            .field("agents", &self.agents.iter().map(|a| a.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait::async_trait]
impl Agent for Sequential {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        for agent in &self.agents {
            tracing::debug!("{}: running {}", self.name, agent.name());
            ctx = agent.run(ctx).await?;
        }
        Ok(ctx)
    }
}
