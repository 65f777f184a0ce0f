//! Bounded loop combinator
//!
//! Repeats a fixed sub-sequence until the completion flag is set or the
//! iteration cap is reached. Counter and flags live in the context so the
//! caller can inspect them after return.

use crate::agent::{Agent, SharedAgent};
use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use crate::sequential::Sequential;
use serde_json::Value;

/// Default key holding the 1-based iteration counter
pub const LOOP_ITERATION_KEY: &str = "loop_iteration";
/// Default key for the completion flag
pub const LOOP_COMPLETE_KEY: &str = "loop_complete";
/// Default key for the exhaustion flag
pub const LOOP_EXHAUSTED_KEY: &str = "loop_exhausted";

/// Context keys used by a [`Loop`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopKeys {
    /// Iteration counter
    pub iteration: String,
    /// Completion flag set by a sub-agent
    pub complete: String,
    /// Exhaustion flag set by the loop
    pub exhausted: String,
}

impl Default for LoopKeys {
    fn default() -> Self {
        Self {
            iteration: LOOP_ITERATION_KEY.to_string(),
            complete: LOOP_COMPLETE_KEY.to_string(),
            exhausted: LOOP_EXHAUSTED_KEY.to_string(),
        }
    }
}

/// Bounded retry loop over a sub-sequence
#[derive(Debug, Clone)]
pub struct Loop {
    name: String,
    body: Sequential,
    max_iterations: u32,
    keys: LoopKeys,
}

impl Loop {
    /// Create a loop; `max_iterations` must be at least 1
    pub fn new(
        name: impl Into<String>,
        agents: Vec<SharedAgent>,
        max_iterations: u32,
    ) -> Result<Self, WorkflowError> {
        let name = name.into();
        if max_iterations == 0 {
            return Err(WorkflowError::composition(
                name,
                "max_iterations must be at least 1",
            ));
        }
        let body = Sequential::new(format!("{name}_body"), agents)
            .map_err(|_| WorkflowError::composition(name.clone(), "loop has no agents"))?;
        Ok(Self {
            name,
            body,
            max_iterations,
            keys: LoopKeys::default(),
        })
    }

    /// Use custom context keys
    #[inline]
    #[must_use]
    pub fn with_keys(mut self, keys: LoopKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Iteration cap
    #[inline]
    #[must_use]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Context keys in use
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &LoopKeys {
        &self.keys
    }
}

#[async_trait::async_trait]
impl Agent for Loop {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        ctx.set_default(&self.keys.iteration, Value::from(0_u32));
        ctx.set_default(&self.keys.complete, Value::Bool(false));

        let mut completed = false;
        for iteration in 1..=self.max_iterations {
            ctx.insert(self.keys.iteration.as_str(), &iteration)?;
            tracing::debug!("{}: iteration {}/{}", self.name, iteration, self.max_iterations);

            ctx = self.body.run(ctx).await?;

            if ctx.flag(&self.keys.complete) {
                tracing::info!("{}: completed on iteration {}", self.name, iteration);
                completed = true;
                break;
            }
        }

        if !completed {
            tracing::info!(
                "{}: exhausted after {} iterations",
                self.name,
                self.max_iterations
            );
        }
        ctx.insert(self.keys.exhausted.as_str(), &!completed)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::agent_fn;

    fn complete_on(run: u32) -> SharedAgent {
        agent_fn("completer", move |mut ctx| async move {
            let iteration: u32 = ctx.require(LOOP_ITERATION_KEY)?;
            if iteration == run {
                ctx.insert(LOOP_COMPLETE_KEY, &true)?;
            }
            Ok(ctx)
        })
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(Loop::new("l", vec![complete_on(1)], 0).is_err());
        assert!(Loop::new("l", vec![], 3).is_err());
    }

    #[tokio::test]
    async fn exits_early_on_completion() {
        let lp = Loop::new("l", vec![complete_on(2)], 3).unwrap();
        let out = lp.run(WorkflowContext::new()).await.unwrap();

        assert_eq!(out.require::<u32>(LOOP_ITERATION_KEY).unwrap(), 2);
        assert!(out.flag(LOOP_COMPLETE_KEY));
        assert!(!out.flag(LOOP_EXHAUSTED_KEY));
    }

    #[tokio::test]
    async fn custom_keys() {
        let keys = LoopKeys {
            iteration: "attempt".into(),
            complete: "fixed".into(),
            exhausted: "gave_up".into(),
        };
        let noop = agent_fn("noop", |ctx| async move { Ok(ctx) });
        let lp = Loop::new("l", vec![noop], 2).unwrap().with_keys(keys);

        let out = lp.run(WorkflowContext::new()).await.unwrap();
        assert_eq!(out.require::<u32>("attempt").unwrap(), 2);
        assert!(out.flag("gave_up"));
        assert!(!out.contains_key(LOOP_ITERATION_KEY));
    }

    #[tokio::test]
    async fn failure_propagates() {
        let failing = agent_fn("fails", |_ctx: WorkflowContext| async move {
            Err(WorkflowError::agent("fails", "executor unreachable"))
        });
        let lp = Loop::new("l", vec![failing], 3).unwrap();
        assert!(lp.run(WorkflowContext::new()).await.is_err());
    }
}
