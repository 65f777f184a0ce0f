//! Parallel combinator
//!
//! Fans a context snapshot out to every branch, waits for all of them, then merges
//! in declaration order:
//! - a successful branch contributes every key it wrote, even one rewritten
//!   to the input's value; keys it only read keep the merged value
//! - a failed (or panicked) branch contributes `errors[name] = message`
//!
//! Branch failures never fail the combinator.

use crate::agent::{Agent, SharedAgent};
use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Concurrent fan-out over independent branches
#[derive(Clone)]
pub struct Parallel {
    name: String,
    agents: Vec<SharedAgent>,
}

impl Parallel {
    /// Create a fan-out group
    ///
    /// Rejects an empty list and duplicate branch names, since names key the
    /// `errors` map.
    pub fn new(name: impl Into<String>, agents: Vec<SharedAgent>) -> Result<Self, WorkflowError> {
        let name = name.into();
        if agents.is_empty() {
            return Err(WorkflowError::composition(name, "parallel group has no agents"));
        }
        let mut seen = HashSet::new();
        for agent in &agents {
            if !seen.insert(agent.name().to_string()) {
                return Err(WorkflowError::composition(
                    name,
                    format!("duplicate branch name '{}'", agent.name()),
                ));
            }
        }
        Ok(Self { name, agents })
    }

    /// Branches in declaration (merge) order
    #[inline]
    #[must_use]
    pub fn agents(&self) -> &[SharedAgent] {
        &self.agents
    }
}

impl std::fmt::Debug for Parallel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parallel")
            .field("name", &self.name)
            .field("agents", &self.agents.iter().map(|a| a.name()).collect::<Vec<_>>())
            .finish()
    }
}

type BranchResult = Result<WorkflowContext, String>;

#[async_trait::async_trait]
impl Agent for Parallel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut branches = JoinSet::new();
        for (index, agent) in self.agents.iter().enumerate() {
            let agent = Arc::clone(agent);
            let snapshot = input.fork();
            branches.spawn(async move {
                let outcome = AssertUnwindSafe(agent.run(snapshot)).catch_unwind().await;
                let result: BranchResult = match outcome {
                    Ok(Ok(ctx)) => Ok(ctx),
                    Ok(Err(err)) => Err(err.message()),
                    Err(panic) => Err(panic_message(panic.as_ref())),
                };
                (index, result)
            });
        }

        // Join barrier: collect every branch before merging.
        let mut results: Vec<Option<BranchResult>> = vec![None; self.agents.len()];
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(err) => tracing::error!("{}: branch task aborted: {}", self.name, err),
            }
        }

        let mut merged = input.clone();
        let mut failures = Vec::new();
        for (agent, result) in self.agents.iter().zip(results) {
            match result {
                Some(Ok(output)) => merged.absorb(&output)?,
                Some(Err(message)) => {
                    tracing::warn!("{}: branch {} failed: {}", self.name, agent.name(), message);
                    failures.push((agent.name(), message));
                }
                None => failures.push((agent.name(), "branch aborted".to_string())),
            }
        }
        for (agent, message) in failures {
            merged.record_error(agent, message)?;
        }

        Ok(merged)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        format!("agent panicked: {text}")
    } else if let Some(text) = panic.downcast_ref::<String>() {
        format!("agent panicked: {text}")
    } else {
        "agent panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::agent_fn;
    use std::time::{Duration, Instant};

    fn sleeper(name: &'static str, millis: u64) -> SharedAgent {
        agent_fn(name, move |mut ctx| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            ctx.insert(name, &true)?;
            Ok(ctx)
        })
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = Parallel::new("p", vec![sleeper("a", 0), sleeper("a", 0)]).unwrap_err();
        assert!(err.to_string().contains("duplicate branch name"));
    }

    #[tokio::test]
    async fn branches_run_concurrently() {
        let group = Parallel::new(
            "p",
            vec![sleeper("a", 200), sleeper("b", 200), sleeper("c", 200)],
        )
        .unwrap();

        let started = Instant::now();
        let out = group.run(WorkflowContext::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(550));
        assert!(out.flag("a") && out.flag("b") && out.flag("c"));
    }

    #[tokio::test]
    async fn panicking_branch_is_recorded() {
        let panics = agent_fn("panics", |ctx: WorkflowContext| async move {
            if ctx.is_empty() {
                panic!("index out of range");
            }
            Ok(ctx)
        });
        let group = Parallel::new("p", vec![sleeper("ok", 0), panics]).unwrap();

        let out = group.run(WorkflowContext::new()).await.unwrap();
        assert!(out.flag("ok"));
        assert!(out.errors()["panics"].contains("index out of range"));
    }

    #[tokio::test]
    async fn later_branch_wins_on_conflict() {
        let first = agent_fn("first", |mut ctx| async move {
            ctx.insert("owner", "first")?;
            Ok(ctx)
        });
        let second = agent_fn("second", |mut ctx| async move {
            ctx.insert("owner", "second")?;
            Ok(ctx)
        });
        let group = Parallel::new("p", vec![first, second]).unwrap();

        let out = group.run(WorkflowContext::new()).await.unwrap();
        assert_eq!(out.require::<String>("owner").unwrap(), "second");
    }

    #[tokio::test]
    async fn later_rewrite_of_input_value_wins() {
        let base = WorkflowContext::new().with("status", "pending").unwrap();
        let finisher = agent_fn("finisher", |mut ctx| async move {
            ctx.insert("status", "done")?;
            Ok(ctx)
        });
        let resetter = agent_fn("resetter", |mut ctx| async move {
            ctx.insert("status", "pending")?;
            Ok(ctx)
        });
        let group = Parallel::new("p", vec![finisher, resetter]).unwrap();

        let out = group.run(base).await.unwrap();
        assert_eq!(out.require::<String>("status").unwrap(), "pending");
    }

    #[tokio::test]
    async fn unchanged_snapshot_keys_do_not_clobber() {
        let base = WorkflowContext::new().with("status", "pending").unwrap();
        let writer = agent_fn("writer", |mut ctx| async move {
            ctx.insert("status", "done")?;
            Ok(ctx)
        });
        let reader = agent_fn("reader", |mut ctx| async move {
            ctx.insert("seen", &true)?;
            Ok(ctx)
        });
        let group = Parallel::new("p", vec![writer, reader]).unwrap();

        let out = group.run(base).await.unwrap();
        assert_eq!(out.require::<String>("status").unwrap(), "done");
        assert!(out.flag("seen"));
    }
}
