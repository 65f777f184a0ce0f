//! Agent abstraction
//!
//! An [`Agent`] is the unit of work: it takes ownership of a context snapshot and
//! returns the updated context. The caller keeps its own snapshot, so agents may
//! mutate the value they receive freely.

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use std::future::Future;
use std::sync::Arc;

/// Unit of work composed by the combinators
///
/// Implementations must be stateless across invocations: everything a later step
/// needs has to be written into the returned context.
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    /// Agent name (unique within a Parallel group)
    fn name(&self) -> &str;

    /// Run against a context snapshot
    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError>;
}

/// Shared agent handle held by combinators
pub type SharedAgent = Arc<dyn Agent>;

/// Agent backed by an async closure
pub struct FnAgent<F> {
    name: String,
    func: F,
}

impl<F> std::fmt::Debug for FnAgent<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAgent").field("name", &self.name).finish()
    }
}

#[async_trait::async_trait]
impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkflowContext, WorkflowError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        (self.func)(ctx).await
    }
}

/// Wrap an async closure as a shared agent
///
/// ```rust,ignore
/// let tag = agent_fn("tagger", |mut ctx| async move {
///     ctx.insert("tagged", &true)?;
///     Ok(ctx)
/// });
/// ```
pub fn agent_fn<F, Fut>(name: impl Into<String>, func: F) -> SharedAgent
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkflowContext, WorkflowError>> + Send + 'static,
{
    Arc::new(FnAgent {
        name: name.into(),
        func,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closure_agent_runs() {
        let agent = agent_fn("setter", |mut ctx| async move {
            ctx.insert("value", &42)?;
            Ok(ctx)
        });

        assert_eq!(agent.name(), "setter");
        let out = agent.run(WorkflowContext::new()).await.unwrap();
        assert_eq!(out.require::<i32>("value").unwrap(), 42);
    }

    #[tokio::test]
    async fn closure_agent_propagates_failure() {
        let agent = agent_fn("broken", |_ctx| async move {
            Err(WorkflowError::agent("broken", "no data"))
        });

        let err = agent.run(WorkflowContext::new()).await.unwrap_err();
        assert_eq!(err.message(), "no data");
    }
}
