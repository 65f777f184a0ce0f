//! Workflow composition engine
//!
//! Lets independent units of work be combined and nested:
//!
//! - [`WorkflowContext`]: persistent key/value state threaded through a run
//! - [`Agent`]: `run(context) -> context` capability
//! - [`Sequential`]: output of one agent feeds the next
//! - [`Parallel`]: concurrent fan-out with per-branch failure isolation
//! - [`Loop`]: bounded repetition until a completion flag is set
//!
//! # Example
//!
//! ```rust,ignore
//! use incident_workflow::{agent_fn, Agent, Parallel, Sequential, WorkflowContext};
//!
//! let enrich = agent_fn("enrich", |mut ctx| async move {
//!     ctx.insert("owner_team", "payments")?;
//!     Ok(ctx)
//! });
//! let pipeline = Sequential::new("triage", vec![enrich])?;
//! let out = pipeline.run(WorkflowContext::new()).await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod agent;
mod context;
mod error;
mod looping;
mod parallel;
mod sequential;

pub use agent::{agent_fn, Agent, FnAgent, SharedAgent};
pub use context::{WorkflowContext, ERRORS_KEY};
pub use error::{ContextError, WorkflowError};
pub use looping::{Loop, LoopKeys, LOOP_COMPLETE_KEY, LOOP_EXHAUSTED_KEY, LOOP_ITERATION_KEY};
pub use parallel::Parallel;
pub use sequential::Sequential;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
