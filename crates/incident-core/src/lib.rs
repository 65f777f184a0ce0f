//! Incident response pipeline
//!
//! Builds the incident workflow out of `incident-workflow` combinators and
//! narrates it on an `incident-events` bus:
//!
//! - [`workflows`]: triage sequence, parallel diagnostics, escalation loop
//! - [`pipeline`]: [`IncidentPipeline`] driving one alert to a terminal event
//! - [`session`]: [`SessionManager`] storing sessions and manual overrides
//! - [`collaborators`]: infrastructure seams; [`simulated`] stand-ins
//! - [`config`]: [`OrchestratorConfig`] from TOML and `INCIDENT_*` variables
//!
//! # Example
//!
//! ```rust,ignore
//! use incident_core::prelude::*;
//!
//! let sessions = SessionManager::simulated(OrchestratorConfig::default());
//! let id = sessions.submit(Alert::new("payment-service", "High error rate"));
//! let mut events = sessions.subscribe(&id)?;
//! while let Some(event) = events.recv().await {
//!     println!("{} {}", event.event_type, event.message);
//! }
//! let session = sessions.wait(&id).await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod agents;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod report;
pub mod runbooks;
pub mod session;
pub mod simulated;
pub mod types;
pub mod workflows;

// Re-exports for convenience
pub use collaborators::Collaborators;
pub use config::{OrchestratorConfig, SimulationConfig};
pub use error::{CollaboratorError, CoreError};
pub use pipeline::{IncidentPipeline, PipelineOutcome, PipelineRun};
pub use runbooks::{RiskLevel, Runbook, StandardRunbooks};
pub use session::{IncidentSession, SessionManager};
pub use types::{
    ActionType, Alert, EscalationLevel, IncidentReport, IncidentState, RemediationAction,
    SessionId, Severity,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running incidents
    pub use crate::{
        Alert, Collaborators, CoreError, EscalationLevel, IncidentPipeline, IncidentReport,
        IncidentSession, IncidentState, OrchestratorConfig, PipelineOutcome, SessionId,
        SessionManager, Severity,
    };
    pub use incident_events::{Event, EventBus, EventType};
    pub use tokio_util::sync::CancellationToken;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
