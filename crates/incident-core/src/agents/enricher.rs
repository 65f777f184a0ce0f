//! Context enrichment

use super::alert_of;
use crate::collaborators::ServiceCatalog;
use crate::error::CollaboratorError;
use crate::keys;
use crate::types::{IncidentContext, ServiceInfo};
use incident_workflow::{Agent, WorkflowContext, WorkflowError};
use std::sync::Arc;

/// Deployments attached to the incident context
const RECENT_DEPLOY_LIMIT: usize = 5;

/// Attaches service metadata, recent deploys, on-call and related incidents
pub struct ContextEnricher {
    catalog: Arc<dyn ServiceCatalog>,
}

impl ContextEnricher {
    /// Agent name
    pub const NAME: &'static str = "context_enricher";

    /// Create enricher backed by a service catalog
    #[must_use]
    pub fn new(catalog: Arc<dyn ServiceCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait::async_trait]
impl Agent for ContextEnricher {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        let alert = alert_of(&ctx)?;
        let service = alert.service.as_str();
        tracing::debug!("{}: enriching alert {}", service, alert.id);

        let mut service_info = match self.catalog.service_info(service).await {
            Ok(info) => info,
            Err(CollaboratorError::NotFound(_)) => {
                tracing::debug!("{}: not in service registry", service);
                ServiceInfo::unknown(service)
            }
            Err(err) => return Err(err.in_agent(Self::NAME)),
        };
        let owner_team = service_info.owner_team.clone();

        let recent_deploys = self
            .catalog
            .recent_deploys(service, RECENT_DEPLOY_LIMIT)
            .await
            .map_err(|e| e.in_agent(Self::NAME))?;
        service_info.oncall = self
            .catalog
            .oncall(&owner_team)
            .await
            .map_err(|e| e.in_agent(Self::NAME))?;
        let related_incidents = self
            .catalog
            .related_incidents(service)
            .await
            .map_err(|e| e.in_agent(Self::NAME))?;

        tracing::info!(
            "{}: context enriched (team {}, {} deploys, {} related)",
            service,
            owner_team,
            recent_deploys.len(),
            related_incidents.len()
        );

        let incident = IncidentContext {
            alert,
            service_info: service_info.clone(),
            recent_deploys,
            owner_team: owner_team.clone(),
            related_incidents,
        };
        ctx.insert(keys::INCIDENT_CONTEXT, &incident)?;
        ctx.insert(keys::OWNER_TEAM, &owner_team)?;
        ctx.insert(keys::SERVICE_INFO, &service_info)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockServiceCatalog;
    use crate::types::Alert;

    fn ctx_for(service: &str) -> WorkflowContext {
        WorkflowContext::new()
            .with(keys::ALERT, &Alert::new(service, "High CPU"))
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_service_gets_unknown_owner() {
        let mut catalog = MockServiceCatalog::new();
        catalog
            .expect_service_info()
            .returning(|s| Err(CollaboratorError::NotFound(s.to_string())));
        catalog.expect_recent_deploys().returning(|_, _| Ok(Vec::new()));
        catalog
            .expect_oncall()
            .withf(|team| team == "unknown")
            .times(1)
            .returning(|_| Ok(None));
        catalog.expect_related_incidents().returning(|_| Ok(Vec::new()));

        let out = ContextEnricher::new(Arc::new(catalog))
            .run(ctx_for("ghost-service"))
            .await
            .unwrap();
        assert_eq!(out.require::<String>(keys::OWNER_TEAM).unwrap(), "unknown");
        let info: ServiceInfo = out.require(keys::SERVICE_INFO).unwrap();
        assert_eq!(info.name, "ghost-service");
        assert!(info.oncall.is_none());
    }

    #[tokio::test]
    async fn catalog_outage_fails_the_agent() {
        let mut catalog = MockServiceCatalog::new();
        catalog
            .expect_service_info()
            .returning(|_| Err(CollaboratorError::unavailable("registry", "503")));

        let err = ContextEnricher::new(Arc::new(catalog))
            .run(ctx_for("payment-service"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::AgentFailed { ref agent, .. } if agent == "context_enricher"
        ));
        assert_eq!(err.message(), "registry unavailable: 503");
    }
}
