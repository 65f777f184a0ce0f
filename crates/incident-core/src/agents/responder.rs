//! Responder assignment

use crate::collaborators::ServiceCatalog;
use crate::keys;
use crate::types::{EscalationLevel, EscalationStep, OncallRotation, ResponderAssignment, Severity};
use incident_workflow::{Agent, WorkflowContext, WorkflowError};
use std::sync::Arc;

/// Team whose rotation covers teams without one
const FALLBACK_TEAM: &str = "platform";

/// Picks the initial responder, escalation chain and notification channels
pub struct ResponderAssigner {
    catalog: Arc<dyn ServiceCatalog>,
}

impl ResponderAssigner {
    /// Agent name
    pub const NAME: &'static str = "responder_assigner";

    /// Create with an on-call source
    #[must_use]
    pub fn new(catalog: Arc<dyn ServiceCatalog>) -> Self {
        Self { catalog }
    }

    async fn rotation_for(&self, team: &str) -> Result<OncallRotation, WorkflowError> {
        for candidate in [team, FALLBACK_TEAM] {
            if let Some(rotation) = self
                .catalog
                .oncall(candidate)
                .await
                .map_err(|e| e.in_agent(Self::NAME))?
            {
                return Ok(rotation);
            }
        }
        Ok(OncallRotation::placeholder(team))
    }
}

/// Four-step chain with timeouts `base * 1..=4`
#[must_use]
pub fn escalation_path(severity: Severity, rotation: &OncallRotation) -> Vec<EscalationStep> {
    let base = severity.base_timeout_minutes();
    let actions = [
        "Automated remediation attempt",
        "Page primary on-call engineer",
        "Escalate to senior/staff engineer",
        "Escalate to engineering management",
    ];
    EscalationLevel::ALL
        .into_iter()
        .zip(actions)
        .zip(1_u32..)
        .map(|((level, action), step)| EscalationStep {
            level,
            action: action.to_string(),
            timeout_minutes: base * step,
            assignee: match level {
                EscalationLevel::L1Auto => "automation".to_string(),
                other => rotation.assignee(other).to_string(),
            },
        })
        .collect()
}

/// Slack channel, PagerDuty for P1/P2, war room for P1
#[must_use]
pub fn notification_channels(severity: Severity, rotation: &OncallRotation) -> Vec<String> {
    let mut channels = vec![rotation.slack_channel.clone()];
    if severity <= Severity::P2 {
        channels.push(format!("pagerduty:{}", rotation.pagerduty_service));
    }
    if severity == Severity::P1 {
        channels.push("#incident-war-room".to_string());
    }
    channels
}

#[async_trait::async_trait]
impl Agent for ResponderAssigner {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        let severity: Severity = ctx.require(keys::SEVERITY)?;
        let owner_team: String = ctx.get_or(keys::OWNER_TEAM, FALLBACK_TEAM.to_string())?;
        let rotation = self.rotation_for(&owner_team).await?;

        let (level, name) = match severity {
            Severity::P1 => (EscalationLevel::L2Oncall, rotation.l2_oncall.clone()),
            Severity::P2 => (EscalationLevel::L1Auto, rotation.l1_oncall.clone()),
            Severity::P3 | Severity::P4 => (EscalationLevel::L1Auto, "automation".to_string()),
        };
        let responder = ResponderAssignment {
            name,
            team: owner_team,
            level,
            pagerduty_service: rotation.pagerduty_service.clone(),
            slack_channel: rotation.slack_channel.clone(),
        };
        let channels = notification_channels(severity, &rotation);

        tracing::info!(
            "{}: assigned {} at {} ({} channels)",
            responder.team,
            responder.name,
            level,
            channels.len()
        );
        ctx.insert(keys::ASSIGNED_RESPONDER, &responder)?;
        ctx.insert(keys::ESCALATION_PATH, &escalation_path(severity, &rotation))?;
        ctx.insert(keys::ESCALATION_LEVEL, &level)?;
        ctx.insert(keys::NOTIFICATION_CHANNELS, &channels)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockServiceCatalog;

    fn rotation() -> OncallRotation {
        OncallRotation {
            team: "platform".into(),
            l1_oncall: "eve".into(),
            l2_oncall: "frank".into(),
            l3_senior: "kate".into(),
            l4_manager: "leo".into(),
            slack_channel: "#platform-oncall".into(),
            escalation_policy: "platform-critical".into(),
            pagerduty_service: "PSVC003".into(),
        }
    }

    #[test]
    fn path_timeouts_scale() {
        let path = escalation_path(Severity::P2, &rotation());
        let timeouts: Vec<u32> = path.iter().map(|s| s.timeout_minutes).collect();
        assert_eq!(timeouts, [15, 30, 45, 60]);
        assert_eq!(path[0].assignee, "automation");
        assert_eq!(path[3].assignee, "leo");
    }

    #[test]
    fn channels_by_severity() {
        assert_eq!(
            notification_channels(Severity::P1, &rotation()),
            ["#platform-oncall", "pagerduty:PSVC003", "#incident-war-room"]
        );
        assert_eq!(notification_channels(Severity::P3, &rotation()), ["#platform-oncall"]);
    }

    #[tokio::test]
    async fn missing_team_falls_back_to_platform() {
        let mut catalog = MockServiceCatalog::new();
        catalog
            .expect_oncall()
            .withf(|team| team == "ghosts")
            .times(1)
            .returning(|_| Ok(None));
        catalog
            .expect_oncall()
            .withf(|team| team == "platform")
            .times(1)
            .returning(|_| Ok(Some(rotation())));

        let ctx = WorkflowContext::new()
            .with(keys::SEVERITY, &Severity::P1)
            .unwrap()
            .with(keys::OWNER_TEAM, "ghosts")
            .unwrap();
        let out = ResponderAssigner::new(Arc::new(catalog)).run(ctx).await.unwrap();

        let responder: ResponderAssignment = out.require(keys::ASSIGNED_RESPONDER).unwrap();
        assert_eq!(responder.name, "frank");
        assert_eq!(responder.team, "ghosts");
        assert_eq!(
            out.require::<EscalationLevel>(keys::ESCALATION_LEVEL).unwrap(),
            EscalationLevel::L2Oncall
        );
    }
}
