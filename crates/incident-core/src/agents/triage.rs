//! Severity triage

use crate::collaborators::{Classification, SeverityClassifier};
use crate::keys;
use crate::types::{IncidentContext, Severity, ServiceTier};
use incident_workflow::{Agent, WorkflowContext, WorkflowError};
use std::sync::Arc;

const P1_KEYWORDS: &[&str] = &[
    "outage",
    "down",
    "critical",
    "crash",
    "crashloopbackoff",
    "oom",
    "out of memory",
    "data loss",
    "security breach",
    "complete failure",
    "service unavailable",
    "503",
    "502",
    "connection refused",
    "fatal",
    "catastrophic",
];

const P2_KEYWORDS: &[&str] = &[
    "degraded",
    "high error",
    "high-error",
    "spike",
    "surge",
    "elevated",
    "exhaustion",
    "exhausted",
    "timeout",
    "leak",
    "circuit breaker",
    "5xx",
    "connection pool",
    "expir",
];

const P3_KEYWORDS: &[&str] = &[
    "slow",
    "latency",
    "delayed",
    "warning",
    "warn",
    "increased",
    "above threshold",
    "drift",
    "unassigned",
    "yellow",
    "lag",
    "backlog",
];

/// Ordered keyword lists; the first matching list decides, no match is P4
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    tiers: Vec<(Severity, Vec<String>)>,
}

impl KeywordClassifier {
    /// Classifier with the standard P1, P2, P3 keyword lists
    #[must_use]
    pub fn new() -> Self {
        let owned = |words: &[&str]| -> Vec<String> { words.iter().map(ToString::to_string).collect() };
        Self {
            tiers: vec![
                (Severity::P1, owned(P1_KEYWORDS)),
                (Severity::P2, owned(P2_KEYWORDS)),
                (Severity::P3, owned(P3_KEYWORDS)),
            ],
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SeverityClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Classification {
        self.tiers
            .iter()
            .find_map(|(severity, words)| {
                words
                    .iter()
                    .find(|word| text.contains(word.as_str()))
                    .map(|word| Classification {
                        severity: *severity,
                        keyword: Some(word.clone()),
                    })
            })
            .unwrap_or(Classification {
                severity: Severity::P4,
                keyword: None,
            })
    }
}

/// Severity after the service-tier rule
///
/// A critical-tier service raises P3/P4 by exactly one level; P1/P2 and other
/// tiers are unchanged.
#[must_use]
pub fn adjust_for_tier(base: Severity, tier: ServiceTier) -> Severity {
    match (tier, base) {
        (ServiceTier::Critical, Severity::P3 | Severity::P4) => base.raised(),
        _ => base,
    }
}

/// Classifies severity P1..P4 and explains why
pub struct TriageAgent {
    classifier: Arc<dyn SeverityClassifier>,
}

impl TriageAgent {
    /// Agent name
    pub const NAME: &'static str = "triage_agent";

    /// Create with a classifier
    #[must_use]
    pub fn new(classifier: Arc<dyn SeverityClassifier>) -> Self {
        Self { classifier }
    }
}

fn reasoning(incident: &IncidentContext, classification: &Classification, severity: Severity) -> String {
    let alert = &incident.alert;
    let tier = incident.service_info.tier;
    let mut parts = vec![format!(
        "Alert '{}' on service '{}' classified as {}.",
        alert.title, alert.service, severity
    )];
    if let Some(keyword) = &classification.keyword {
        parts.push(format!("Keyword match: '{keyword}'."));
    }
    parts.push(format!("Service tier: {tier}."));
    if severity != classification.severity {
        parts.push(format!(
            "Upgraded from {} due to critical service tier.",
            classification.severity
        ));
    }
    if let Some(latest) = incident.recent_deploys.first() {
        parts.push(format!(
            "Recent deploy detected: {} deployed {} by {}. Changelog: {}.",
            latest.version,
            latest.deployed_at.to_rfc3339(),
            latest.deployed_by,
            latest.changelog
        ));
    }
    parts.push(format!(
        "Related incidents found: {}.",
        incident.related_incidents.len()
    ));
    parts.join(" ")
}

#[async_trait::async_trait]
impl Agent for TriageAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        let incident: IncidentContext = ctx.require(keys::INCIDENT_CONTEXT)?;

        let classification = self.classifier.classify(&incident.alert.search_text());
        let severity = adjust_for_tier(classification.severity, incident.service_info.tier);
        let reasoning = reasoning(&incident, &classification, severity);

        tracing::info!(
            "{}: classified {} (keyword {:?}, tier {})",
            incident.alert.service,
            severity,
            classification.keyword,
            incident.service_info.tier
        );
        ctx.insert(keys::SEVERITY, &severity)?;
        ctx.insert(keys::TRIAGE_REASONING, &reasoning)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Alert, ServiceInfo};

    fn incident(title: &str, tier: ServiceTier) -> IncidentContext {
        let mut service_info = ServiceInfo::unknown("payment-service");
        service_info.tier = tier;
        IncidentContext {
            alert: Alert::new("payment-service", title),
            service_info,
            recent_deploys: Vec::new(),
            owner_team: "payments".into(),
            related_incidents: Vec::new(),
        }
    }

    #[test]
    fn keyword_tiers_in_order() {
        let classifier = KeywordClassifier::new();
        assert_eq!(classifier.classify("service outage").severity, Severity::P1);
        let p2 = classifier.classify("connection pool exhaustion");
        assert_eq!(p2.severity, Severity::P2);
        assert_eq!(p2.keyword.as_deref(), Some("exhaustion"));
        assert_eq!(classifier.classify("slow responses").severity, Severity::P3);
        assert_eq!(classifier.classify("all good").keyword, None);
    }

    #[test]
    fn critical_tier_raises_one_level() {
        assert_eq!(adjust_for_tier(Severity::P4, ServiceTier::Critical), Severity::P3);
        assert_eq!(adjust_for_tier(Severity::P3, ServiceTier::Critical), Severity::P2);
        assert_eq!(adjust_for_tier(Severity::P2, ServiceTier::Critical), Severity::P2);
        assert_eq!(adjust_for_tier(Severity::P4, ServiceTier::High), Severity::P4);
    }

    #[tokio::test]
    async fn reasoning_mentions_upgrade() {
        let ctx = WorkflowContext::new()
            .with(keys::INCIDENT_CONTEXT, &incident("Slow checkout", ServiceTier::Critical))
            .unwrap();
        let out = TriageAgent::new(Arc::new(KeywordClassifier::new()))
            .run(ctx)
            .await
            .unwrap();

        assert_eq!(out.require::<Severity>(keys::SEVERITY).unwrap(), Severity::P2);
        let reasoning: String = out.require(keys::TRIAGE_REASONING).unwrap();
        assert_eq!(
            reasoning,
            "Alert 'Slow checkout' on service 'payment-service' classified as P2. \
             Keyword match: 'slow'. Service tier: critical. \
             Upgraded from P3 due to critical service tier. Related incidents found: 0."
        );
    }
}
