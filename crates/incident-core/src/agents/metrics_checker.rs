//! Metrics anomaly check

use super::alert_of;
use crate::collaborators::MetricsSource;
use crate::keys;
use crate::types::{Anomaly, AnomalySeverity, DiagnosticResult, MetricAnomaly};
use incident_workflow::{Agent, WorkflowContext, WorkflowError};
use std::sync::Arc;

/// Ratio band (current / baseline) reported as normal
const NORMAL_BAND: std::ops::RangeInclusive<f64> = 0.8..=1.5;

/// Compares current metrics with baselines and tags the anomalies
pub struct MetricsChecker {
    metrics: Arc<dyn MetricsSource>,
    window_minutes: u32,
}

impl MetricsChecker {
    /// Agent name
    pub const NAME: &'static str = "metrics_checker";

    /// Create with a metrics source and query window
    #[must_use]
    pub fn new(metrics: Arc<dyn MetricsSource>, window_minutes: u32) -> Self {
        Self {
            metrics,
            window_minutes,
        }
    }
}

/// First matching indicator for an anomaly, if any
fn indicator_for(anomaly: &MetricAnomaly) -> Option<&'static str> {
    let MetricAnomaly {
        metric,
        current,
        deviation_pct,
        ..
    } = anomaly;
    match metric.as_str() {
        "error_rate" if *deviation_pct > 500.0 => Some("extreme_error_rate"),
        "cpu_pct" if *current > 90.0 => Some("cpu_critical"),
        "memory_pct" if *current > 90.0 => Some("memory_critical"),
        m if m.contains("latency") && *deviation_pct > 200.0 => Some("latency_degradation"),
        "active_connections" if *deviation_pct > 80.0 => Some("connection_pressure"),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Agent for MetricsChecker {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        let alert = alert_of(&ctx)?;
        let service = alert.service.as_str();

        let snapshot = self
            .metrics
            .query_metrics(service, self.window_minutes)
            .await
            .map_err(|e| e.in_agent(Self::NAME))?;

        let mut result = DiagnosticResult::new(Self::NAME);
        result.findings.push(if snapshot.anomalies.is_empty() {
            format!("No significant metric anomalies detected for {service}.")
        } else {
            format!(
                "Detected {} metric anomalies for {service}.",
                snapshot.anomalies.len()
            )
        });

        for anomaly in &snapshot.anomalies {
            result.findings.push(format!(
                "Metric '{}' is {}% above baseline: current={}, baseline={}",
                anomaly.metric, anomaly.deviation_pct, anomaly.current, anomaly.baseline
            ));
            if let Some(indicator) = indicator_for(anomaly) {
                result.severity_indicators.insert(indicator.to_string());
            }
            if anomaly.severity == AnomalySeverity::Critical {
                result
                    .severity_indicators
                    .insert(format!("{}_critical", anomaly.metric));
            }
            result.anomalies.push(Anomaly::Metric(anomaly.clone()));
        }

        let normal: Vec<&str> = snapshot
            .current
            .iter()
            .filter(|(metric, value)| {
                let baseline = snapshot.baseline.get(*metric).copied().unwrap_or(**value);
                baseline > 0.0 && NORMAL_BAND.contains(&(**value / baseline))
            })
            .map(|(metric, _)| metric.as_str())
            .collect();
        if !normal.is_empty() {
            result
                .findings
                .push(format!("Metrics within normal range: {}", normal.join(", ")));
        }

        tracing::info!(
            "{}: metrics check complete ({} anomalies)",
            service,
            snapshot.anomalies.len()
        );
        result.raw_data = serde_json::to_value(&snapshot).unwrap_or_default();
        ctx.insert(keys::METRICS_DIAGNOSTICS, &result)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockMetricsSource;
    use crate::types::{Alert, MetricsSnapshot};
    use std::collections::BTreeMap;

    fn anomaly(metric: &str, current: f64, baseline: f64, severity: AnomalySeverity) -> MetricAnomaly {
        MetricAnomaly {
            metric: metric.into(),
            current,
            baseline,
            deviation_pct: ((current / baseline - 1.0) * 1000.0).round() / 10.0,
            severity,
        }
    }

    #[test]
    fn indicator_precedence() {
        let spike = anomaly("error_rate", 0.3, 0.02, AnomalySeverity::Critical);
        assert_eq!(indicator_for(&spike), Some("extreme_error_rate"));
        let cpu = anomaly("cpu_pct", 95.0, 40.0, AnomalySeverity::Warning);
        assert_eq!(indicator_for(&cpu), Some("cpu_critical"));
        let mild_cpu = anomaly("cpu_pct", 70.0, 40.0, AnomalySeverity::Warning);
        assert_eq!(indicator_for(&mild_cpu), None);
        let latency = anomaly("p99_latency_ms", 1200.0, 300.0, AnomalySeverity::Critical);
        assert_eq!(indicator_for(&latency), Some("latency_degradation"));
        let conns = anomaly("active_connections", 190.0, 100.0, AnomalySeverity::Warning);
        assert_eq!(indicator_for(&conns), Some("connection_pressure"));
    }

    #[tokio::test]
    async fn findings_and_indicators() {
        let mut metrics = MockMetricsSource::new();
        metrics.expect_query_metrics().returning(|service, window| {
            let current = BTreeMap::from([
                ("cpu_pct".to_string(), 95.0),
                ("error_rate".to_string(), 0.3),
                ("rps".to_string(), 110.0),
            ]);
            let baseline = BTreeMap::from([
                ("cpu_pct".to_string(), 40.0),
                ("error_rate".to_string(), 0.02),
                ("rps".to_string(), 100.0),
            ]);
            Ok(MetricsSnapshot {
                service: service.to_string(),
                window_minutes: window,
                current,
                baseline,
                anomalies: vec![
                    anomaly("cpu_pct", 95.0, 40.0, AnomalySeverity::Warning),
                    anomaly("error_rate", 0.3, 0.02, AnomalySeverity::Critical),
                ],
            })
        });

        let ctx = WorkflowContext::new()
            .with(keys::ALERT, &Alert::new("payment-service", "Errors"))
            .unwrap();
        let out = MetricsChecker::new(Arc::new(metrics), 30).run(ctx).await.unwrap();
        let result: DiagnosticResult = out.require(keys::METRICS_DIAGNOSTICS).unwrap();

        assert_eq!(result.findings[0], "Detected 2 metric anomalies for payment-service.");
        assert_eq!(result.findings.last().unwrap(), "Metrics within normal range: rps");
        let indicators: Vec<&str> = result.severity_indicators.iter().map(String::as_str).collect();
        assert_eq!(indicators, ["cpu_critical", "error_rate_critical", "extreme_error_rate"]);
    }
}
