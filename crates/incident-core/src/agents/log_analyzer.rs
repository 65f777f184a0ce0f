//! Log analysis
//!
//! One pass over the aggregated error patterns. Each entry can raise several
//! indicators at once: a FATAL timeout with a stack trace counts three times.

use super::alert_of;
use crate::collaborators::LogSource;
use crate::keys;
use crate::types::{Anomaly, DiagnosticResult, LogEntry, LogLevel, ServiceInfo};
use incident_workflow::{Agent, WorkflowContext, WorkflowError};
use std::sync::Arc;

const STACK_TRACE_LIMIT: usize = 500;
const SPIKE_THRESHOLD: u64 = 10;
const TIMEOUT_MARKERS: [&str; 3] = ["timeout", "timed out", "deadline exceeded"];
const TLS_MARKERS: [&str; 3] = ["certificate", "tls handshake", "ssl"];

/// Searches the log index for stack traces, spikes, timeouts and TLS failures
pub struct LogAnalyzer {
    logs: Arc<dyn LogSource>,
    window_minutes: u32,
}

impl LogAnalyzer {
    /// Agent name
    pub const NAME: &'static str = "log_analyzer";

    /// Create with a log source and query window
    #[must_use]
    pub fn new(logs: Arc<dyn LogSource>, window_minutes: u32) -> Self {
        Self {
            logs,
            window_minutes,
        }
    }
}

fn mentions(message: &str, markers: &[&str]) -> bool {
    let lower = message.to_lowercase();
    markers.iter().any(|marker| lower.contains(marker))
}

fn inspect(entry: &LogEntry, result: &mut DiagnosticResult) {
    let LogEntry {
        message,
        count,
        level,
        ..
    } = entry;
    let count = *count;

    if let Some(trace) = entry.stack_trace.as_deref().filter(|t| !t.is_empty()) {
        result
            .findings
            .push(format!("Stack trace detected: {message} (occurred {count} times)"));
        result.severity_indicators.insert("stack_trace_present".into());
        result.anomalies.push(Anomaly::StackTrace {
            message: message.clone(),
            count,
            stack_trace: crate::report::truncate_chars(trace, STACK_TRACE_LIMIT),
        });
    }

    if count > SPIKE_THRESHOLD {
        result.findings.push(format!(
            "Error spike: '{message}' occurred {count} times (level: {level})"
        ));
        result.severity_indicators.insert("error_spike".into());
        result.anomalies.push(Anomaly::ErrorSpike {
            message: message.clone(),
            count,
            level: level.to_string(),
        });
    }

    if mentions(message, &TIMEOUT_MARKERS) {
        result
            .findings
            .push(format!("Timeout pattern: {message} ({count} occurrences)"));
        result.severity_indicators.insert("timeout_pattern".into());
        result.anomalies.push(Anomaly::Timeout {
            message: message.clone(),
            count,
        });
    }

    if *level == LogLevel::Fatal {
        result.findings.push(format!("FATAL log detected: {message}"));
        result.severity_indicators.insert("fatal_log".into());
    }

    if mentions(message, &TLS_MARKERS) {
        result
            .findings
            .push(format!("TLS failure: {message} ({count} occurrences)"));
        result.severity_indicators.insert("tls_failure".into());
        result.anomalies.push(Anomaly::TlsFailure {
            message: message.clone(),
            count,
        });
    }
}

#[async_trait::async_trait]
impl Agent for LogAnalyzer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkflowContext) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = ctx;
        let alert = alert_of(&ctx)?;
        let service = alert.service.as_str();

        let logs = self
            .logs
            .query_logs(service, self.window_minutes)
            .await
            .map_err(|e| e.in_agent(Self::NAME))?;

        let mut result = DiagnosticResult::new(Self::NAME);
        result.findings.push(format!(
            "Found {} error log entries across {} unique patterns in the last {} minutes.",
            logs.total_entries(),
            logs.entries.len(),
            self.window_minutes
        ));
        for entry in &logs.entries {
            inspect(entry, &mut result);
        }

        let dependencies = ctx
            .get::<ServiceInfo>(keys::SERVICE_INFO)?
            .map(|info| info.dependencies)
            .unwrap_or_default();
        if !dependencies.is_empty() {
            result.findings.push(format!(
                "Service depends on: {}. Dependency logs should also be reviewed.",
                dependencies.join(", ")
            ));
        }

        tracing::info!(
            "{}: log analysis complete ({} findings, {} anomalies)",
            service,
            result.findings.len(),
            result.anomalies.len()
        );
        result.raw_data = serde_json::to_value(&logs).unwrap_or_default();
        ctx.insert(keys::LOG_DIAGNOSTICS, &result)?;
        Ok(ctx)
    }
}
