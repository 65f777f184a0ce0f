//! Orchestrator configuration
//!
//! Loading order: defaults, then an optional TOML file, then `INCIDENT_*`
//! environment overrides. Call [`OrchestratorConfig::validate`] before use.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "INCIDENT_";

/// Simulated collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Multiplier applied to simulated executor delays
    pub latency_scale: f64,
    /// Seed for reproducible simulated runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_scale: 0.5,
            seed: None,
        }
    }
}

/// Incident orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Reported service name
    pub service_name: String,
    /// Reported service version
    pub service_version: String,
    /// Remediation attempts before human takeover
    pub max_escalation_levels: u32,
    /// Deadline of one executor call in seconds
    pub remediation_timeout_secs: u64,
    /// Age after which terminal sessions are purged
    pub session_ttl_secs: u64,
    /// Per-subscriber event queue bound
    pub event_queue_capacity: usize,
    /// Log query window in minutes
    pub log_window_minutes: u32,
    /// Simulated collaborators
    pub simulation: SimulationConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            service_name: "incident-response".to_string(),
            service_version: crate::VERSION.to_string(),
            max_escalation_levels: 3,
            remediation_timeout_secs: 120,
            session_ttl_secs: 3600,
            event_queue_capacity: incident_events::DEFAULT_QUEUE_CAPACITY,
            log_window_minutes: 30,
            simulation: SimulationConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing fields keep their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, CoreError> {
        toml::from_str(contents).map_err(|e| CoreError::config(e.to_string()))
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    CoreError::config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `INCIDENT_*` variables from the process environment
    pub fn apply_env(&mut self) -> Result<(), CoreError> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `INCIDENT_*` overrides from any key/value source
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "MAX_ESCALATION_LEVELS" => self.max_escalation_levels = parse(name, value)?,
                "REMEDIATION_TIMEOUT_SECS" => self.remediation_timeout_secs = parse(name, value)?,
                "SESSION_TTL_SECS" => self.session_ttl_secs = parse(name, value)?,
                "EVENT_QUEUE_CAPACITY" => self.event_queue_capacity = parse(name, value)?,
                "SIMULATION_SEED" => self.simulation.seed = Some(parse(name, value)?),
                "SIMULATION_LATENCY_SCALE" => self.simulation.latency_scale = parse(name, value)?,
                _ => continue,
            }
            tracing::debug!("config: {}{} overridden from environment", ENV_PREFIX, name);
        }
        Ok(())
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_escalation_levels == 0 {
            return Err(CoreError::config("max_escalation_levels must be at least 1"));
        }
        if self.remediation_timeout_secs == 0 {
            return Err(CoreError::config("remediation_timeout_secs must be at least 1"));
        }
        if self.event_queue_capacity == 0 {
            return Err(CoreError::config("event_queue_capacity must be at least 1"));
        }
        if self.log_window_minutes == 0 {
            return Err(CoreError::config("log_window_minutes must be at least 1"));
        }
        let scale = self.simulation.latency_scale;
        if !scale.is_finite() || scale < 0.0 {
            return Err(CoreError::config(format!(
                "simulation.latency_scale must be a non-negative number, got {scale}"
            )));
        }
        Ok(())
    }

    /// Per-call executor deadline
    #[inline]
    #[must_use]
    pub fn remediation_timeout(&self) -> Duration {
        Duration::from_secs(self.remediation_timeout_secs)
    }

    /// Session retention period
    #[inline]
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// With remediation attempt cap
    #[inline]
    #[must_use]
    pub fn with_max_escalation_levels(mut self, max: u32) -> Self {
        self.max_escalation_levels = max;
        self
    }

    /// With executor deadline
    #[inline]
    #[must_use]
    pub fn with_remediation_timeout_secs(mut self, secs: u64) -> Self {
        self.remediation_timeout_secs = secs;
        self
    }

    /// With session TTL
    #[inline]
    #[must_use]
    pub fn with_session_ttl_secs(mut self, secs: u64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    /// With subscriber queue bound
    #[inline]
    #[must_use]
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// With simulation seed
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.simulation.seed = Some(seed);
        self
    }

    /// With simulated latency multiplier
    #[inline]
    #[must_use]
    pub fn with_latency_scale(mut self, scale: f64) -> Self {
        self.simulation.latency_scale = scale;
        self
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, CoreError> {
    value
        .parse()
        .map_err(|_| CoreError::config(format!("invalid value for {ENV_PREFIX}{name}: '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_escalation_levels, 3);
        assert_eq!(config.remediation_timeout_secs, 120);
        assert_eq!(config.session_ttl_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_keeps_missing_defaults() {
        let config = OrchestratorConfig::from_toml_str(
            "max_escalation_levels = 5\n[simulation]\nseed = 7\n",
        )
        .unwrap();
        assert_eq!(config.max_escalation_levels, 5);
        assert_eq!(config.simulation.seed, Some(7));
        assert!((config.simulation.latency_scale - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.session_ttl_secs, 3600);
    }

    #[test]
    fn overrides_apply_and_reject_garbage() {
        let mut config = OrchestratorConfig::default();
        config
            .apply_overrides([
                ("INCIDENT_MAX_ESCALATION_LEVELS", "4"),
                ("INCIDENT_SIMULATION_SEED", "42"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert_eq!(config.max_escalation_levels, 4);
        assert_eq!(config.simulation.seed, Some(42));

        let err = config
            .apply_overrides([("INCIDENT_SESSION_TTL_SECS", "soon")])
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let config = OrchestratorConfig::default().with_max_escalation_levels(0);
        assert!(config.validate().is_err());
        let config = OrchestratorConfig::default().with_latency_scale(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "remediation_timeout_secs = 9").unwrap();
        let config = OrchestratorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.remediation_timeout_secs, 9);

        assert!(OrchestratorConfig::load(Some(Path::new("/nonexistent/incident.toml"))).is_err());
    }
}
