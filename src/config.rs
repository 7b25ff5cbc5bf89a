//! Probe and agent configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config.
//! Durations are written as (fractional) seconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sink::{DEFAULT_PUSH_TIMEOUT, DEFAULT_SINK_CAPACITY};

// ─── Defaults ────────────────────────────────────────────────────

/// Default time between collection cycles.
pub const DEFAULT_PERIODICITY: Duration = Duration::from_secs(5);

/// Consecutive collection failures tolerated before a probe terminates.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Default scale applied to `periodicity * errors` when backing off.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.0;

/// Rotated probe logs: size threshold and retained backups.
pub const LOG_MAX_BYTES: u64 = 2 * 1024 * 1024;
pub const LOG_BACKUPS: usize = 5;

// ─── Probe configuration ─────────────────────────────────────────

/// Settings for one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Time between collection cycles.
    #[serde(with = "secs")]
    pub periodicity: Duration,

    /// Failures in a row tolerated before the probe terminates itself.
    pub max_consecutive_errors: u32,

    /// After `n` failures in a row the worker sleeps
    /// `periodicity * n * backoff_multiplier`.
    pub backoff_multiplier: f64,

    /// Longest wait for sink room before a snapshot is dropped.
    #[serde(with = "secs")]
    pub push_timeout: Duration,

    /// Capacity of the sink created by `attach_sink(None)`.
    pub sink_capacity: usize,

    /// Terminate after this many successful cycles.
    pub max_cycles: Option<u64>,

    /// Emit every collected snapshot as a debug event.
    pub debug: bool,

    /// Enable the rotating probe log under `<log_dir>/logs/<name>/`.
    pub log_dir: Option<PathBuf>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            periodicity: DEFAULT_PERIODICITY,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            max_cycles: None,
            debug: false,
            log_dir: None,
        }
    }
}

impl ProbeConfig {
    pub fn with_periodicity(mut self, periodicity: Duration) -> Self {
        self.periodicity = periodicity;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    pub fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.periodicity.is_zero() {
            return Err(ConfigError::Invalid("periodicity must be greater than zero".into()));
        }
        if self.sink_capacity == 0 {
            return Err(ConfigError::Invalid("sink_capacity must be greater than zero".into()));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "backoff_multiplier must be a positive number, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Sleep after the `errors`-th consecutive failure. Saturates at
    /// [`Duration::MAX`].
    pub fn backoff(&self, errors: u32) -> Duration {
        let secs = self.periodicity.as_secs_f64() * f64::from(errors) * self.backoff_multiplier;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

// ─── Agent configuration ─────────────────────────────────────────

/// Which bundled collector a configured probe runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Random,
    Process,
}

/// One probe entry in the agent config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeEntry {
    pub kind: ProbeKind,
    pub name: Option<String>,
    #[serde(default)]
    pub config: ProbeConfig,
}

/// Configuration for the `probe-agent` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Newline-delimited JSON file receiving every snapshot.
    pub output: PathBuf,

    /// Stop after this long. Runs until Ctrl-C when unset.
    #[serde(with = "opt_secs")]
    pub run_for: Option<Duration>,

    /// Capacity of the sink shared by all probes.
    pub sink_capacity: usize,

    pub probes: Vec<ProbeEntry>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("metrics.jsonl"),
            run_for: None,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            probes: vec![
                ProbeEntry {
                    kind: ProbeKind::Random,
                    name: None,
                    config: ProbeConfig::default(),
                },
                ProbeEntry {
                    kind: ProbeKind::Process,
                    name: None,
                    config: ProbeConfig::default(),
                },
            ],
        }
    }
}

impl AgentConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sink_capacity == 0 {
            return Err(ConfigError::Invalid("sink_capacity must be greater than zero".into()));
        }
        for entry in &self.probes {
            entry.config.validate()?;
        }
        Ok(())
    }
}

// ─── Serde helpers ───────────────────────────────────────────────

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_config_defaults() {
        let config: ProbeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(config.max_consecutive_errors, 10);
        assert_eq!(config.push_timeout, Duration::from_secs(1));
        assert_eq!(config.sink_capacity, 1_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations_in_seconds() {
        let config: ProbeConfig =
            serde_json::from_str(r#"{"periodicity": 0.25, "push_timeout": 2}"#).unwrap();
        assert_eq!(config.periodicity, Duration::from_millis(250));
        assert_eq!(config.push_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(serde_json::from_str::<ProbeConfig>(r#"{"periodicity": -1}"#).is_err());
    }

    #[test]
    fn test_validation() {
        let zero = ProbeConfig::default().with_periodicity(Duration::ZERO);
        assert!(zero.validate().unwrap_err().to_string().contains("periodicity"));

        let bad = ProbeConfig::default().with_backoff_multiplier(0.0);
        assert!(bad.validate().is_err());

        let empty_sink = ProbeConfig::default().with_sink_capacity(0);
        assert!(empty_sink.validate().is_err());
    }

    #[test]
    fn test_backoff_scales_linearly() {
        let config = ProbeConfig::default()
            .with_periodicity(Duration::from_secs(2))
            .with_backoff_multiplier(1.5);
        assert_eq!(config.backoff(1), Duration::from_secs(3));
        assert_eq!(config.backoff(4), Duration::from_secs(12));
    }

    #[test]
    fn test_backoff_saturates() {
        let config = ProbeConfig::default().with_backoff_multiplier(1e300);
        assert!(config.validate().is_ok());
        assert_eq!(config.backoff(3), Duration::MAX);

        let long = ProbeConfig::default().with_periodicity(Duration::MAX);
        assert_eq!(long.backoff(2), Duration::MAX);
    }

    #[test]
    fn test_agent_config_parse() {
        let config = AgentConfig::from_json(
            r#"{
                "output": "/tmp/out.jsonl",
                "run_for": 30,
                "probes": [
                    { "kind": "random", "name": "dice", "config": { "periodicity": 1 } },
                    { "kind": "process" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.output, PathBuf::from("/tmp/out.jsonl"));
        assert_eq!(config.run_for, Some(Duration::from_secs(30)));
        assert_eq!(config.probes.len(), 2);
        assert_eq!(config.probes[0].kind, ProbeKind::Random);
        assert_eq!(config.probes[0].name.as_deref(), Some("dice"));
        assert_eq!(config.probes[0].config.periodicity, Duration::from_secs(1));
        assert_eq!(config.probes[1].config, ProbeConfig::default());
    }

    #[test]
    fn test_agent_config_rejects_invalid_probe() {
        let err = AgentConfig::from_json(
            r#"{ "probes": [ { "kind": "random", "config": { "periodicity": 0 } } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_agent_config_load_missing_file() {
        let err = AgentConfig::load(Path::new("/nonexistent/agent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
