//! Error types for metrics, collectors and the probe engine.
//!
//! Metric faults surface synchronously to the collector that caused them.
//! The collector usually lets them bubble up as a [`CollectionError`], which
//! the probe worker answers with backoff instead of crashing.

use std::path::PathBuf;

use thiserror::Error;

use crate::probe::ProbeStatus;

/// Errors raised by a single metric operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    /// A counter was asked to move by a non-integral step, or by one that
    /// would take it below `min_val`.
    #[error("counter '{metric}': invalid step {step}")]
    InvalidStep { metric: String, step: String },

    /// A counter went past `max_val` with wrapping disabled.
    #[error("counter '{metric}': value {counter} overflows max {max}")]
    CounterOverflow {
        metric: String,
        counter: i64,
        max: f64,
    },

    /// A numeric metric was fed something that is not a finite number.
    #[error("metric '{metric}': value type {found} incompatible, expected numeric value")]
    InvalidValueType { metric: String, found: &'static str },
}

/// Errors a collector reports back to its probe.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// Source produced data the collector could not parse.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Source could not be reached or read.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// A metric rejected the collected value.
    #[error("type mismatch: {0}")]
    TypeMismatch(#[from] MetricError),

    /// `collect()` panicked.
    #[error("collector panicked: {0}")]
    Panicked(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for CollectionError {
    fn from(e: std::io::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Errors raised by the probe controller API.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The requested status change is not defined from the current status.
    #[error("probe '{probe}': cannot move from {from} to {to}")]
    InvalidStatusTransition {
        probe: String,
        from: ProbeStatus,
        to: ProbeStatus,
    },

    /// A raw status code did not name any status.
    #[error("unknown probe status code {0}")]
    UnknownStatus(u8),

    /// The per-probe log directory or file could not be created.
    #[error("probe '{probe}': logging could not be initialized at {}: {source}", .path.display())]
    LoggingInit {
        probe: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker thread could not be spawned.
    #[error("probe '{probe}': failed to spawn worker: {source}")]
    Spawn {
        probe: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
