//! Probe agent
//!
//! Independent probes periodically sample metrics and hand snapshots to a
//! bounded sink for whatever consumes them downstream.
//!
//! # Architecture
//!
//! - [`metrics`]: typed, bounded, self-stamping metric values
//!   ([`SimpleMetric`], [`CounterMetric`], [`DiffMetric`], [`TimerMetric`])
//! - [`Collector`]: the trait a concrete probe implements
//! - [`Probe`]: runs one collector on a dedicated worker thread behind an
//!   activation state machine, with error backoff
//! - [`Sink`]: bounded MPMC queue of serialized snapshots
//! - [`probes`]: bundled collectors

pub mod collector;
pub mod config;
pub mod error;
pub mod logfile;
pub mod metrics;
pub mod probe;
pub mod probes;
pub mod sink;

pub use collector::Collector;
pub use config::{AgentConfig, ProbeConfig, ProbeEntry, ProbeKind};
pub use error::{CollectionError, ConfigError, MetricError, ProbeError};
pub use metrics::{
    CounterMetric, DiffMetric, Metric, MetricInfo, MetricSnapshot, SimpleMetric, TimerMetric,
    TimerState, Value,
};
pub use probe::{Probe, ProbeStatus, Transition};
pub use probes::{ProcessProbe, RandomProbe};
pub use sink::{CloseGuard, Sink};
