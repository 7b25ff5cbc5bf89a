pub mod counter;
pub mod diff;
pub mod simple;
pub mod snapshot;
pub mod timer;

use std::fmt;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use counter::CounterMetric;
pub use diff::DiffMetric;
pub use simple::SimpleMetric;
pub use snapshot::MetricSnapshot;
pub use timer::{TimerMetric, TimerState};

// ─── Values ──────────────────────────────────────────────────────

/// A single measured value. Serialized untagged, so a snapshot's `val`
/// is a plain JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    /// Numeric view of the value. `None` for text, booleans and
    /// non-finite floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) if f.is_finite() => Some(*f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(f) if f.is_finite() => "float",
            Self::Float(_) => "non-finite float",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ─── Static description ─────────────────────────────────────────

/// The immutable part of a metric: identity, units and bounds.
///
/// Bounds are informational only. They default to −∞/+∞ and are not
/// enforced except by [`CounterMetric`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricInfo {
    pub name: String,
    pub units: String,
    pub desc: String,
    pub min_val: f64,
    pub max_val: f64,
    pub higher_is_better: bool,
}

impl MetricInfo {
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            desc: desc.into(),
            min_val: f64::NEG_INFINITY,
            max_val: f64::INFINITY,
            higher_is_better: true,
        }
    }
}

// ─── Mutable reading ────────────────────────────────────────────

#[derive(Debug, Default)]
struct Reading {
    value: Option<Value>,
    timestamp: Option<i64>,
    group: Option<String>,
}

/// Storage shared by every metric kind: the static [`MetricInfo`] plus the
/// latest value, its timestamp and the owning group.
///
/// Value and timestamp live behind one lock so a reader never sees one
/// without the other.
#[derive(Debug)]
pub struct MetricCell {
    info: MetricInfo,
    reading: Mutex<Reading>,
}

impl MetricCell {
    pub fn new(info: MetricInfo) -> Self {
        Self {
            info,
            reading: Mutex::new(Reading::default()),
        }
    }

    pub fn info(&self) -> &MetricInfo {
        &self.info
    }

    pub(crate) fn info_mut(&mut self) -> &mut MetricInfo {
        &mut self.info
    }

    /// Stamp `now` and store `value`.
    pub fn set_value(&self, value: Value) {
        let mut r = self.reading.lock();
        r.timestamp = Some(Utc::now().timestamp());
        r.value = Some(value);
    }

    pub fn value(&self) -> Option<Value> {
        self.reading.lock().value.clone()
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.reading.lock().timestamp
    }

    pub fn group(&self) -> Option<String> {
        self.reading.lock().group.clone()
    }

    pub fn set_group(&self, group: &str) {
        self.reading.lock().group = Some(group.to_owned());
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        let r = self.reading.lock();
        MetricSnapshot::new(&self.info, r.value.clone(), r.timestamp, r.group.clone())
    }
}

// ─── Metric trait ────────────────────────────────────────────────

/// Common behaviour of every metric kind.
///
/// Implementors only expose their [`MetricCell`]; everything else is
/// provided. Metrics are shared as `Arc<dyn Metric>` between the collector
/// that updates them and the probe that publishes them.
pub trait Metric: Send + Sync + fmt::Debug {
    fn cell(&self) -> &MetricCell;

    fn name(&self) -> &str {
        &self.cell().info().name
    }

    fn info(&self) -> &MetricInfo {
        self.cell().info()
    }

    fn value(&self) -> Option<Value> {
        self.cell().value()
    }

    fn timestamp(&self) -> Option<i64> {
        self.cell().timestamp()
    }

    fn group(&self) -> Option<String> {
        self.cell().group()
    }

    fn set_group(&self, group: &str) {
        self.cell().set_group(group);
    }

    fn snapshot(&self) -> MetricSnapshot {
        self.cell().snapshot()
    }
}
