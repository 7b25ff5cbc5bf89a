use std::fmt;

use serde::{Deserialize, Serialize};

use super::{MetricInfo, Value};

/// Flat record of one metric at one point in time.
///
/// This is what probes push onto a sink, serialized as a single JSON
/// object. Infinite bounds are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub name: String,
    pub units: String,
    pub desc: String,
    /// Unix seconds, `None` until the first value is set.
    pub timestamp: Option<i64>,
    pub val: Option<Value>,
    pub min_val: Option<f64>,
    pub max_val: Option<f64>,
    pub higher_is_better: bool,
    pub group: Option<String>,
}

impl MetricSnapshot {
    pub(crate) fn new(
        info: &MetricInfo,
        val: Option<Value>,
        timestamp: Option<i64>,
        group: Option<String>,
    ) -> Self {
        Self {
            name: info.name.clone(),
            units: info.units.clone(),
            desc: info.desc.clone(),
            timestamp,
            val,
            min_val: finite(info.min_val),
            max_val: finite(info.max_val),
            higher_is_better: info.higher_is_better,
            group,
        }
    }

    /// Single-line JSON form, as pushed onto sinks and written to `.jsonl`
    /// files.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl fmt::Display for MetricSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
