use parking_lot::Mutex;

use super::{Metric, MetricCell, MetricInfo, Value};
use crate::error::MetricError;

#[derive(Debug, Default)]
struct DiffState {
    prev: f64,
    cur: f64,
    diff: f64,
}

/// Percentage change between consecutive updates.
///
/// `value == diff * 100` where `diff = (cur - prev) / prev`. A zero `prev`,
/// which includes the very first update, yields a diff of 0.
#[derive(Debug)]
pub struct DiffMetric {
    cell: MetricCell,
    state: Mutex<DiffState>,
}

impl DiffMetric {
    pub fn new(name: impl Into<String>, units: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            cell: MetricCell::new(MetricInfo::new(name, units, desc)),
            state: Mutex::new(DiffState::default()),
        }
    }

    /// `%`-unit diff metric with a generic description.
    pub fn percent(name: impl Into<String>) -> Self {
        Self::new(name, "%", "a diff metric")
    }

    pub fn with_bounds(mut self, min_val: f64, max_val: f64) -> Self {
        let info = self.cell.info_mut();
        info.min_val = min_val;
        info.max_val = max_val;
        self
    }

    pub fn lower_is_better(mut self) -> Self {
        self.cell.info_mut().higher_is_better = false;
        self
    }

    /// Feed the next observation. Returns the new percentage.
    pub fn update(&self, value: impl Into<Value>) -> Result<f64, MetricError> {
        let value = value.into();
        let new = value.as_f64().ok_or_else(|| MetricError::InvalidValueType {
            metric: self.name().to_owned(),
            found: value.type_name(),
        })?;

        let pct = {
            let mut s = self.state.lock();
            s.prev = s.cur;
            s.cur = new;
            s.diff = if s.prev == 0.0 {
                0.0
            } else {
                (s.cur - s.prev) / s.prev
            };
            s.diff * 100.0
        };

        self.cell.set_value(Value::Float(pct));
        Ok(pct)
    }

    /// Fractional change from the last update (not scaled).
    pub fn diff(&self) -> f64 {
        self.state.lock().diff
    }

    pub fn previous(&self) -> f64 {
        self.state.lock().prev
    }

    pub fn current(&self) -> f64 {
        self.state.lock().cur
    }
}

impl Metric for DiffMetric {
    fn cell(&self) -> &MetricCell {
        &self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_sequence() {
        let d = DiffMetric::percent("d");
        assert_eq!(d.update(10).unwrap(), 0.0);
        assert_eq!(d.value(), Some(Value::Float(0.0)));

        assert_eq!(d.update(20).unwrap(), 100.0);
        assert_eq!(d.value(), Some(Value::Float(100.0)));

        assert_eq!(d.update(30).unwrap(), 50.0);
        assert_eq!(d.value(), Some(Value::Float(50.0)));
        assert_eq!(d.diff(), 0.5);
    }

    #[test]
    fn test_zero_previous_yields_zero() {
        let d = DiffMetric::percent("d");
        d.update(0).unwrap();
        assert_eq!(d.update(5).unwrap(), 0.0);
        assert_eq!(d.update(10).unwrap(), 100.0);
    }

    #[test]
    fn test_non_numeric_rejected() {
        let d = DiffMetric::percent("d");
        d.update(10).unwrap();

        let err = d.update("ten").unwrap_err();
        assert!(matches!(err, MetricError::InvalidValueType { found: "text", .. }));
        assert!(d.update(f64::INFINITY).is_err());

        // Rejected input leaves state untouched.
        assert_eq!(d.current(), 10.0);
        assert_eq!(d.update(15).unwrap(), 50.0);
    }

    #[test]
    fn test_negative_change() {
        let d = DiffMetric::percent("d");
        d.update(200.0).unwrap();
        assert_eq!(d.update(150.0).unwrap(), -25.0);
    }
}
