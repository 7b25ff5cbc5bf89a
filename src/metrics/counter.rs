use parking_lot::Mutex;

use super::{Metric, MetricCell, MetricInfo, Value};
use crate::error::MetricError;

#[derive(Debug)]
struct CounterState {
    counter: i64,
    /// Set when an increment overflowed with wrapping disabled. Further
    /// increments fail until [`CounterMetric::reset_counter`].
    overflowed: bool,
}

/// Integral counter bounded by `[min_val, max_val]`.
///
/// With `reset` enabled (the default) the counter wraps back to `min_val`
/// when it passes `max_val`. With it disabled the increment fails with
/// [`MetricError::CounterOverflow`] and the counter is left at the
/// overflowed value.
#[derive(Debug)]
pub struct CounterMetric {
    cell: MetricCell,
    step: i64,
    reset: bool,
    min: i64,
    state: Mutex<CounterState>,
}

impl CounterMetric {
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        let mut info = MetricInfo::new(name, units, desc);
        info.min_val = 0.0;
        Self {
            cell: MetricCell::new(info),
            step: 1,
            reset: true,
            min: 0,
            state: Mutex::new(CounterState {
                counter: 0,
                overflowed: false,
            }),
        }
    }

    /// Counter range. The counter starts at `min`.
    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        let info = self.cell.info_mut();
        info.min_val = min as f64;
        info.max_val = max as f64;
        self.min = min;
        self.state.get_mut().counter = min;
        self
    }

    pub fn with_max(mut self, max: i64) -> Self {
        self.cell.info_mut().max_val = max as f64;
        self
    }

    /// Default step used by [`increment`](Self::increment).
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    /// Whether to wrap to `min_val` on overflow.
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn lower_is_better(mut self) -> Self {
        self.cell.info_mut().higher_is_better = false;
        self
    }

    pub fn counter(&self) -> i64 {
        self.state.lock().counter
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Advance by the default step.
    pub fn increment(&self) -> Result<i64, MetricError> {
        self.apply(self.step)
    }

    /// Advance by an arbitrary step, which must be an integer.
    pub fn increment_by(&self, step: impl Into<Value>) -> Result<i64, MetricError> {
        match step.into() {
            Value::Int(step) => self.apply(step),
            other => Err(MetricError::InvalidStep {
                metric: self.name().to_owned(),
                step: other.to_string(),
            }),
        }
    }

    /// Put the counter back at `min_val` and clear any overflow.
    pub fn reset_counter(&self) {
        let mut s = self.state.lock();
        s.counter = self.min;
        s.overflowed = false;
    }

    fn apply(&self, step: i64) -> Result<i64, MetricError> {
        let max = self.cell.info().max_val;
        let mut s = self.state.lock();

        if s.overflowed {
            return Err(self.overflow(s.counter, max));
        }

        let next = s.counter.saturating_add(step);
        if (next as f64) < self.cell.info().min_val {
            return Err(MetricError::InvalidStep {
                metric: self.name().to_owned(),
                step: format!("{step} (would drop below min {})", self.min),
            });
        }

        s.counter = next;
        if next as f64 > max {
            if self.reset {
                s.counter = self.min;
            } else {
                s.overflowed = true;
                return Err(self.overflow(next, max));
            }
        }

        let counter = s.counter;
        self.cell.set_value(Value::Int(counter));
        Ok(counter)
    }

    fn overflow(&self, counter: i64, max: f64) -> MetricError {
        MetricError::CounterOverflow {
            metric: self.name().to_owned(),
            counter,
            max,
        }
    }
}

impl Metric for CounterMetric {
    fn cell(&self) -> &MetricCell {
        &self.cell
    }
}
