use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::collector::Collector;
use crate::error::CollectionError;
use crate::metrics::{CounterMetric, DiffMetric, Metric, SimpleMetric};

/// Demo collector producing random values, one metric of each kind.
pub struct RandomProbe {
    rng: StdRng,
    real: Arc<SimpleMetric>,
    int: Arc<SimpleMetric>,
    counter: Arc<CounterMetric>,
    diff: Arc<DiffMetric>,
}

impl RandomProbe {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic sequence, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            real: Arc::new(
                SimpleMetric::new("random_real", "%", "random real between 0 and 10")
                    .with_bounds(0.0, 10.0),
            ),
            int: Arc::new(
                SimpleMetric::new("random_int", "#", "random int between 0 and 1000")
                    .with_bounds(0.0, 1000.0)
                    .lower_is_better(),
            ),
            counter: Arc::new(
                CounterMetric::new("cycle_counter", "#", "counter incrementing by 1 and resetting at 20")
                    .with_max(20),
            ),
            diff: Arc::new(DiffMetric::new(
                "random_int_diff",
                "%",
                "scaled difference from previous random int",
            )),
        }
    }
}

impl Default for RandomProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RandomProbe {
    fn description(&self) -> &str {
        "RandomProbe collects some dummy metrics"
    }

    fn metrics(&self) -> Vec<Arc<dyn Metric>> {
        vec![
            self.real.clone() as Arc<dyn Metric>,
            self.int.clone(),
            self.counter.clone(),
            self.diff.clone(),
        ]
    }

    fn collect(&mut self) -> Result<(), CollectionError> {
        let real: f64 = self.rng.gen_range(0.0..10.0);
        let int: i64 = self.rng.gen_range(0..=1000);

        self.real.set_value(real);
        self.int.set_value(int);
        self.counter.increment()?;
        self.diff.update(int)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Value;

    #[test]
    fn test_collect_sets_every_metric() {
        let mut probe = RandomProbe::seeded(7);
        probe.collect().unwrap();

        for m in probe.metrics() {
            assert!(m.value().is_some(), "{} has no value", m.name());
            assert!(m.timestamp().is_some());
        }
        let real = probe.real.value().and_then(|v| v.as_f64()).unwrap();
        assert!((0.0..10.0).contains(&real));
        assert_eq!(probe.counter.value(), Some(Value::Int(1)));
    }

    #[test]
    fn test_counter_wraps_after_twenty() {
        let mut probe = RandomProbe::seeded(1);
        for _ in 0..21 {
            probe.collect().unwrap();
        }
        assert_eq!(probe.counter.counter(), 0);
    }
}
