//! Shared collectors and helpers for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use probe_agent::{CollectionError, Collector, CounterMetric, Metric, SimpleMetric};

/// Counts its own cycles into a `tick` metric and a `counter` metric.
pub struct Ticker {
    pub tick: Arc<SimpleMetric>,
    pub counter: Arc<CounterMetric>,
    n: i64,
    pub probe: TickerProbe,
}

/// Handles the test keeps after the collector moves into the probe.
#[derive(Clone, Default)]
pub struct TickerProbe {
    pub threads: Arc<Mutex<Vec<ThreadId>>>,
    pub cleanups: Arc<AtomicUsize>,
}

impl TickerProbe {
    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    pub fn distinct_threads(&self) -> usize {
        let mut ids = self.threads.lock().clone();
        ids.dedup();
        ids.len()
    }
}

impl Ticker {
    pub fn new() -> (Self, TickerProbe) {
        let probe = TickerProbe::default();
        let ticker = Self {
            tick: Arc::new(SimpleMetric::new("tick", "#", "cycle number")),
            counter: Arc::new(CounterMetric::new("counter", "#", "cycle counter")),
            n: 0,
            probe: probe.clone(),
        };
        (ticker, probe)
    }
}

impl Collector for Ticker {
    fn description(&self) -> &str {
        "counts cycles"
    }

    fn metrics(&self) -> Vec<Arc<dyn Metric>> {
        vec![self.tick.clone() as Arc<dyn Metric>, self.counter.clone()]
    }

    fn collect(&mut self) -> Result<(), CollectionError> {
        self.n += 1;
        self.tick.set_value(self.n);
        self.counter.increment()?;
        self.probe.threads.lock().push(thread::current().id());
        Ok(())
    }

    fn cleanup(&mut self) {
        self.probe.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fails its first `failures` collections (all of them when `None`), then
/// succeeds. Panics instead of failing when `panic` is set.
pub struct Flaky {
    failures: Option<usize>,
    panic: bool,
    pub calls: Arc<AtomicUsize>,
    pub cleanups: Arc<AtomicUsize>,
    value: Arc<SimpleMetric>,
}

impl Flaky {
    pub fn always() -> Self {
        Self::build(None, false)
    }

    pub fn first(failures: usize) -> Self {
        Self::build(Some(failures), false)
    }

    pub fn panicking() -> Self {
        Self::build(None, true)
    }

    fn build(failures: Option<usize>, panic: bool) -> Self {
        Self {
            failures,
            panic,
            calls: Arc::default(),
            cleanups: Arc::default(),
            value: Arc::new(SimpleMetric::new("value", "#", "flaky value")),
        }
    }
}

impl Collector for Flaky {
    fn metrics(&self) -> Vec<Arc<dyn Metric>> {
        vec![self.value.clone() as Arc<dyn Metric>]
    }

    fn collect(&mut self) -> Result<(), CollectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failures.map_or(true, |n| call <= n) {
            if self.panic {
                panic!("collector exploded on call {call}");
            }
            return Err(CollectionError::Unavailable(format!("call {call} failed")));
        }
        self.value.set_value(call as i64);
        Ok(())
    }

    fn cleanup(&mut self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
