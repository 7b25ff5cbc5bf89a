use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{Metric, MetricCell, MetricInfo, Value};

/// Default watchdog bound: a timer left running for a day is finished
/// automatically.
pub const DEFAULT_TIMER_MAX: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Started,
    Paused,
    Finished,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Started => "STARTED",
            Self::Paused => "PAUSED",
            Self::Finished => "FINISHED",
        })
    }
}

struct TimerInner {
    state: TimerState,
    tval: Duration,
    started_at: Option<Instant>,
    /// Bumped on every arm and disarm. A watchdog only fires while the
    /// generation it was armed with is still current.
    generation: u64,
}

struct TimerShared {
    cell: MetricCell,
    max: Duration,
    inner: Mutex<TimerInner>,
    changed: Condvar,
}

/// Stopwatch metric with a watchdog.
///
/// `Idle → Started ⇄ Paused → Finished`, with `reset` returning to `Idle`
/// from anywhere. The published value is the accumulated running time in
/// seconds, updated on pause and on finish. While started, a watchdog
/// thread waits for `max`; if the timer is still running then, the
/// watchdog finishes it so waiters on [`wait_finished`](Self::wait_finished)
/// are never stuck.
pub struct TimerMetric {
    shared: Arc<TimerShared>,
}

impl TimerMetric {
    pub fn new(name: impl Into<String>, units: impl Into<String>, desc: impl Into<String>) -> Self {
        Self::bounded(name, units, desc, DEFAULT_TIMER_MAX)
    }

    /// Timer whose watchdog fires after `max` of uninterrupted running.
    pub fn bounded(
        name: impl Into<String>,
        units: impl Into<String>,
        desc: impl Into<String>,
        max: Duration,
    ) -> Self {
        let mut info = MetricInfo::new(name, units, desc);
        info.min_val = 0.0;
        info.max_val = max.as_secs_f64();
        info.higher_is_better = false;
        Self {
            shared: Arc::new(TimerShared {
                cell: MetricCell::new(info),
                max,
                inner: Mutex::new(TimerInner {
                    state: TimerState::Idle,
                    tval: Duration::ZERO,
                    started_at: None,
                    generation: 0,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn state(&self) -> TimerState {
        self.shared.inner.lock().state
    }

    pub fn max(&self) -> Duration {
        self.shared.max
    }

    /// Accumulated time, including the currently running stretch.
    pub fn elapsed(&self) -> Duration {
        let inner = self.shared.inner.lock();
        inner.tval + inner.started_at.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Idle/Paused → Started. False if already started or finished.
    pub fn start(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            TimerState::Idle | TimerState::Paused => {
                inner.started_at = Some(Instant::now());
                inner.state = TimerState::Started;
                self.arm(&mut inner);
                true
            }
            TimerState::Started | TimerState::Finished => false,
        }
    }

    /// Started → Paused. False if not started.
    pub fn pause(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state != TimerState::Started {
            return false;
        }
        self.shared.accumulate(&mut inner);
        inner.state = TimerState::Paused;
        self.shared.disarm(&mut inner);
        self.shared.publish(&inner);
        true
    }

    /// Started/Paused → Finished. False if idle or already finished.
    pub fn end(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        self.shared.finish(&mut inner)
    }

    /// Any state → Idle. Clears accumulated time; the last published value
    /// is kept.
    pub fn reset(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        self.shared.disarm(&mut inner);
        inner.tval = Duration::ZERO;
        inner.started_at = None;
        inner.state = TimerState::Idle;
        true
    }

    /// Block until the timer is finished or `timeout` passes. Returns whether
    /// it finished.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.shared.inner.lock();
        while inner.state != TimerState::Finished {
            match deadline {
                Some(deadline) => {
                    if self.shared.changed.wait_until(&mut inner, deadline).timed_out() {
                        return inner.state == TimerState::Finished;
                    }
                }
                None => self.shared.changed.wait(&mut inner),
            }
        }
        true
    }

    fn arm(&self, inner: &mut TimerInner) {
        inner.generation += 1;
        let generation = inner.generation;
        let deadline = Instant::now().checked_add(self.shared.max);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("{}-watchdog", self.name().replace('\0', "")))
            .spawn(move || shared.watch(generation, deadline));
        if let Err(e) = spawned {
            tracing::warn!(metric = %self.name(), error = %e, "Timer watchdog could not be started");
        }
    }
}

impl TimerShared {
    /// Wait for `deadline`, then finish the timer unless it was disarmed
    /// meanwhile. Without a deadline it only waits to be disarmed.
    fn watch(&self, generation: u64, deadline: Option<Instant>) {
        let mut inner = self.inner.lock();
        loop {
            if inner.generation != generation {
                return;
            }
            match deadline {
                Some(deadline) if Instant::now() >= deadline => break,
                Some(deadline) => {
                    self.changed.wait_until(&mut inner, deadline);
                }
                None => self.changed.wait(&mut inner),
            }
        }
        tracing::warn!(
            metric = %self.cell.info().name,
            max_secs = self.max.as_secs_f64(),
            "Timer exceeded its bound, forcing finish"
        );
        self.finish(&mut inner);
    }

    fn accumulate(&self, inner: &mut TimerInner) {
        if let Some(start) = inner.started_at.take() {
            inner.tval += start.elapsed();
        }
    }

    fn disarm(&self, inner: &mut TimerInner) {
        inner.generation += 1;
        self.changed.notify_all();
    }

    fn finish(&self, inner: &mut TimerInner) -> bool {
        match inner.state {
            TimerState::Started | TimerState::Paused => {
                self.accumulate(inner);
                inner.state = TimerState::Finished;
                self.disarm(inner);
                self.publish(inner);
                true
            }
            TimerState::Idle | TimerState::Finished => false,
        }
    }

    fn publish(&self, inner: &TimerInner) {
        self.cell.set_value(Value::Float(inner.tval.as_secs_f64()));
    }
}

impl Drop for TimerMetric {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        self.shared.disarm(&mut inner);
    }
}

impl fmt::Debug for TimerMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerMetric")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("max", &self.shared.max)
            .finish_non_exhaustive()
    }
}

impl Metric for TimerMetric {
    fn cell(&self) -> &MetricCell {
        &self.shared.cell
    }
}
