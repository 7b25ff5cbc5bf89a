//! Probe engine: owns a collector, runs it on a dedicated worker thread,
//! and exposes the activation state machine to a controller.
//!
//! ```rust,no_run
//! use probe_agent::{Probe, RandomProbe};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let probe = Probe::new("dice", RandomProbe::new());
//! let sink = probe.attach_sink(None);
//! probe.activate()?;
//! while let Some(line) = sink.pop(std::time::Duration::from_secs(10)) {
//!     println!("{line}");
//! }
//! # Ok(())
//! # }
//! ```

mod gate;
mod status;
mod worker;

pub use status::{ProbeStatus, Transition};

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::Level;
use uuid::Uuid;

use crate::collector::Collector;
use crate::config::ProbeConfig;
use crate::error::{ConfigError, ProbeError};
use crate::logfile::ProbeLog;
use crate::metrics::{Metric, MetricSnapshot};
use crate::sink::Sink;

use gate::Gate;
use status::AtomicStatus;

// ─── Public types ────────────────────────────────────────────────

/// Controller handle for one probe.
///
/// Dropping the handle terminates the probe; the worker finishes its
/// current cycle, runs the collector's cleanup and exits on its own.
pub struct Probe {
    shared: Arc<Shared>,
    worker: Mutex<WorkerSlot>,
}

/// Entry point handed to the thread that becomes the worker.
type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// Collector before the first activation, join handle after.
struct WorkerSlot {
    collector: Option<Box<dyn Collector>>,
    handle: Option<JoinHandle<()>>,
}

// ─── State shared with the worker ────────────────────────────────

pub(crate) struct Shared {
    id: Uuid,
    name: String,
    description: String,
    config: RwLock<ProbeConfig>,
    status: AtomicStatus,
    gate: Gate,
    metrics: RwLock<HashMap<String, Arc<dyn Metric>>>,
    errors: AtomicU32,
    cycles: AtomicU64,
    sink: RwLock<Option<Sink>>,
    log: RwLock<Option<ProbeLog>>,
    exited: Mutex<bool>,
    exit_signal: Condvar,
}

impl Shared {
    fn status(&self) -> ProbeStatus {
        self.status.load()
    }

    /// Apply a transition, updating status and gate together. Returns
    /// whether the status changed.
    fn transition(&self, transition: Transition) -> Result<bool, ProbeError> {
        let mut open = self.gate.lock();
        let from = self.status.load();
        let to = from
            .next(transition)
            .ok_or_else(|| ProbeError::InvalidStatusTransition {
                probe: self.name.clone(),
                from,
                to: transition.target(),
            })?;
        if from == to {
            return Ok(false);
        }

        self.status.store(to);
        *open = to != ProbeStatus::Inactive;
        self.gate.notify();
        Ok(true)
    }

    /// Terminate from any thread. Idempotent.
    fn terminate(&self) {
        match self.transition(Transition::Terminate) {
            Ok(true) => {
                tracing::info!(probe = %self.name, "Data collection terminated");
                self.log(Level::INFO, "Data collection TERMINATED");
            }
            Ok(false) => {}
            Err(e) => tracing::error!(probe = %self.name, error = %e, "Terminate rejected"),
        }
    }

    /// Write to the probe log, if one is enabled.
    fn log(&self, level: Level, msg: &str) {
        if let Some(log) = self.log.read().as_ref() {
            log.write(level, msg);
        }
    }

    fn mark_exited(&self) {
        *self.exited.lock() = true;
        self.exit_signal.notify_all();
    }
}

// ─── Probe impl ──────────────────────────────────────────────────

impl Probe {
    /// Build an inactive probe with the default configuration.
    pub fn new(name: impl Into<String>, collector: impl Collector) -> Self {
        Self::build(name.into(), Box::new(collector), ProbeConfig::default())
    }

    /// Build an inactive probe with a validated configuration.
    pub fn with_config(
        name: impl Into<String>,
        collector: impl Collector,
        config: ProbeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(name.into(), Box::new(collector), config))
    }

    /// Same as [`with_config`](Self::with_config) for an already boxed
    /// collector.
    pub fn from_boxed(
        name: impl Into<String>,
        collector: Box<dyn Collector>,
        config: ProbeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(name.into(), collector, config))
    }

    fn build(name: String, collector: Box<dyn Collector>, config: ProbeConfig) -> Self {
        let probe = Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                description: collector.description().to_owned(),
                name,
                config: RwLock::new(config),
                status: AtomicStatus::new(ProbeStatus::Inactive),
                gate: Gate::closed(),
                metrics: RwLock::new(HashMap::new()),
                errors: AtomicU32::new(0),
                cycles: AtomicU64::new(0),
                sink: RwLock::new(None),
                log: RwLock::new(None),
                exited: Mutex::new(false),
                exit_signal: Condvar::new(),
            }),
            worker: Mutex::new(WorkerSlot {
                collector: None,
                handle: None,
            }),
        };
        for metric in collector.metrics() {
            probe.add_metric(metric);
        }
        probe.worker.lock().collector = Some(collector);
        probe
    }

    // ── Identity ────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn description(&self) -> &str {
        &self.shared.description
    }

    pub fn status(&self) -> ProbeStatus {
        self.shared.status()
    }

    pub fn config(&self) -> ProbeConfig {
        self.shared.config.read().clone()
    }

    pub fn periodicity(&self) -> Duration {
        self.shared.config.read().periodicity
    }

    /// Takes effect from the next sleep. Zero is ignored.
    pub fn set_periodicity(&self, periodicity: Duration) {
        if periodicity.is_zero() {
            tracing::warn!(probe = %self.name(), "Ignoring zero periodicity");
            return;
        }
        self.shared.config.write().periodicity = periodicity;
    }

    pub fn set_debug(&self, debug: bool) {
        self.shared.config.write().debug = debug;
    }

    // ── Metrics ─────────────────────────────────────────────────

    /// Register a metric under its name, replacing any metric with the
    /// same name. The metric's group becomes this probe's name.
    pub fn add_metric(&self, metric: Arc<dyn Metric>) {
        metric.set_group(&self.shared.name);
        let name = metric.name().to_owned();
        if self.shared.metrics.write().insert(name.clone(), metric).is_some() {
            tracing::warn!(probe = %self.name(), metric = %name, "Replaced metric with duplicate name");
        }
    }

    pub fn metric(&self, name: &str) -> Option<Arc<dyn Metric>> {
        self.shared.metrics.read().get(name).cloned()
    }

    /// Every registered metric handle, in name order.
    pub fn metrics(&self) -> Vec<Arc<dyn Metric>> {
        let mut metrics: Vec<Arc<dyn Metric>> =
            self.shared.metrics.read().values().cloned().collect();
        metrics.sort_by(|a, b| a.name().cmp(b.name()));
        metrics
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.metrics.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Current snapshot of every registered metric, sorted by name. Works
    /// with or without an attached sink.
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        let mut snaps: Vec<MetricSnapshot> = self
            .shared
            .metrics
            .read()
            .values()
            .map(|m| m.snapshot())
            .collect();
        snaps.sort_by(|a, b| a.name.cmp(&b.name));
        snaps
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.shared.errors.load(Ordering::Acquire)
    }

    /// Successful collection cycles so far.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Acquire)
    }

    // ── Sink attachment ─────────────────────────────────────────

    /// Attach `sink`, or a new sink of the configured capacity when `None`.
    /// Returns the attached sink.
    pub fn attach_sink(&self, sink: Option<Sink>) -> Sink {
        let sink = sink.unwrap_or_else(|| Sink::bounded(self.shared.config.read().sink_capacity));
        *self.shared.sink.write() = Some(sink.clone());
        tracing::debug!(probe = %self.name(), capacity = sink.capacity(), "Sink attached");
        self.shared.log(Level::INFO, "Sink attached to Probe");
        sink
    }

    /// Stop delivering snapshots. Metrics keep being collected.
    pub fn detach_sink(&self) -> Option<Sink> {
        let old = self.shared.sink.write().take();
        if old.is_some() {
            tracing::debug!(probe = %self.name(), "Sink detached");
            self.shared.log(Level::INFO, "Sink detached from Probe");
        }
        old
    }

    pub fn sink(&self) -> Option<Sink> {
        self.shared.sink.read().clone()
    }

    // ── Logging ─────────────────────────────────────────────────

    /// Turn on the rotating probe log under `<dir>/logs/<name>/`. `dir`
    /// defaults to the configured `log_dir`, then to the current directory.
    ///
    /// # Errors
    ///
    /// [`ProbeError::LoggingInit`] if the directory or file cannot be
    /// created. The probe keeps working without a log file.
    pub fn enable_logging(&self, dir: Option<&Path>) -> Result<PathBuf, ProbeError> {
        let dir = match dir {
            Some(d) => d.to_path_buf(),
            None => self
                .shared
                .config
                .read()
                .log_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        match ProbeLog::open(&dir, &self.shared.name) {
            Ok(log) => {
                let path = log.path();
                *self.shared.log.write() = Some(log);
                tracing::info!(probe = %self.name(), path = %path.display(), "Probe logging enabled");
                Ok(path)
            }
            Err(e) => {
                *self.shared.log.write() = None;
                tracing::warn!(probe = %self.name(), error = %e, "Probe logging disabled");
                Err(e)
            }
        }
    }

    pub fn disable_logging(&self) {
        *self.shared.log.write() = None;
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.shared.log.read().as_ref().map(|l| l.path())
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Start (first call) or resume data collection.
    ///
    /// # Errors
    ///
    /// [`ProbeError::InvalidStatusTransition`] once terminated,
    /// [`ProbeError::Spawn`] if the worker thread cannot be created.
    pub fn activate(&self) -> Result<(), ProbeError> {
        let mut slot = self.worker.lock();

        if self.status() == ProbeStatus::Terminated {
            return Err(ProbeError::InvalidStatusTransition {
                probe: self.shared.name.clone(),
                from: ProbeStatus::Terminated,
                to: ProbeStatus::Active,
            });
        }

        if slot.handle.is_none() {
            if let Some(collector) = slot.collector.take() {
                let name = self.shared.name.replace('\0', "");
                let handle = self.launch(collector, |body| thread::Builder::new().name(name).spawn(body))?;
                slot.handle = Some(handle);
            }
        }

        if self.shared.transition(Transition::Activate)? {
            tracing::info!(probe = %self.name(), "Data collection activated");
            self.shared.log(Level::INFO, "Data collection ACTIVATED");
        }
        Ok(())
    }

    /// Pause data collection without stopping the worker.
    pub fn deactivate(&self) -> Result<(), ProbeError> {
        if self.shared.transition(Transition::Deactivate)? {
            tracing::info!(probe = %self.name(), "Data collection deactivated");
            self.shared.log(Level::INFO, "Data collection DEACTIVATED");
        }
        Ok(())
    }

    /// Stop the probe for good. An in-flight collection is not
    /// interrupted; no further cycle starts. Calling it again is a no-op.
    pub fn terminate(&self) {
        self.shared.terminate();

        // Never activated: no worker will run cleanup, so do it here.
        let never_started = self.worker.lock().collector.take();
        if let Some(mut collector) = never_started {
            collector.cleanup();
            tracing::debug!(probe = %self.name(), "Collector cleaned up");
            self.shared.mark_exited();
        }
    }

    /// Wait up to `timeout` for the worker to exit after termination.
    /// Returns whether it has exited.
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        {
            let mut exited = self.shared.exited.lock();
            while !*exited {
                match deadline {
                    Some(deadline) => {
                        if self.shared.exit_signal.wait_until(&mut exited, deadline).timed_out() {
                            if !*exited {
                                return false;
                            }
                            break;
                        }
                    }
                    None => self.shared.exit_signal.wait(&mut exited),
                }
            }
        }

        if let Some(handle) = self.worker.lock().handle.take() {
            if handle.join().is_err() {
                tracing::error!(probe = %self.name(), "Worker thread panicked");
            }
        }
        true
    }

    /// Id of the worker thread, once spawned.
    pub fn worker_thread(&self) -> Option<ThreadId> {
        self.worker.lock().handle.as_ref().map(|h| h.thread().id())
    }

    /// Move `collector` onto a worker started by `spawn`. If no thread can
    /// be started the collector is cleaned up here and the probe
    /// terminates, so it never reports Active without a worker.
    fn launch<F>(&self, collector: Box<dyn Collector>, spawn: F) -> Result<JoinHandle<()>, ProbeError>
    where
        F: FnOnce(WorkerBody) -> io::Result<JoinHandle<()>>,
    {
        let handoff = Arc::new(Mutex::new(Some(collector)));
        let body: WorkerBody = {
            let shared = Arc::clone(&self.shared);
            let handoff = Arc::clone(&handoff);
            Box::new(move || {
                let collector = handoff.lock().take();
                if let Some(collector) = collector {
                    worker::run(shared, collector);
                }
            })
        };

        spawn(body).map_err(|source| {
            tracing::error!(probe = %self.name(), error = %source, "Failed to start worker");
            self.shared.terminate();
            let stranded = handoff.lock().take();
            if let Some(mut collector) = stranded {
                collector.cleanup();
            }
            self.shared.mark_exited();
            ProbeError::Spawn {
                probe: self.shared.name.clone(),
                source,
            }
        })
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("status", &self.status())
            .field("metrics", &self.metric_names())
            .finish_non_exhaustive()
    }
}
