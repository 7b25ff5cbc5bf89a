use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::Level;

use super::{ProbeStatus, Shared};
use crate::collector::Collector;
use crate::config::ProbeConfig;
use crate::error::CollectionError;
use crate::metrics::Metric;

// ─── Worker loop ─────────────────────────────────────────────────

/// Body of the probe's dedicated thread. Runs until the probe is
/// terminated, then cleans up the collector.
pub(super) fn run(shared: Arc<Shared>, mut collector: Box<dyn Collector>) {
    tracing::debug!(probe = %shared.name, "Worker started");

    loop {
        match shared.status() {
            ProbeStatus::Terminated => break,
            ProbeStatus::Active if shared.gate.is_open() => cycle(&shared, collector.as_mut()),
            _ => shared.gate.wait_open(&shared.status),
        }
    }

    if panic::catch_unwind(AssertUnwindSafe(|| collector.cleanup())).is_err() {
        tracing::error!(probe = %shared.name, "Collector cleanup panicked");
    }
    tracing::debug!(probe = %shared.name, cycles = shared.cycles.load(Ordering::Acquire), "Worker exited");
    shared.mark_exited();
}

/// One collection cycle, including the sleep that follows it.
fn cycle(shared: &Shared, collector: &mut dyn Collector) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| collector.collect()))
        .unwrap_or_else(|payload| Err(CollectionError::Panicked(panic_message(payload.as_ref()))));
    let config = shared.config.read().clone();

    match result {
        Ok(()) => {
            shared.errors.store(0, Ordering::Release);
            publish(shared, &config);

            let cycles = shared.cycles.fetch_add(1, Ordering::AcqRel) + 1;
            if config.max_cycles.is_some_and(|max| cycles >= max) {
                tracing::info!(probe = %shared.name, cycles, "Cycle limit reached");
                shared.log(Level::INFO, "Cycle limit reached");
                shared.terminate();
                return;
            }
            shared.gate.sleep(config.periodicity, &shared.status);
        }
        Err(e) => {
            let errors = shared.errors.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::error!(probe = %shared.name, error = %e, consecutive = errors, "Collection failed");
            shared.log(
                Level::ERROR,
                &format!("CRITICAL data collection FAILED with error: {e}"),
            );

            if errors > config.max_consecutive_errors {
                tracing::error!(
                    probe = %shared.name,
                    max = config.max_consecutive_errors,
                    "Too many consecutive errors, terminating"
                );
                shared.log(Level::ERROR, "TERMINATING due to too many ERRORS");
                shared.terminate();
            } else {
                shared.gate.sleep(config.backoff(errors), &shared.status);
            }
        }
    }
}

/// Push a snapshot of every registered metric onto the attached sink.
/// Snapshots that do not fit within the push timeout are dropped.
fn publish(shared: &Shared, config: &ProbeConfig) {
    let metrics: Vec<Arc<dyn Metric>> = shared.metrics.read().values().cloned().collect();
    let sink = shared.sink.read().clone();

    for metric in metrics {
        let snapshot = metric.snapshot();
        if config.debug {
            tracing::debug!(probe = %shared.name, metric = %snapshot, "Collected");
        }

        let Some(sink) = sink.as_ref() else {
            continue;
        };
        let line = match snapshot.to_json() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(probe = %shared.name, metric = %snapshot.name, error = %e, "Failed to serialize metric");
                continue;
            }
        };
        if !sink.push(line, config.push_timeout) {
            tracing::warn!(
                probe = %shared.name,
                metric = %snapshot.name,
                timeout_ms = config.push_timeout.as_millis() as u64,
                "Sink full, snapshot dropped"
            );
            shared.log(
                Level::WARN,
                &format!("Sink full, dropped snapshot of '{}'", snapshot.name),
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
