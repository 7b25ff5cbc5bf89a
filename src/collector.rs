//! The contract a concrete probe implements.

use std::sync::Arc;

use crate::error::CollectionError;
use crate::metrics::Metric;

/// Pluggable measurement logic driven by a [`Probe`](crate::Probe).
///
/// The probe moves its collector onto the worker thread on first
/// activation, so `collect` and `cleanup` always run there and may take
/// `&mut self`.
///
/// # Errors
///
/// `collect` returns [`CollectionError`] when the source is unavailable or
/// produced data the metrics reject. Metric faults convert with `?`. The
/// probe retries with backoff and terminates after too many failures in a
/// row.
pub trait Collector: Send + 'static {
    /// Static description provided by the collector author.
    fn description(&self) -> &str {
        "The developer of this probe didn't provide a description"
    }

    /// Metric handles to register with the owning probe. Called once, when
    /// the probe is built.
    fn metrics(&self) -> Vec<Arc<dyn Metric>>;

    /// Perform one collection cycle, updating the registered metrics.
    fn collect(&mut self) -> Result<(), CollectionError>;

    /// Called exactly once when the owning probe terminates.
    fn cleanup(&mut self) {}
}
