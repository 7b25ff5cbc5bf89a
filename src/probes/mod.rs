//! Bundled collectors.
//!
//! These are ordinary [`Collector`](crate::Collector) implementations with
//! no access to engine internals; they double as examples for writing new
//! probes.

pub mod process;
pub mod random;

pub use process::ProcessProbe;
pub use random::RandomProbe;
