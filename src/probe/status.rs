use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::ProbeError;

/// Lifecycle status of a probe.
///
/// `Inactive ⇄ Active`, either of them `→ Terminated`, which is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProbeStatus {
    Inactive = 0,
    Active = 1,
    Terminated = 2,
}

/// A controller request against the status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activate,
    Deactivate,
    Terminate,
}

impl Transition {
    /// Status the request asks for.
    pub fn target(self) -> ProbeStatus {
        match self {
            Self::Activate => ProbeStatus::Active,
            Self::Deactivate => ProbeStatus::Inactive,
            Self::Terminate => ProbeStatus::Terminated,
        }
    }
}

impl ProbeStatus {
    /// Status after applying `transition`, or `None` when the transition is
    /// not defined from `self`. Requests for the current status are
    /// accepted and leave it unchanged.
    pub fn next(self, transition: Transition) -> Option<ProbeStatus> {
        use ProbeStatus::*;
        use Transition::*;

        match (self, transition) {
            (Inactive | Active, Activate) => Some(Active),
            (Inactive | Active, Deactivate) => Some(Inactive),
            (_, Terminate) => Some(Terminated),
            (Terminated, Activate | Deactivate) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Active => "ACTIVE",
            Self::Terminated => "TERMINATED",
        }
    }
}

impl TryFrom<u8> for ProbeStatus {
    type Error = ProbeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Inactive),
            1 => Ok(Self::Active),
            2 => Ok(Self::Terminated),
            other => Err(ProbeError::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status shared between controller and worker. The worker reads it
/// without locking; writes happen under the gate lock.
#[derive(Debug)]
pub(crate) struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub(crate) fn new(status: ProbeStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub(crate) fn load(&self) -> ProbeStatus {
        // Only valid codes are ever stored; anything else stops the worker.
        ProbeStatus::try_from(self.0.load(Ordering::Acquire)).unwrap_or(ProbeStatus::Terminated)
    }

    pub(crate) fn store(&self, status: ProbeStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}
