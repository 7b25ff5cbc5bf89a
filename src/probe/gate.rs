use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::status::{AtomicStatus, ProbeStatus};

/// Activation gate: a flag plus a condition variable.
///
/// The worker parks here while its probe is inactive and sleeps here
/// between cycles. Status changes are made while holding the gate lock, so
/// a worker that checked the status under the lock cannot miss the wakeup.
#[derive(Debug)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub(crate) fn closed() -> Self {
        Self {
            open: Mutex::new(false),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, bool> {
        self.open.lock()
    }

    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Block until the gate opens or the probe is terminated.
    pub(crate) fn wait_open(&self, status: &AtomicStatus) {
        let mut open = self.open.lock();
        while !*open && status.load() != ProbeStatus::Terminated {
            self.changed.wait(&mut open);
        }
    }

    /// Sleep for `duration`, returning early if the probe is terminated.
    /// A duration past the clock's range sleeps until termination.
    pub(crate) fn sleep(&self, duration: Duration, status: &AtomicStatus) {
        let deadline = Instant::now().checked_add(duration);
        let mut open = self.open.lock();
        while status.load() != ProbeStatus::Terminated {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut open, deadline).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut open),
            }
        }
    }
}
