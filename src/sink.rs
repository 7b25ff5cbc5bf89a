//! Bounded FIFO between probes and whatever consumes their metrics.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

// ─── Configuration ───────────────────────────────────────────────

/// Capacity of the sink a probe creates when none is supplied.
pub const DEFAULT_SINK_CAPACITY: usize = 1_000_000;

/// How long a probe waits for room before dropping a snapshot.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(1);

// ─── Public types ────────────────────────────────────────────────

/// Multi-producer, multi-consumer bounded queue of serialized snapshots.
///
/// Cloning is cheap; every clone refers to the same queue. Pushes block for
/// at most the given timeout when the queue is full, which gives producers
/// backpressure without unbounded memory growth. Once
/// [`close`](Self::close)d, pushes fail and pops drain what is left. A push
/// already waiting for room when the sink closes still waits out its
/// timeout.
#[derive(Clone)]
pub struct Sink {
    shared: Arc<Shared>,
}

struct Shared {
    capacity: usize,
    tx: Sender<String>,
    rx: Receiver<String>,
    closed: AtomicBool,
}

/// Closes its sink when dropped, so a consumer draining it always ends.
#[derive(Debug)]
#[must_use = "the sink closes as soon as the guard is dropped"]
pub struct CloseGuard(Sink);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

// ─── Sink impl ───────────────────────────────────────────────────

impl Sink {
    /// A sink holding at most `capacity` items (at least one).
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            shared: Arc::new(Shared {
                capacity,
                tx,
                rx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Append `item`, waiting up to `timeout` for room. Returns false if the
    /// wait ran out or the sink is closed; the item is dropped.
    pub fn push(&self, item: String, timeout: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        self.shared.tx.send_timeout(item, timeout).is_ok()
    }

    /// Append without waiting.
    pub fn try_push(&self, item: String) -> bool {
        if self.is_closed() {
            return false;
        }
        self.shared.tx.try_send(item).is_ok()
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive.
    /// `None` on timeout, or at once when the sink is closed and empty.
    pub fn pop(&self, timeout: Duration) -> Option<String> {
        if self.is_closed() {
            return self.try_pop();
        }
        self.shared.rx.recv_timeout(timeout).ok()
    }

    pub fn try_pop(&self) -> Option<String> {
        self.shared.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.shared.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Stop accepting items. Whatever is queued stays poppable.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Guard that closes this sink when it goes out of scope.
    pub fn close_guard(&self) -> CloseGuard {
        CloseGuard(self.clone())
    }

    /// Whether both handles refer to the same queue.
    pub fn same_as(&self, other: &Sink) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Consume items until the sink is closed and empty, writing one item
    /// per line. The writer is flushed whenever the queue runs dry.
    /// Returns the number of lines written.
    pub fn drain_into<W: Write>(&self, writer: &mut W, poll: Duration) -> io::Result<usize> {
        let mut written = 0;
        loop {
            match self.pop(poll) {
                Some(line) => {
                    writeln!(writer, "{line}")?;
                    written += 1;
                    if self.is_empty() {
                        writer.flush()?;
                    }
                }
                None if self.is_closed() => break,
                None => {}
            }
        }
        writer.flush()?;
        Ok(written)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
