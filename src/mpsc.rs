//! bounded multi-producer, single-consumer
//!
//! The pipeline's queues. Each is a fixed-capacity FIFO built on
//! `crossbeam_channel::bounded`. Neither side ever blocks without limit:
//!
//!  * `Sender::offer` waits at most the sender's timeout for room. If the queue
//!    is still full the item is dropped, a warning is logged and the queue's
//!    drop counter is bumped. This is the pipeline's only backpressure.
//!  * `Receiver::next_timeout` waits at most the given timeout so the caller
//!    can look at its stop token while the queue is idle.
//!
//! Queued items live in memory only.

use crossbeam_channel::{self, RecvTimeoutError, SendTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long `offer` waits for room unless told otherwise.
pub const DEFAULT_OFFER_TIMEOUT: Duration = Duration::from_secs(1);

lazy_static! {
    /// Total items dropped on the floor by all queues.
    pub static ref QUEUE_DROPS: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
}

/// Create a (Sender, Receiver) pair for a queue named `name` holding at most
/// `capacity` items.
///
/// The name shows up in every drop warning. A capacity of zero is bumped to
/// one, a rendezvous queue would turn every offer into a handoff wait.
pub fn channel<T>(name: &str, capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (snd, rcv) = crossbeam_channel::bounded(capacity.max(1));
    let name: Arc<str> = Arc::from(name);
    let sender = Sender {
        name: Arc::clone(&name),
        inner: snd,
        timeout: DEFAULT_OFFER_TIMEOUT,
        dropped: Arc::new(AtomicUsize::new(0)),
    };
    let receiver = Receiver { name, inner: rcv };
    (sender, receiver)
}

/// The sending side of a queue. Clones share the drop counter.
#[derive(Debug)]
pub struct Sender<T> {
    name: Arc<str>,
    inner: crossbeam_channel::Sender<T>,
    timeout: Duration,
    dropped: Arc<AtomicUsize>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Sender<T> {
        Sender {
            name: Arc::clone(&self.name),
            inner: self.inner.clone(),
            timeout: self.timeout,
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> Sender<T> {
    /// Set how long `offer` waits for room.
    pub fn with_timeout(mut self, timeout: Duration) -> Sender<T> {
        self.timeout = timeout;
        self
    }

    /// Put `item` on the queue, waiting at most the sender's timeout for
    /// room. Returns whether the item was queued.
    pub fn offer(&self, item: T) -> bool {
        match self.inner.send_timeout(item, self.timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                self.count_drop();
                warn!("{} queue full; dropping item", self.name);
                false
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                self.count_drop();
                warn!("{} queue has no receiver; dropping item", self.name);
                false
            }
        }
    }

    fn count_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        QUEUE_DROPS.fetch_add(1, Ordering::Relaxed);
    }

    /// Items this queue has dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// How long `offer` waits for room.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Outcome of a timed receive.
#[derive(Debug, PartialEq)]
pub enum Recv<T> {
    /// An item arrived.
    Item(T),
    /// Nothing arrived before the timeout.
    Empty,
    /// Every sender is gone and the queue is drained.
    Closed,
}

/// The receiving side of a queue.
#[derive(Debug)]
pub struct Receiver<T> {
    name: Arc<str>,
    inner: crossbeam_channel::Receiver<T>,
}

impl<T> Receiver<T> {
    /// Wait at most `timeout` for the next item.
    pub fn next_timeout(&self, timeout: Duration) -> Recv<T> {
        match self.inner.recv_timeout(timeout) {
            Ok(item) => Recv::Item(item),
            Err(RecvTimeoutError::Timeout) => Recv::Empty,
            Err(RecvTimeoutError::Disconnected) => Recv::Closed,
        }
    }

    /// Take the next item if one is ready.
    pub fn try_next(&self) -> Option<T> {
        self.inner.try_recv().ok()
    }

    /// The queue's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue is empty right now.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
