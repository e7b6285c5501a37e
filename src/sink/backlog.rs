//! The retry backlog of failed batches.

use crate::metric::Sample;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

lazy_static! {
    /// Samples permanently lost to backlog eviction.
    pub static ref BACKLOG_EVICTED_SAMPLES: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
}

/// FIFO of batches whose push failed, oldest first.
///
/// Holds at most `capacity` batches. Adding to a full backlog evicts from the
/// head, the evicted samples are gone for good. Batches are kept exactly as
/// they were handed in.
#[derive(Clone, Debug)]
pub struct Backlog {
    batches: VecDeque<Vec<Sample>>,
    capacity: usize,
}

impl Backlog {
    /// Create an empty backlog holding at most `capacity` batches.
    pub fn new(capacity: usize) -> Backlog {
        Backlog {
            batches: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `batch` at the tail, then evict from the head while over
    /// capacity. Returns the number of samples evicted.
    pub fn push(&mut self, batch: Vec<Sample>) -> usize {
        self.batches.push_back(batch);
        let mut evicted = 0;
        while self.batches.len() > self.capacity {
            if let Some(old) = self.batches.pop_front() {
                warn!(
                    "retry backlog over {} batches; dropping oldest batch of {} samples",
                    self.capacity,
                    old.len()
                );
                evicted += old.len();
            }
        }
        if evicted > 0 {
            BACKLOG_EVICTED_SAMPLES.fetch_add(evicted, Ordering::Relaxed);
        }
        evicted
    }

    /// Take every batch out, oldest first.
    pub fn drain(&mut self) -> Vec<Vec<Sample>> {
        self.batches.drain(..).collect()
    }

    /// Copy of the current batches, oldest first.
    pub fn snapshot(&self) -> Vec<Vec<Sample>> {
        self.batches.iter().cloned().collect()
    }

    /// Number of batches held.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether no batch is held.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Most batches ever held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples over all held batches.
    pub fn sample_count(&self) -> usize {
        self.batches.iter().map(|b| b.len()).sum()
    }
}
