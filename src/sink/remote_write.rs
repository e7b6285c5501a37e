//! Prometheus remote-write pusher.
//!
//! Each cycle the pusher drains the processed queue until a deadline, then
//! tries the retry backlog oldest first followed by the batch it just
//! collected. A batch that fails goes back to the tail of the backlog
//! unmodified; a batch that succeeds is gone. Before every cycle the pusher
//! checks that the producer threads are alive and fail-stops if one is not.

use super::{Backlog, PushError, Transport};
use crate::http;
use crate::metric::{Sample, SeriesBatch};
use crate::mpsc::{Receiver, Recv};
use crate::protocols::remote_write::WriteRequest;
use crate::thread::{Stop, Supervisor};
use crate::time;
use std::cmp;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single wait on the processed queue. Bounds how late a collecting
/// pusher notices the stop token.
const RECV_SLICE: Duration = Duration::from_millis(250);

lazy_static! {
    /// Batches delivered.
    pub static ref SINK_PUSH_SUCCESS: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    /// Delivery attempts that failed.
    pub static ref SINK_PUSH_FAILURE: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    /// Samples delivered.
    pub static ref SINK_DELIVERED_SAMPLES: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
}

/// Configuration for `RemoteWrite`.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteWriteConfig {
    /// Length of one collect-and-push cycle.
    pub push_interval: Duration,
    /// Most failed batches kept for retry.
    pub max_retry_batches: usize,
}

impl Default for RemoteWriteConfig {
    fn default() -> RemoteWriteConfig {
        RemoteWriteConfig {
            push_interval: Duration::from_secs(4),
            max_retry_batches: 5,
        }
    }
}

/// What one round of delivery attempts did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Non-empty batches tried.
    pub attempted: usize,
    /// Batches delivered.
    pub delivered: usize,
    /// Batches that failed and went back to the backlog.
    pub failed: usize,
    /// Samples lost to backlog eviction.
    pub evicted: usize,
}

/// The remote-write pusher. Owns the retry backlog.
pub struct RemoteWrite<T> {
    transport: T,
    backlog: Backlog,
    push_interval: Duration,
}

impl RemoteWrite<http::Client> {
    /// Create a pusher delivering over HTTP to `url`.
    pub fn http(url: &str, timeout: Duration, config: RemoteWriteConfig) -> RemoteWrite<http::Client> {
        let client = http::Client::new(url, timeout);
        info!("remote-write endpoint {} with a {:?} timeout", client.url(), timeout);
        RemoteWrite::new(client, config)
    }
}

impl<T: Transport> RemoteWrite<T> {
    /// Create a pusher delivering through `transport`.
    pub fn new(transport: T, config: RemoteWriteConfig) -> RemoteWrite<T> {
        RemoteWrite {
            transport,
            backlog: Backlog::new(config.max_retry_batches),
            push_interval: config.push_interval,
        }
    }

    /// The transport in use.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Copy of the retry backlog, oldest batch first.
    pub fn backlog_snapshot(&self) -> Vec<Vec<Sample>> {
        self.backlog.snapshot()
    }

    /// Number of batches waiting for retry.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Take everything `recv` yields until `deadline`, flattened in arrival
    /// order. Returns early once `stop` is set. A closed queue is waited out
    /// to the deadline so the cycle keeps its length.
    pub fn collect(&self, recv: &Receiver<Vec<Sample>>, deadline: Instant, stop: &Stop) -> Vec<Sample> {
        let mut current = Vec::new();
        loop {
            let left = time::remaining(deadline);
            if left == Duration::from_millis(0) || stop.is_set() {
                break;
            }
            match recv.next_timeout(cmp::min(left, RECV_SLICE)) {
                Recv::Item(batch) => current.extend(batch),
                Recv::Empty => continue,
                Recv::Closed => {
                    stop.sleep(time::remaining(deadline));
                    break;
                }
            }
        }
        current
    }

    /// Try every backlog batch oldest first, then `current`. Failed batches
    /// go back to the backlog in the order they were tried.
    pub fn attempt(&mut self, current: Vec<Sample>) -> CycleReport {
        let mut report = CycleReport::default();
        let mut batches = self.backlog.drain();
        if !current.is_empty() {
            batches.push(current);
        }
        for batch in batches {
            if batch.is_empty() {
                continue;
            }
            report.attempted += 1;
            match self.deliver(&batch) {
                Ok(()) => {
                    report.delivered += 1;
                    SINK_PUSH_SUCCESS.fetch_add(1, Ordering::Relaxed);
                    SINK_DELIVERED_SAMPLES.fetch_add(batch.len(), Ordering::Relaxed);
                }
                Err(e) => {
                    report.failed += 1;
                    SINK_PUSH_FAILURE.fetch_add(1, Ordering::Relaxed);
                    warn!("push of {} samples failed, keeping for retry: {}", batch.len(), e);
                    report.evicted += self.backlog.push(batch);
                }
            }
        }
        if report.attempted > 0 {
            info!(
                "push cycle: {} delivered, {} failed, {} batches waiting",
                report.delivered,
                report.failed,
                self.backlog.len()
            );
        }
        report
    }

    fn deliver(&mut self, batch: &[Sample]) -> Result<(), PushError> {
        let grouped = SeriesBatch::from_samples(batch);
        let body = WriteRequest::from_batch(&grouped).encode()?;
        self.transport.post(&body)?;
        debug!(
            "pushed {} samples in {} series ({} bytes)",
            grouped.sample_count(),
            grouped.series_count(),
            body.len()
        );
        Ok(())
    }

    /// Run push cycles until stopped or a producer dies, then shut the
    /// producers down. Whatever is still in the backlog is discarded.
    pub fn run(&mut self, recv: Receiver<Vec<Sample>>, supervisor: Supervisor) {
        info!(
            "remote-write pusher started; pushing every {:?}, keeping up to {} retry batches, watching {:?}",
            self.push_interval,
            self.backlog.capacity(),
            supervisor.worker_names()
        );
        while supervisor.check() {
            let deadline = Instant::now() + self.push_interval;
            let current = self.collect(&recv, deadline, supervisor.stop());
            self.attempt(current);
        }
        if !self.backlog.is_empty() {
            warn!(
                "discarding {} unsent samples in {} retry batches",
                self.backlog.sample_count(),
                self.backlog.len()
            );
        }
        supervisor.shutdown();
        info!("remote-write pusher stopped");
    }
}
