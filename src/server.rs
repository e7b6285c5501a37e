//! Pipeline assembly.
//!
//! Wires a collector and the normalizer to their queues and starts them on
//! their own threads. What comes out is the processed queue's receiving end
//! and the `Supervisor` over both threads, which the pusher takes over.

use crate::config::Args;
use crate::filter::{Filter, Normalizer};
use crate::metric::Sample;
use crate::mpsc;
use crate::sink::{RemoteWrite, Transport};
use crate::source::Collector;
use crate::thread::{self, Stop, Supervisor};
use std::io;

/// Name of the collector's thread.
pub const COLLECTOR_THREAD: &str = "collector";
/// Name of the normalizer's thread.
pub const NORMALIZER_THREAD: &str = "normalizer";

/// The running producer half of the pipeline.
#[derive(Debug)]
pub struct Pipeline {
    /// Batches of normalized samples, ready to push.
    pub processed: mpsc::Receiver<Vec<Sample>>,
    /// Liveness and stop control over the producer threads.
    pub supervisor: Supervisor,
}

impl Pipeline {
    /// Create both queues and start `collector` and the normalizer.
    pub fn start<C>(args: &Args, collector: C) -> io::Result<Pipeline>
    where
        C: Collector + Send + 'static,
    {
        let stop = Stop::new();
        let mut supervisor = Supervisor::new(stop.clone());
        let (raw_snd, raw_rcv) = mpsc::channel("raw", args.raw_queue_capacity);
        let (proc_snd, proc_rcv) = mpsc::channel("processed", args.processed_queue_capacity);

        let interval = args.scrape_interval;
        let mut collector = collector;
        let worker = thread::spawn(COLLECTOR_THREAD, &stop, move |s| {
            collector.run(interval, raw_snd, s)
        })?;
        supervisor.watch(worker);

        let mut normalizer = Normalizer::new(args.normalizer.clone());
        match thread::spawn(NORMALIZER_THREAD, &stop, move |s| {
            normalizer.run(raw_rcv, proc_snd, s)
        }) {
            Ok(worker) => supervisor.watch(worker),
            Err(e) => {
                supervisor.shutdown();
                return Err(e);
            }
        }

        Ok(Pipeline {
            processed: proc_rcv,
            supervisor,
        })
    }

    /// The pipeline's stop token.
    pub fn stop(&self) -> Stop {
        self.supervisor.stop().clone()
    }

    /// Hand the pipeline to `pusher` and run it until stopped. Returns once
    /// every thread has been joined.
    pub fn push_with<T: Transport>(self, pusher: &mut RemoteWrite<T>) {
        pusher.run(self.processed, self.supervisor)
    }
}
