//! Collectors: the producers at the head of the pipeline.
//!
//! A `Collector` knows how to take one reading of its source. The provided
//! `run` drives it at a fixed cadence, compensating for the time each scrape
//! takes, and offers every record onto the raw queue. A failed scrape costs
//! one tick and nothing more.

use crate::metric::RawRecord;
use crate::mpsc;
use crate::thread::Stop;
use std::cmp;
use std::error;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod command;
mod null;

pub use self::command::{Command, CommandConfig};
pub use self::null::Null;

lazy_static! {
    /// Records produced by all collectors.
    pub static ref SOURCE_RECORDS: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    /// Failed scrapes over all collectors.
    pub static ref SOURCE_SCRAPE_ERRORS: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
}

/// Why a scrape produced no record.
#[derive(Debug)]
pub enum ScrapeError {
    /// The source had nothing to report this tick.
    NoData,
    /// Talking to the source failed.
    Io(io::Error),
    /// The source ran but reported failure.
    Failed(String),
    /// The source's output was not JSON.
    Json(serde_json::Error),
    /// The source's output was JSON but not an object.
    NotAnObject,
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ScrapeError::NoData => write!(f, "no data"),
            ScrapeError::Io(ref e) => write!(f, "io error: {}", e),
            ScrapeError::Failed(ref msg) => write!(f, "source failed: {}", msg),
            ScrapeError::Json(ref e) => write!(f, "malformed output: {}", e),
            ScrapeError::NotAnObject => write!(f, "output is not a JSON object"),
        }
    }
}

impl error::Error for ScrapeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            ScrapeError::Io(ref e) => Some(e),
            ScrapeError::Json(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ScrapeError {
    fn from(e: io::Error) -> ScrapeError {
        ScrapeError::Io(e)
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(e: serde_json::Error) -> ScrapeError {
        ScrapeError::Json(e)
    }
}

/// A source of raw measurement records.
pub trait Collector {
    /// The collector's name, used in diagnostics.
    fn name(&self) -> &str;

    /// Take one reading.
    fn scrape(&mut self) -> Result<RawRecord, ScrapeError>;

    /// Scrape once per `interval` until `stop` is set, offering each record
    /// onto `chan`. The time a scrape takes is subtracted from the following
    /// sleep; a scrape that overruns the interval is followed immediately by
    /// the next one. A full queue is waited on for at most one interval.
    fn run(&mut self, interval: Duration, chan: mpsc::Sender<RawRecord>, stop: Stop) {
        let chan = {
            let wait = cmp::min(interval, chan.timeout());
            chan.with_timeout(wait)
        };
        info!("{} collector started; scraping every {:?}", self.name(), interval);
        while !stop.is_set() {
            let start = Instant::now();
            match self.scrape() {
                Ok(record) => {
                    SOURCE_RECORDS.fetch_add(1, Ordering::Relaxed);
                    chan.offer(record);
                }
                Err(ScrapeError::NoData) => {
                    trace!("{} had no data", self.name());
                }
                Err(e) => {
                    SOURCE_SCRAPE_ERRORS.fetch_add(1, Ordering::Relaxed);
                    warn!("{} scrape failed: {}", self.name(), e);
                }
            }
            let elapsed = start.elapsed();
            if elapsed < interval && stop.sleep(interval - elapsed) {
                break;
            }
        }
        info!("{} collector stopped", self.name());
    }
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn scrape(&mut self) -> Result<RawRecord, ScrapeError> {
        (**self).scrape()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpsc::Recv;
    use crate::thread;
    use serde_json::json;

    /// Counts its scrapes, failing every other one.
    struct Flaky {
        n: u64,
    }

    impl Collector for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn scrape(&mut self) -> Result<RawRecord, ScrapeError> {
            self.n += 1;
            if self.n % 2 == 0 {
                Err(ScrapeError::Failed("even tick".to_string()))
            } else {
                Ok(RawRecord::from_value(json!({"n": self.n})).unwrap())
            }
        }
    }

    #[test]
    fn run_skips_failed_ticks() {
        let (snd, rcv) = mpsc::channel("raw", 16);
        let stop = Stop::new();
        let handle = thread::spawn("flaky", &stop, move |s| {
            Flaky { n: 0 }.run(Duration::from_millis(5), snd, s)
        })
        .unwrap();

        let mut got = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while got.len() < 3 && Instant::now() < deadline {
            if let Recv::Item(rec) = rcv.next_timeout(Duration::from_millis(50)) {
                let rec: RawRecord = rec;
                got.push(rec.get("n").and_then(|v| v.as_u64()).unwrap());
            }
        }
        stop.set();
        handle.join();
        assert_eq!(vec![1, 3, 5], got);
    }

    #[test]
    fn run_honors_stop_within_one_interval() {
        let (snd, _rcv) = mpsc::channel("raw", 1024);
        let stop = Stop::new();
        let handle = thread::spawn("slow", &stop, move |s| {
            Flaky { n: 0 }.run(Duration::from_millis(200), snd, s)
        })
        .unwrap();
        ::std::thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        stop.set();
        handle.join();
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn run_honors_stop_with_full_queue() {
        let interval = Duration::from_millis(10);
        let (snd, rcv) = mpsc::channel("raw", 1);
        let stop = Stop::new();
        let handle = thread::spawn("saturated", &stop, move |s| {
            Flaky { n: 0 }.run(interval, snd, s)
        })
        .unwrap();

        // Nobody reads, so after the first record every offer waits on a
        // full queue.
        ::std::thread::sleep(Duration::from_millis(100));
        assert_eq!(1, rcv.len());
        let start = Instant::now();
        stop.set();
        handle.join();
        assert!(start.elapsed() < interval * 5, "took {:?}", start.elapsed());
    }

    #[test]
    fn boxed_collector_delegates() {
        let mut boxed: Box<dyn Collector + Send> = Box::new(Flaky { n: 0 });
        assert_eq!("flaky", boxed.name());
        assert!(boxed.scrape().is_ok());
        assert!(boxed.scrape().is_err());
    }
}
