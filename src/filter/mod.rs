//! Transformation of raw records into samples.
//!
//! A filter sits between the raw queue and the processed queue. Each record it
//! receives becomes zero or more samples, offered downstream as one batch.
//! Records a filter cannot handle are logged, counted and dropped; nothing a
//! filter does can stop the pipeline.

use crate::metric::{InvalidSample, RawRecord, Sample};
use crate::mpsc::{self, Recv};
use crate::thread::Stop;
use crate::time;
use std::error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod normalize;
mod shape;

pub use self::normalize::{Normalizer, NormalizerConfig, TotalPower};
pub use self::shape::Shape;

/// How long a filter waits on its input before looking at the stop token.
const RECV_TIMEOUT: Duration = Duration::from_millis(250);

lazy_static! {
    /// Records taken off the raw queue.
    pub static ref FILTER_RECORDS: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    /// Records dropped because they could not be normalized.
    pub static ref FILTER_DROPPED_RECORDS: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    /// Single readings skipped inside otherwise good records.
    pub static ref FILTER_SKIPPED_READINGS: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    /// Samples produced.
    pub static ref FILTER_SAMPLES: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
}

/// Why a whole record was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// The record matched no known shape.
    UnknownShape,
    /// The record's timestamp could not be used.
    Timestamp(time::ParseError),
    /// A field the record's shape requires is missing or has the wrong type.
    BadField(&'static str),
    /// The record parsed but does not make a valid sample.
    Invalid(InvalidSample),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FilterError::UnknownShape => write!(f, "record matches no known shape"),
            FilterError::Timestamp(ref e) => write!(f, "bad timestamp: {}", e),
            FilterError::BadField(field) => write!(f, "bad or missing field {:?}", field),
            FilterError::Invalid(ref e) => write!(f, "invalid sample: {}", e),
        }
    }
}

impl error::Error for FilterError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            FilterError::Timestamp(ref e) => Some(e),
            FilterError::Invalid(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<time::ParseError> for FilterError {
    fn from(e: time::ParseError) -> FilterError {
        FilterError::Timestamp(e)
    }
}

impl From<InvalidSample> for FilterError {
    fn from(e: InvalidSample) -> FilterError {
        FilterError::Invalid(e)
    }
}

/// A stage turning `RawRecord`s into `Sample`s.
pub trait Filter {
    /// The filter's name, used in diagnostics.
    fn name(&self) -> &str;

    /// Turn one record into samples, in order. An empty result is not an
    /// error.
    fn process(&mut self, record: RawRecord) -> Result<Vec<Sample>, FilterError>;

    /// Drive the filter: take records from `recv`, offer each non-empty
    /// result to `chan` until `stop` is set or every sender is gone.
    fn run(&mut self, recv: mpsc::Receiver<RawRecord>, chan: mpsc::Sender<Vec<Sample>>, stop: Stop) {
        info!("{} filter started", self.name());
        while !stop.is_set() {
            match recv.next_timeout(RECV_TIMEOUT) {
                Recv::Empty => continue,
                Recv::Closed => {
                    info!("{} input closed; {} filter exiting", recv.name(), self.name());
                    return;
                }
                Recv::Item(record) => {
                    FILTER_RECORDS.fetch_add(1, Ordering::Relaxed);
                    let shape = Shape::classify(&record);
                    match self.process(record) {
                        Ok(samples) => {
                            if samples.is_empty() {
                                continue;
                            }
                            FILTER_SAMPLES.fetch_add(samples.len(), Ordering::Relaxed);
                            chan.offer(samples);
                        }
                        Err(e) => {
                            FILTER_DROPPED_RECORDS.fetch_add(1, Ordering::Relaxed);
                            warn!("{}", dropped(self.name(), shape, &e));
                        }
                    }
                }
            }
        }
        info!("{} filter stopped", self.name());
    }
}

fn dropped(filter: &str, shape: Shape, err: &FilterError) -> String {
    format!("{} dropped {:?} record: {}", filter, shape, err)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::thread;
    use serde_json::json;
    use std::time::Instant;

    struct Echo;

    impl Filter for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn process(&mut self, record: RawRecord) -> Result<Vec<Sample>, FilterError> {
            match record.get("v").and_then(|v| v.as_f64()) {
                Some(v) => Ok(vec![Sample::new("echo", v, 0)?]),
                None => Err(FilterError::BadField("v")),
            }
        }
    }

    #[test]
    fn run_forwards_batches_and_skips_failures() {
        let (raw_snd, raw_rcv) = mpsc::channel("raw", 8);
        let (proc_snd, proc_rcv) = mpsc::channel("processed", 8);
        let stop = Stop::new();
        let handle = thread::spawn("echo", &stop, move |s| {
            Echo.run(raw_rcv, proc_snd, s);
        })
        .unwrap();

        assert!(raw_snd.offer(RawRecord::from_value(json!({"v": 1.0})).unwrap()));
        assert!(raw_snd.offer(RawRecord::from_value(json!({"w": 1.0})).unwrap()));
        assert!(raw_snd.offer(RawRecord::from_value(json!({"v": 2.0})).unwrap()));

        let mut got = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while got.len() < 2 && Instant::now() < deadline {
            if let Recv::Item(batch) = proc_rcv.next_timeout(Duration::from_millis(50)) {
                let batch: Vec<Sample> = batch;
                got.extend(batch.into_iter().map(|s| s.value()));
            }
        }
        assert_eq!(vec![1.0, 2.0], got);

        stop.set();
        handle.join();
    }

    #[test]
    fn drop_diagnostic_names_shape() {
        let record = RawRecord::from_value(json!({"w": 1.0})).unwrap();
        let msg = dropped("echo", Shape::classify(&record), &FilterError::UnknownShape);
        assert_eq!("echo dropped Unknown record: record matches no known shape", msg);

        let record = RawRecord::from_value(json!({"timestamp": "x", "core": 1.0})).unwrap();
        let err = FilterError::BadField("timestamp");
        let msg = dropped("normalizer", Shape::classify(&record), &err);
        assert!(msg.contains("TaggedEnergy"), "{}", msg);
    }

    #[test]
    fn run_exits_when_input_closes() {
        let (raw_snd, raw_rcv) = mpsc::channel::<RawRecord>("raw", 1);
        let (proc_snd, _proc_rcv) = mpsc::channel("processed", 1);
        drop(raw_snd);
        let start = Instant::now();
        Echo.run(raw_rcv, proc_snd, Stop::new());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
