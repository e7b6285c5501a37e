//! The data that moves through the pipeline.
//!
//! A `RawRecord` is whatever a collector scraped, still in its source's shape.
//! A `Sample` is the canonical form the normalizer produces and the
//! remote-write sink consumes. `SeriesKey` and `SeriesBatch` group samples into
//! time series for one push attempt.

mod labels;
mod series;

pub use self::labels::Labels;
pub use self::series::{Point, SeriesBatch, SeriesKey};

use serde_json::{Map, Value};
use std::error;
use std::fmt;

/// The reserved label carrying a series' metric name on the wire.
pub const NAME_LABEL: &str = "__name__";

/// Reasons a `Sample` could not be created.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidSample {
    /// The metric name was empty.
    EmptyMetric,
    /// The timestamp was before the epoch.
    NegativeTimestamp(i64),
    /// A label used the reserved `__name__` key.
    ReservedLabel,
}

impl fmt::Display for InvalidSample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            InvalidSample::EmptyMetric => write!(f, "metric name is empty"),
            InvalidSample::NegativeTimestamp(ts) => {
                write!(f, "timestamp {} is before the epoch", ts)
            }
            InvalidSample::ReservedLabel => {
                write!(f, "label key {} is reserved", NAME_LABEL)
            }
        }
    }
}

impl error::Error for InvalidSample {}

/// A single normalized measurement.
///
/// Once built a `Sample` is not mutated. Every `Sample` has a non-empty metric
/// name, a timestamp at or after the epoch and no `__name__` label.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    metric: String,
    labels: Labels,
    value: f64,
    timestamp_ms: i64,
}

impl Sample {
    /// Create a new, label-less `Sample`.
    pub fn new<S>(metric: S, value: f64, timestamp_ms: i64) -> Result<Sample, InvalidSample>
    where
        S: Into<String>,
    {
        Sample::with_labels(metric, Labels::default(), value, timestamp_ms)
    }

    /// Create a new `Sample` carrying `labels`.
    pub fn with_labels<S>(
        metric: S,
        labels: Labels,
        value: f64,
        timestamp_ms: i64,
    ) -> Result<Sample, InvalidSample>
    where
        S: Into<String>,
    {
        let metric = metric.into();
        if metric.is_empty() {
            return Err(InvalidSample::EmptyMetric);
        }
        if timestamp_ms < 0 {
            return Err(InvalidSample::NegativeTimestamp(timestamp_ms));
        }
        if labels.get(NAME_LABEL).is_some() {
            return Err(InvalidSample::ReservedLabel);
        }
        Ok(Sample {
            metric,
            labels,
            value,
            timestamp_ms,
        })
    }

    /// Rebuild a sample from a series key and one of its points. The key was
    /// made from a valid sample so the checks in `with_labels` hold already.
    pub(crate) fn from_series(key: &SeriesKey, point: &Point) -> Sample {
        Sample {
            metric: key.metric().to_string(),
            labels: key.labels().cloned().collect(),
            value: point.value,
            timestamp_ms: point.timestamp_ms,
        }
    }

    /// The metric name.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// The labels, sorted by key.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// The measured value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Epoch milliseconds, UTC.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// The key of the time series this sample belongs to.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(&self.metric, &self.labels)
    }
}

/// A measurement as a collector scraped it.
///
/// Records are JSON objects: every source in use already speaks in
/// dictionaries of readings keyed by component or rail name. The normalizer
/// decides which shape a record has, nothing else looks inside.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

impl RawRecord {
    /// Build a record from a JSON value. Returns `None` unless the value is an
    /// object.
    pub fn from_value(value: Value) -> Option<RawRecord> {
        match value {
            Value::Object(fields) => Some(RawRecord { fields }),
            _ => None,
        }
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Whether the record has `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// All fields, in key order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Number of fields.
    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> RawRecord {
        RawRecord { fields }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn sample_rejects_invalid_parts() {
        assert_eq!(Err(InvalidSample::EmptyMetric), Sample::new("", 1.0, 0));
        assert_eq!(
            Err(InvalidSample::NegativeTimestamp(-1)),
            Sample::new("m", 1.0, -1)
        );
        let labels: Labels = vec![(NAME_LABEL, "m")].into_iter().collect();
        assert_eq!(
            Err(InvalidSample::ReservedLabel),
            Sample::with_labels("m", labels, 1.0, 0)
        );
    }

    #[test]
    fn series_key_puts_name_first() {
        let labels: Labels = vec![("source", "agx"), ("component", "GPU")]
            .into_iter()
            .collect();
        let sample = Sample::with_labels("power_watts", labels, 10.0, 0).unwrap();
        let key = sample.series_key();
        let names: Vec<&str> = key.pairs().iter().map(|p| p.0.as_str()).collect();
        assert_eq!(vec![NAME_LABEL, "component", "source"], names);
        assert_eq!("power_watts", key.metric());
    }

    #[test]
    fn raw_record_from_value_needs_object() {
        assert!(RawRecord::from_value(json!([1, 2])).is_none());
        let rec = RawRecord::from_value(json!({"core": 1.0})).unwrap();
        assert_eq!(Some(&json!(1.0)), rec.get("core"));
        assert_eq!(1, rec.len());
    }
}
