//! Grouping of samples into time series.

use super::{Labels, Sample, NAME_LABEL};
use std::collections::HashMap;
use std::slice::Iter;

/// Identity of one time series: `__name__` first, then the sample's labels in
/// key order. Two samples belong to the same series iff their keys are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pairs: Vec<(String, String)>,
}

impl SeriesKey {
    /// Build the key for `metric` with `labels`.
    pub fn new(metric: &str, labels: &Labels) -> SeriesKey {
        let mut pairs = Vec::with_capacity(labels.len() + 1);
        pairs.push((NAME_LABEL.to_string(), metric.to_string()));
        pairs.extend(labels.iter().cloned());
        SeriesKey { pairs }
    }

    /// The metric name of the series.
    pub fn metric(&self) -> &str {
        &self.pairs[0].1
    }

    /// The labels of the series, `__name__` excluded.
    pub fn labels(&self) -> Iter<(String, String)> {
        self.pairs[1..].iter()
    }

    /// Every pair as it goes on the wire, `__name__` included.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// One `(value, timestamp)` observation in a series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// The observed value.
    pub value: f64,
    /// Epoch milliseconds, UTC.
    pub timestamp_ms: i64,
}

/// The samples of one push attempt, grouped by series.
///
/// Series are kept in the order their first sample arrived and points within
/// a series keep arrival order, so the same input always yields the same
/// request.
#[derive(Clone, Debug, Default)]
pub struct SeriesBatch {
    index: HashMap<SeriesKey, usize>,
    series: Vec<(SeriesKey, Vec<Point>)>,
    samples: usize,
}

impl SeriesBatch {
    /// Group `samples`.
    pub fn from_samples<'a, I>(samples: I) -> SeriesBatch
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut batch = SeriesBatch::default();
        for sample in samples {
            batch.push(sample);
        }
        batch
    }

    /// Add one sample to its series, creating the series if needed.
    pub fn push(&mut self, sample: &Sample) {
        let point = Point {
            value: sample.value(),
            timestamp_ms: sample.timestamp_ms(),
        };
        let key = sample.series_key();
        match self.index.get(&key) {
            Some(&idx) => self.series[idx].1.push(point),
            None => {
                self.index.insert(key.clone(), self.series.len());
                self.series.push((key, vec![point]));
            }
        }
        self.samples += 1;
    }

    /// Iterate series in first-arrival order.
    pub fn iter(&self) -> Iter<(SeriesKey, Vec<Point>)> {
        self.series.iter()
    }

    /// Number of distinct series.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Number of points over all series.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Whether no sample has been pushed.
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Turn the batch back into samples, series by series.
    pub fn flatten(&self) -> Vec<Sample> {
        let mut out = Vec::with_capacity(self.samples);
        for &(ref key, ref points) in &self.series {
            for point in points {
                out.push(Sample::from_series(key, point));
            }
        }
        out
    }
}
