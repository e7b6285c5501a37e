//! Normalization of raw records into samples.
//!
//! Three record shapes are understood, see `Shape`. Already-normalized records
//! pass through as one sample. Tagged-energy records yield one sample per
//! numeric component reading under the default metric. Rail-power records
//! yield voltage, current and power samples per rail plus one total power
//! sample. Readings that are not numeric are skipped one by one; the record
//! as a whole is only dropped when its shape or timestamp is unusable.

use super::shape::{numeric, Shape, DURATION, TAG, TIMESTAMP, TOTAL_POWER};
use super::{Filter, FilterError, FILTER_SKIPPED_READINGS};
use crate::metric::{Labels, RawRecord, Sample};
use crate::time;
use serde_json::{Map, Value};
use std::sync::atomic::Ordering;

/// Component label given to the aggregate power sample.
const TOTAL_COMPONENT: &str = "total";
const COMPONENT_LABEL: &str = "component";
const SOURCE_LABEL: &str = "source";

/// How the aggregate power sample of a rail-power record is produced.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum TotalPower {
    /// Emit the record's own `"Total Power"` reading.
    Reported,
    /// Emit the sum of the rails' `Power` readings, leaving out the named
    /// rails. The reported value is ignored.
    Computed {
        /// Rails not counted in the sum.
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// Emit no aggregate sample.
    Omitted,
}

impl Default for TotalPower {
    fn default() -> TotalPower {
        TotalPower::Reported
    }
}

/// Configuration for `Normalizer`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Metric of tagged-energy component readings.
    pub default_metric: String,
    /// Value of the `source` label on every produced sample.
    pub service_label: String,
    /// When set, a tagged-energy record's `duration` becomes one more sample
    /// under this metric.
    pub duration_metric: Option<String>,
    /// Aggregate power policy for rail-power records.
    pub total_power: TotalPower,
    /// Metric of rail `Voltage` readings.
    pub voltage_metric: String,
    /// Metric of rail `Current` readings.
    pub current_metric: String,
    /// Metric of rail `Power` readings and of the aggregate.
    pub power_metric: String,
}

impl Default for NormalizerConfig {
    fn default() -> NormalizerConfig {
        NormalizerConfig {
            default_metric: "pyjoules_remote_write_energy_uj".to_string(),
            service_label: "power-monitor".to_string(),
            duration_metric: None,
            total_power: TotalPower::default(),
            voltage_metric: "agx_orin_voltage_volts".to_string(),
            current_metric: "agx_orin_current_amps".to_string(),
            power_metric: "agx_orin_power_watts".to_string(),
        }
    }
}

/// The record normalizer.
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    /// Create a new `Normalizer`.
    pub fn new(config: NormalizerConfig) -> Normalizer {
        Normalizer { config }
    }

    fn component_labels(&self, component: &str) -> Labels {
        let mut labels = Labels::default();
        labels.insert(COMPONENT_LABEL, component);
        labels.insert(SOURCE_LABEL, self.config.service_label.as_str());
        labels
    }

    fn skip(&self, field: &str, value: &Value) {
        FILTER_SKIPPED_READINGS.fetch_add(1, Ordering::Relaxed);
        debug!("skipping non-numeric reading {:?} = {}", field, value);
    }

    fn tagged_energy(&self, record: &RawRecord) -> Result<Vec<Sample>, FilterError> {
        let ts = record_timestamp(record)?;
        let mut samples = Vec::with_capacity(record.len());
        for (component, reading) in record.fields() {
            match component.as_str() {
                TIMESTAMP | DURATION | TAG => continue,
                _ => {}
            }
            match numeric(reading) {
                Some(v) => samples.push(Sample::with_labels(
                    self.config.default_metric.as_str(),
                    self.component_labels(component),
                    v,
                    ts,
                )?),
                None => self.skip(component, reading),
            }
        }
        if let Some(ref metric) = self.config.duration_metric {
            if let Some(reading) = record.get(DURATION) {
                match numeric(reading) {
                    Some(v) => {
                        let mut labels = Labels::default();
                        labels.insert(SOURCE_LABEL, self.config.service_label.as_str());
                        samples.push(Sample::with_labels(metric.as_str(), labels, v, ts)?);
                    }
                    None => self.skip(DURATION, reading),
                }
            }
        }
        Ok(samples)
    }

    fn rail_power(&self, record: &RawRecord) -> Result<Vec<Sample>, FilterError> {
        let ts = record_timestamp(record)?;
        let mut samples = Vec::with_capacity(record.len() * 3);
        let mut reported = None;
        let mut computed: Option<f64> = None;
        for (rail, payload) in record.fields() {
            if rail == TIMESTAMP {
                continue;
            }
            if rail == TOTAL_POWER {
                match numeric(payload) {
                    Some(v) => reported = Some(v),
                    None => self.skip(rail, payload),
                }
                continue;
            }
            let readings = match *payload {
                Value::Object(ref readings) => readings,
                _ => {
                    self.skip(rail, payload);
                    continue;
                }
            };
            let rail_metrics = [
                ("Voltage", &self.config.voltage_metric),
                ("Current", &self.config.current_metric),
                ("Power", &self.config.power_metric),
            ];
            for &(field, metric) in &rail_metrics {
                let reading = match readings.get(field) {
                    Some(reading) => reading,
                    None => continue,
                };
                match numeric(reading) {
                    Some(v) => {
                        samples.push(Sample::with_labels(
                            metric.as_str(),
                            self.component_labels(rail),
                            v,
                            ts,
                        )?);
                        if field == "Power" && self.counts_toward_total(rail) {
                            computed = Some(computed.unwrap_or(0.0) + v);
                        }
                    }
                    None => self.skip(&format!("{}.{}", rail, field), reading),
                }
            }
        }
        let total = match self.config.total_power {
            TotalPower::Reported => reported,
            TotalPower::Computed { .. } => computed,
            TotalPower::Omitted => None,
        };
        if let Some(v) = total {
            samples.push(Sample::with_labels(
                self.config.power_metric.as_str(),
                self.component_labels(TOTAL_COMPONENT),
                v,
                ts,
            )?);
        }
        Ok(samples)
    }

    fn counts_toward_total(&self, rail: &str) -> bool {
        match self.config.total_power {
            TotalPower::Computed { ref exclude } => !exclude.iter().any(|r| r == rail),
            _ => false,
        }
    }

    fn normalized(&self, record: &RawRecord) -> Result<Sample, FilterError> {
        let metric = record
            .get("metric")
            .and_then(Value::as_str)
            .ok_or(FilterError::BadField("metric"))?;
        let value = record
            .get("value")
            .and_then(numeric)
            .ok_or(FilterError::BadField("value"))?;
        let timestamp_ms = record
            .get("timestamp_ms")
            .and_then(epoch_ms)
            .ok_or(FilterError::BadField("timestamp_ms"))?;
        let labels = match record.get("labels") {
            None | Some(&Value::Null) => Labels::default(),
            Some(&Value::Object(ref map)) => label_map(map)?,
            Some(_) => return Err(FilterError::BadField("labels")),
        };
        Ok(Sample::with_labels(metric, labels, value, timestamp_ms)?)
    }
}

fn record_timestamp(record: &RawRecord) -> Result<i64, FilterError> {
    let raw = record
        .get(TIMESTAMP)
        .and_then(Value::as_str)
        .ok_or(FilterError::BadField(TIMESTAMP))?;
    Ok(time::parse_timestamp_ms(raw)?)
}

fn epoch_ms(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.abs() < i64::max_value() as f64)
            .map(|f| f.trunc() as i64)
    })
}

fn label_map(map: &Map<String, Value>) -> Result<Labels, FilterError> {
    let mut labels = Labels::default();
    for (k, v) in map {
        let v = match *v {
            Value::String(ref s) => s.clone(),
            Value::Number(ref n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(FilterError::BadField("labels")),
        };
        labels.insert(k.as_str(), v);
    }
    Ok(labels)
}

impl Filter for Normalizer {
    fn name(&self) -> &str {
        "normalizer"
    }

    fn process(&mut self, record: RawRecord) -> Result<Vec<Sample>, FilterError> {
        match Shape::classify(&record) {
            Shape::Normalized => self.normalized(&record).map(|s| vec![s]),
            Shape::TaggedEnergy => self.tagged_energy(&record),
            Shape::RailPower => self.rail_power(&record),
            Shape::Unknown => Err(FilterError::UnknownShape),
        }
    }
}
