//! The closed set of raw record shapes.

use crate::metric::RawRecord;
use serde_json::Value;

/// Field carrying the timestamp of tagged-energy and rail-power records.
pub const TIMESTAMP: &str = "timestamp";
/// Aggregate power reported alongside rail readings.
pub const TOTAL_POWER: &str = "Total Power";
/// Measurement window of a tagged-energy record, in seconds.
pub const DURATION: &str = "duration";
/// Free-form tag of a tagged-energy record. Never emitted.
pub const TAG: &str = "tag";

/// What a `RawRecord` looks like.
///
/// Classification needs no configuration and is done once, the normalizer
/// dispatches on the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// Carries `metric`, `value`, `timestamp_ms` and optionally `labels`.
    Normalized,
    /// A `timestamp` plus numeric readings keyed by component, as an energy
    /// measuring library reports them.
    TaggedEnergy,
    /// A `timestamp`, rails as objects of `Voltage`/`Current`/`Power` and an
    /// optional `"Total Power"`.
    RailPower,
    /// None of the above.
    Unknown,
}

impl Shape {
    /// Decide the shape of `record`.
    pub fn classify(record: &RawRecord) -> Shape {
        if record.contains("metric") && record.contains("value") && record.contains("timestamp_ms") {
            return Shape::Normalized;
        }
        if !record.contains(TIMESTAMP) {
            return Shape::Unknown;
        }
        let has_rail = record
            .fields()
            .iter()
            .any(|(k, v)| k != TIMESTAMP && v.is_object());
        if has_rail || record.contains(TOTAL_POWER) {
            Shape::RailPower
        } else {
            Shape::TaggedEnergy
        }
    }
}

/// Read a reading as a float. JSON numbers and strings holding a float are
/// numeric, everything else is not.
pub fn numeric(value: &Value) -> Option<f64> {
    match *value {
        Value::Number(ref n) => n.as_f64(),
        Value::String(ref s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    #[test]
    fn classify_normalized() {
        let rec = record(json!({"metric": "m", "value": 1.0, "timestamp_ms": 0}));
        assert_eq!(Shape::Normalized, Shape::classify(&rec));
        // a normalized record wins even if it also has a timestamp
        let rec = record(json!({
            "metric": "m", "value": 1.0, "timestamp_ms": 0, "timestamp": "2025-01-01"
        }));
        assert_eq!(Shape::Normalized, Shape::classify(&rec));
    }

    #[test]
    fn classify_tagged_energy() {
        let rec = record(json!({
            "timestamp": "2025-01-01T00:00:00", "duration": 0.1, "tag": "x", "core": 1000.0
        }));
        assert_eq!(Shape::TaggedEnergy, Shape::classify(&rec));
    }

    #[test]
    fn classify_rail_power() {
        let rec = record(json!({
            "timestamp": "2025-01-01T00:00:00Z",
            "GPU": {"Voltage": 5.0, "Current": 2.0, "Power": 10.0},
        }));
        assert_eq!(Shape::RailPower, Shape::classify(&rec));
        let rec = record(json!({"timestamp": "2025-01-01T00:00:00Z", "Total Power": 3}));
        assert_eq!(Shape::RailPower, Shape::classify(&rec));
    }

    #[test]
    fn classify_unknown() {
        assert_eq!(Shape::Unknown, Shape::classify(&record(json!({}))));
        assert_eq!(Shape::Unknown, Shape::classify(&record(json!({"core": 1.0}))));
        assert_eq!(
            Shape::Unknown,
            Shape::classify(&record(json!({"metric": "m", "value": 1.0})))
        );
    }

    #[test]
    fn numeric_readings() {
        assert_eq!(Some(1.5), numeric(&json!(1.5)));
        assert_eq!(Some(3.0), numeric(&json!(3)));
        assert_eq!(Some(2.25), numeric(&json!(" 2.25 ")));
        assert_eq!(None, numeric(&json!("n/a")));
        assert_eq!(None, numeric(&json!(true)));
        assert_eq!(None, numeric(&json!(null)));
        assert_eq!(None, numeric(&json!({"Power": 1.0})));
    }
}
