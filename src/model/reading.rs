//! Sensor reading type and raw-row parsing

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One untyped row as delivered by the backend (bulk query or change event)
pub type RawRecord = serde_json::Map<String, Value>;

/// A single sample from the sensor rig.
///
/// Ordering and de-duplication always use `id`; `created_at` is carried for
/// display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Row id assigned by the backend (monotonically increasing)
    pub id: i64,
    /// Insert time, if the row carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Load cell weight in grams
    pub weight_g: f64,
    /// Temperature in °C
    pub temperature_c: f64,
    /// Gyroscope rates in °/s
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    /// Raw infrared sensor value (finger presence)
    pub ir_value: i64,
}

impl SensorReading {
    /// Build a reading from a raw row.
    ///
    /// Every numeric field is coerced: absent, null or non-numeric input
    /// yields `0` / `0.0`.
    pub fn from_record(record: &RawRecord) -> Self {
        Self {
            id: int_field(record, "id"),
            created_at: record.get("created_at").and_then(parse_timestamp),
            weight_g: float_field(record, "weight_g"),
            temperature_c: float_field(record, "temperature_c"),
            gyro_x: float_field(record, "gyro_x"),
            gyro_y: float_field(record, "gyro_y"),
            gyro_z: float_field(record, "gyro_z"),
            ir_value: int_field(record, "ir_value"),
        }
    }
}

impl From<&RawRecord> for SensorReading {
    fn from(record: &RawRecord) -> Self {
        Self::from_record(record)
    }
}

fn float_field(record: &RawRecord, key: &str) -> f64 {
    record.get(key).and_then(parse_float).unwrap_or(0.0)
}

fn int_field(record: &RawRecord, key: &str) -> i64 {
    record.get(key).and_then(parse_int).unwrap_or(0)
}

fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_float(s),
        _ => None,
    }?;

    parsed.is_finite().then_some(parsed)
}

fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => leading_int(s),
        _ => None,
    }
}

/// Parse the longest decimal prefix of `s`, e.g. `"12.5g"` -> 12.5
fn leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }

    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }

    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    // Exponent only counts when it carries at least one digit
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = count_digits(&bytes[exp_end..]);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    s[..end].parse().ok()
}

/// Parse the leading integer of `s`, e.g. `"12.7"` -> 12
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let sign = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let digits = count_digits(&bytes[sign..]);

    if digits == 0 {
        return None;
    }

    s[..sign + digits].parse().ok()
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Postgres `timestamp` (no zone) columns come back without an offset
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_full_record() {
        let raw = record(json!({
            "id": 42,
            "created_at": "2024-05-01T12:30:45.123456+00:00",
            "weight_g": 512.25,
            "temperature_c": 36.6,
            "gyro_x": -1.5,
            "gyro_y": 0.25,
            "gyro_z": 3.0,
            "ir_value": 51234
        }));

        let reading = SensorReading::from_record(&raw);
        assert_eq!(reading.id, 42);
        assert_eq!(reading.weight_g, 512.25);
        assert_eq!(reading.temperature_c, 36.6);
        assert_eq!(reading.gyro_x, -1.5);
        assert_eq!(reading.gyro_y, 0.25);
        assert_eq!(reading.gyro_z, 3.0);
        assert_eq!(reading.ir_value, 51234);

        let created = reading.created_at.unwrap();
        assert_eq!(created.hour(), 12);
        assert_eq!(created.second(), 45);
    }

    #[test]
    fn test_missing_fields_are_zero() {
        let reading = SensorReading::from_record(&record(json!({ "id": 7 })));
        assert_eq!(reading.id, 7);
        assert!(reading.created_at.is_none());
        assert_eq!(reading.weight_g, 0.0);
        assert_eq!(reading.temperature_c, 0.0);
        assert_eq!(reading.gyro_x, 0.0);
        assert_eq!(reading.gyro_y, 0.0);
        assert_eq!(reading.gyro_z, 0.0);
        assert_eq!(reading.ir_value, 0);
    }

    #[test]
    fn test_non_numeric_fields_are_zero() {
        let raw = record(json!({
            "id": "abc",
            "weight_g": "heavy",
            "temperature_c": null,
            "gyro_x": true,
            "gyro_y": [1, 2],
            "gyro_z": { "v": 1 },
            "ir_value": "",
            "created_at": "yesterday"
        }));

        let reading = SensorReading::from_record(&raw);
        assert_eq!(reading.id, 0);
        assert_eq!(reading.weight_g, 0.0);
        assert_eq!(reading.temperature_c, 0.0);
        assert_eq!(reading.gyro_x, 0.0);
        assert_eq!(reading.gyro_y, 0.0);
        assert_eq!(reading.gyro_z, 0.0);
        assert_eq!(reading.ir_value, 0);
        assert!(reading.created_at.is_none());
    }

    #[test]
    fn test_numeric_strings() {
        let raw = record(json!({
            "id": "15",
            "weight_g": " 12.5g",
            "temperature_c": "-3.25",
            "gyro_x": ".5",
            "gyro_y": "1e2",
            "gyro_z": "7e",
            "ir_value": "12.7"
        }));

        let reading = SensorReading::from_record(&raw);
        assert_eq!(reading.id, 15);
        assert_eq!(reading.weight_g, 12.5);
        assert_eq!(reading.temperature_c, -3.25);
        assert_eq!(reading.gyro_x, 0.5);
        assert_eq!(reading.gyro_y, 100.0);
        assert_eq!(reading.gyro_z, 7.0);
        assert_eq!(reading.ir_value, 12);
    }

    #[test]
    fn test_float_ir_value_truncates() {
        let reading = SensorReading::from_record(&record(json!({ "id": 1, "ir_value": 99.9 })));
        assert_eq!(reading.ir_value, 99);
    }

    #[test]
    fn test_non_finite_is_zero() {
        let reading =
            SensorReading::from_record(&record(json!({ "id": 1, "weight_g": "1e999" })));
        assert_eq!(reading.weight_g, 0.0);
    }

    #[test]
    fn test_naive_timestamp() {
        let reading = SensorReading::from_record(&record(json!({
            "id": 1,
            "created_at": "2024-05-01T08:15:00.5"
        })));
        let created = reading.created_at.unwrap();
        assert_eq!(created.hour(), 8);
        assert_eq!(created.minute(), 15);
    }

    #[test]
    fn test_leading_float_edge_cases() {
        assert_eq!(leading_float("-"), None);
        assert_eq!(leading_float("."), None);
        assert_eq!(leading_float("3."), Some(3.0));
        assert_eq!(leading_float("+4.5x"), Some(4.5));
        assert_eq!(leading_float("2e+3"), Some(2000.0));
    }
}
