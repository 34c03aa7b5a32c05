//! InfluxDB line protocol rendering.
//!
//! A point renders as `measurement[,tag=value...] field=value[,field=value...] [timestamp]`.
//! Timestamps are normalised to nanoseconds before rendering.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::errors::StoreError;
use bools_shared::is_missing;

/// Offset assumed for timestamps that carry no timezone, UTC+8.
pub const NAIVE_UTC_OFFSET_SECS: i32 = 8 * 3600;

const NANOS_DIGITS: u32 = 19;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];

const AWARE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f %z"];

/// Write precision understood by the `/write` endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Precision {
    #[default]
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    /// Query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "n",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalises a column of timestamps to nanoseconds.
///
/// Numeric timestamps are scaled by a power of ten chosen from the digit
/// count of the first numeric sample: 10 digits are seconds, 13 millis,
/// 16 micros and 19 nanos. Any other magnitude is rejected. Floats are
/// truncated to integers first.
///
/// Strings are parsed as dates. Strings carrying an offset are converted
/// to UTC; naive strings are read as UTC+8.
#[derive(Debug, Default)]
pub struct TimestampNormalizer {
    power: Option<u32>,
}

impl TimestampNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalise one value.
    pub fn normalize(&mut self, value: &Value) -> Result<i64, StoreError> {
        match value {
            Value::Number(number) => {
                let raw = match number.as_i64() {
                    Some(raw) => raw,
                    None => number
                        .as_f64()
                        .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                        .map(|f| f.trunc() as i64)
                        .ok_or_else(|| unsupported(value))?,
                };
                self.scale(raw)
            }
            Value::String(text) => parse_datetime_nanos(text),
            _ => Err(unsupported(value)),
        }
    }

    fn scale(&mut self, raw: i64) -> Result<i64, StoreError> {
        let power = match self.power {
            Some(power) => power,
            None => {
                let power = precision_power(raw)?;
                self.power = Some(power);
                power
            }
        };

        raw.checked_mul(10i64.pow(power)).ok_or_else(|| {
            StoreError::validation(format!("Timestamp {} overflows nanosecond range", raw))
        })
    }
}

fn unsupported(value: &Value) -> StoreError {
    StoreError::validation(format!(
        "Unsupported time value {}, expected a s/ms/us/ns timestamp or a date string",
        value
    ))
}

/// Power of ten that brings a timestamp with this magnitude to nanoseconds.
fn precision_power(raw: i64) -> Result<u32, StoreError> {
    let digits = raw.unsigned_abs().checked_ilog10().map_or(1, |d| d + 1);
    match digits {
        10 | 13 | 16 | 19 => Ok(NANOS_DIGITS - digits),
        _ => Err(StoreError::validation(format!(
            "Timestamp {} has {} digits, only s, ms, us and ns timestamps are supported",
            raw, digits
        ))),
    }
}

/// Parse a date string into nanoseconds since the epoch.
pub fn parse_datetime_nanos(text: &str) -> Result<i64, StoreError> {
    let text = text.trim();

    let aware = DateTime::parse_from_rfc3339(text).ok().or_else(|| {
        AWARE_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(text, format).ok())
    });
    if let Some(aware) = aware {
        return aware_nanos(&aware, text);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| StoreError::validation(format!("Cannot parse time value {:?}", text)))?;

    let offset = FixedOffset::east_opt(NAIVE_UTC_OFFSET_SECS)
        .ok_or_else(|| StoreError::validation("Invalid naive time offset"))?;
    let aware = naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| StoreError::validation(format!("Ambiguous time value {:?}", text)))?;

    aware_nanos(&aware, text)
}

fn aware_nanos(aware: &DateTime<FixedOffset>, text: &str) -> Result<i64, StoreError> {
    aware.timestamp_nanos_opt().ok_or_else(|| {
        StoreError::validation(format!("Time value {:?} is out of nanosecond range", text))
    })
}

/// A single line protocol point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Vec<(String, Value)>,
    pub fields: Vec<(String, Value)>,
    /// Nanoseconds since the epoch. `None` lets the server stamp the point.
    pub timestamp: Option<i64>,
}

impl Point {
    /// Create a point with no tags or fields.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Set the timestamp in nanoseconds.
    pub fn timestamp(mut self, nanos: i64) -> Self {
        self.timestamp = Some(nanos);
        self
    }

    /// Render the point.
    ///
    /// Tags are sorted by key. Tags and fields whose value is missing are
    /// omitted; a point left with no field at all is rejected.
    pub fn to_line(&self) -> Result<String, StoreError> {
        let mut line = escape(&self.measurement, &[',', ' ']);

        let mut tags: Vec<&(String, Value)> =
            self.tags.iter().filter(|(_, v)| !is_missing(v)).collect();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in tags {
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(&tag_value(value), &[',', '=', ' ']));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .filter(|(_, v)| !is_missing(v))
            .map(|(key, value)| format!("{}={}", escape(key, &[',', '=', ' ']), field_value(value)))
            .collect();
        if fields.is_empty() {
            return Err(StoreError::validation(format!(
                "Point for measurement {:?} has no fields",
                self.measurement
            )));
        }
        line.push(' ');
        line.push_str(&fields.join(","));

        if let Some(timestamp) = self.timestamp {
            line.push(' ');
            line.push_str(&timestamp.to_string());
        }

        Ok(line)
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn tag_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers are written bare, so InfluxDB stores them as floats whether or
/// not a given value happens to be whole.
fn field_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", escape(s, &['"'])),
        other => format!("\"{}\"", escape(&other.to_string(), &['"'])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seconds_scaled_to_nanos() {
        let mut normalizer = TimestampNormalizer::new();
        assert_eq!(
            normalizer.normalize(&json!(1700000000)).unwrap(),
            1_700_000_000_000_000_000
        );
    }

    #[test]
    fn test_scale_fixed_by_first_sample() {
        let mut normalizer = TimestampNormalizer::new();
        assert_eq!(
            normalizer.normalize(&json!(1700000000000i64)).unwrap(),
            1_700_000_000_000_000_000
        );
        assert_eq!(
            normalizer.normalize(&json!(1700000000001i64)).unwrap(),
            1_700_000_000_001_000_000
        );
    }

    #[test]
    fn test_all_supported_precisions() {
        for (raw, expected) in [
            (json!(1700000000), 1_700_000_000_000_000_000i64),
            (json!(1700000000123i64), 1_700_000_000_123_000_000),
            (json!(1700000000123456i64), 1_700_000_000_123_456_000),
            (json!(1700000000123456789i64), 1_700_000_000_123_456_789),
            (json!(1700000000.9), 1_700_000_000_000_000_000),
        ] {
            let mut normalizer = TimestampNormalizer::new();
            assert_eq!(normalizer.normalize(&raw).unwrap(), expected);
        }
    }

    #[test]
    fn test_unsupported_magnitude_rejected() {
        for raw in [json!(12345), json!(17000000001i64), json!(true)] {
            let mut normalizer = TimestampNormalizer::new();
            assert!(matches!(
                normalizer.normalize(&raw),
                Err(StoreError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_naive_string_read_as_utc_plus_8() {
        let nanos = parse_datetime_nanos("2023-11-15 06:13:20").unwrap();
        // 2023-11-14T22:13:20Z
        assert_eq!(nanos, 1_700_000_000_000_000_000);

        let date_only = parse_datetime_nanos("1970-01-02").unwrap();
        assert_eq!(date_only, 16 * 3600 * 1_000_000_000);
    }

    #[test]
    fn test_aware_string_converted_to_utc() {
        assert_eq!(
            parse_datetime_nanos("2023-11-14T22:13:20Z").unwrap(),
            1_700_000_000_000_000_000
        );
        assert_eq!(
            parse_datetime_nanos("2023-11-15 06:13:20.5+0800").unwrap(),
            1_700_000_000_500_000_000
        );
        assert!(parse_datetime_nanos("yesterday").is_err());
    }

    #[test]
    fn test_point_line() {
        let line = Point::new("cpu")
            .tag("region", "us west")
            .tag("host", "a")
            .field("load", 0.5)
            .field("count", 3)
            .field("up", true)
            .field("note", "say \"hi\"")
            .timestamp(1_700_000_000_000_000_000)
            .to_line()
            .unwrap();

        assert_eq!(
            line,
            "cpu,host=a,region=us\\ west load=0.5,count=3,up=true,note=\"say \\\"hi\\\"\" 1700000000000000000"
        );
    }

    #[test]
    fn test_whole_and_decimal_numbers_share_float_form() {
        let whole = Point::new("cpu").field("v", 1).to_line().unwrap();
        let decimal = Point::new("cpu").field("v", 1.5).to_line().unwrap();
        let large = Point::new("cpu").field("v", u64::MAX).to_line().unwrap();

        assert_eq!(whole, "cpu v=1");
        assert_eq!(decimal, "cpu v=1.5");
        assert_eq!(large, format!("cpu v={}", u64::MAX));
    }

    #[test]
    fn test_point_omits_missing_values() {
        let line = Point::new("cpu")
            .tag("host", Value::Null)
            .field("load", Value::Null)
            .field("idle", 1.5)
            .to_line()
            .unwrap();

        assert_eq!(line, "cpu idle=1.5");
    }

    #[test]
    fn test_point_without_fields_rejected() {
        let result = Point::new("cpu").field("load", Value::Null).to_line();
        assert!(matches!(result, Err(StoreError::ValidationError(_))));
    }

    #[test]
    fn test_precision_param() {
        assert_eq!(Precision::default().as_str(), "n");
        assert_eq!(Precision::Milliseconds.to_string(), "ms");
    }
}
