//! Tolerant decoders for inbound and previously stored JSON.
//!
//! Status payloads and stored history come from sources we do not control.
//! None of these helpers fail: a missing or malformed value decodes to the
//! field's documented default.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::models::StepReport;

pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        _ => String::new(),
    })
}

pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(count_from_value(&value).unwrap_or(0))
}

pub fn optional_count<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(count_from_value(&value))
}

pub fn timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(timestamp_from_value(&value))
}

pub fn steps<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<StepReport>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(steps_from_value(&value))
}

/// Non-negative integer out of a JSON number or numeric string.
/// Negative values clamp to zero; anything else is `None`.
pub fn count_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Some(v)
            } else if n.as_i64().is_some() {
                Some(0)
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(|f| f.max(0.0) as u64)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.max(0.0) as u64)
            })
        }
        _ => None,
    }
}

pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        // [year, month, day, hour, minute, second, nanos] as written by Jackson
        Value::Array(parts) => {
            let part = |i: usize| parts.get(i).and_then(Value::as_i64).unwrap_or(0);
            if parts.len() < 3 {
                return None;
            }
            NaiveDate::from_ymd_opt(part(0) as i32, part(1) as u32, part(2) as u32)
                .and_then(|d| {
                    d.and_hms_nano_opt(part(3) as u32, part(4) as u32, part(5) as u32, part(6) as u32)
                })
                .map(|dt| dt.and_utc())
        }
        _ => None,
    }
}

pub fn steps_from_value(value: &Value) -> Vec<StepReport> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| item.is_object())
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// RFC 3339 first, then the zone-less forms Java backends commonly emit
/// (interpreted as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.and_utc())
}
