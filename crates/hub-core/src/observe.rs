//! 24-hour observation history reconstruction.
//!
//! The provider ships the last 24 hours of observations newest-first, with
//! each record carrying only an hour-of-day. Absolute timestamps are rebuilt
//! by walking oldest-to-newest from the batch's base stamp, rolling the
//! running clock forward one day whenever an hour goes backwards (the
//! midnight crossing).

use chrono::{Duration, NaiveDateTime, Timelike};
use serde_json::{Map, Value};
use tracing::warn;

const STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Rebuild the observation map from the extracted `observe24h_data` object.
///
/// Returns the facet value keyed by reconstructed stamp, or an
/// `{error, source}` record when the base stamp is malformed (the whole
/// batch is unusable but the refresh must not raise). `None` means there is
/// nothing to store and the previous facet value stays.
pub fn reconstruct_history(raw: &Value) -> Option<Value> {
    let od = raw.get("od")?.as_object()?;
    let mut records: Vec<&Value> = od.get("od2")?.as_array()?.iter().collect();
    // Newest-first on the wire; the running clock needs oldest-first.
    records.reverse();

    let base = od.get("od0").and_then(Value::as_str).unwrap_or_default();
    let mut clock = match NaiveDateTime::parse_from_str(base, STAMP_FORMAT) {
        Ok(dt) => dt,
        Err(e) => {
            let degraded = serde_json::json!({
                "error": format!("bad base stamp {base:?}: {e}"),
                "source": od.get("od2").cloned().unwrap_or(Value::Null),
            });
            warn!(base = %base, error = %e, "Observation history base stamp unparseable");
            return Some(degraded);
        }
    };

    let mut out = Map::new();
    for record in records {
        let Some(hour) = int_field(record, "od21") else {
            continue;
        };
        let Some(mut stamp) = clock.with_hour(hour) else {
            continue;
        };
        if stamp < clock {
            stamp += Duration::days(1);
        }
        clock = stamp;

        let Some(normalized) = normalize_record(record) else {
            continue;
        };
        out.insert(stamp.format(STAMP_FORMAT).to_string(), normalized);
    }

    if out.is_empty() {
        None
    } else {
        Some(Value::Object(out))
    }
}

/// Normalize one raw record: keep the provider fields, add decoded numeric
/// aliases. Temperature and humidity are mandatory; a record that cannot
/// supply them numerically is dropped without aborting the batch.
fn normalize_record(record: &Value) -> Option<Value> {
    let mut out = record.as_object()?.clone();

    let temp = num_field(record, "od22", None)?;
    let humi = num_field(record, "od27", None)?;
    let rain = num_field(record, "od26", Some(0.0))?;
    let wind_level = num_field(record, "od25", Some(0.0))?;
    let wind_angle = num_field(record, "od23", Some(0.0))?;

    out.insert("aqi".to_string(), record.get("od28").cloned().unwrap_or(Value::Null));
    out.insert("temp".to_string(), Value::from(temp));
    out.insert("humi".to_string(), Value::from(humi));
    out.insert("rain".to_string(), Value::from(rain));
    out.insert("wind".to_string(), record.get("od24").cloned().unwrap_or(Value::Null));
    out.insert("wind_level".to_string(), Value::from(wind_level));
    out.insert("wind_angle".to_string(), Value::from(wind_angle));
    Some(Value::Object(out))
}

fn int_field(record: &Value, key: &str) -> Option<u32> {
    match record.get(key) {
        Some(Value::Number(n)) => n.as_u64().map(|v| v as u32),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric field with an optional missing-or-empty default. A present but
/// unparseable value is `None` (caller drops the record).
fn num_field(record: &Value, key: &str, empty_default: Option<f64>) -> Option<f64> {
    match record.get(key) {
        None | Some(Value::Null) => empty_default,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => empty_default,
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}
