//! Daily and hourly forecast normalization.
//!
//! Raw forecast lists carry provider condition codes and cryptic field
//! names; rows are rebuilt into normalized records. Hourly rows are merged
//! with the observation-history facet on matching stamps so recent hours
//! carry measured precipitation and wind instead of nominal code values.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::conditions::condition_info;
use crate::store::{AggregateStore, Facet};

const HOURLY_ROW_CAP: usize = 48;
/// Hourly rows older than this are history, not forecast.
const HOURLY_STALE_MINUTES: i64 = 90;

/// Build normalized daily forecast records from the daily facet.
///
/// `now` anchors the year (the provider sends only month/day) and decides
/// which row gets today's measured precipitation from the current facet.
pub fn build_daily(store: &AggregateStore, now: NaiveDateTime) -> Vec<Map<String, Value>> {
    let Some(items) = store.facet(Facet::Daily).and_then(Value::as_array) else {
        return Vec::new();
    };

    let measured_rain = store
        .field(Facet::Current, "rain")
        .and_then(value_as_f64);

    let mut rows = Vec::new();
    for item in items {
        let code = format!("d{}", text(item, "fa").unwrap_or_default());
        let Some(info) = condition_info(&code) else {
            continue;
        };
        let Some(date) = parse_month_day(text(item, "fi").unwrap_or_default(), now) else {
            continue;
        };

        let mut row = Map::new();
        row.insert("datetime".into(), Value::String(date.format("%Y-%m-%dT00:00:00").to_string()));
        row.insert("condition".into(), Value::String(info.condition.as_str().into()));
        row.insert("skycon".into(), Value::String(info.skycon.into()));

        let mut precipitation = info.precipitation;
        if date == now.date() {
            if let Some(rain) = measured_rain {
                precipitation = rain;
            }
        }
        row.insert("precipitation".into(), Value::from(precipitation));

        if let Some(high) = item.get("fc").and_then(value_as_f64) {
            row.insert("temperature".into(), Value::from(high));
        }
        if let Some(low) = item.get("fd").and_then(value_as_f64) {
            row.insert("templow".into(), Value::from(low));
        }
        if let Some(humidity) = item.get("fn").and_then(value_as_f64) {
            row.insert("humidity".into(), Value::from(humidity));
        }
        if let Some(bearing) = text(item, "fe") {
            row.insert("wind_bearing".into(), Value::String(bearing.into()));
        }
        rows.push(row);
    }
    rows
}

/// Build normalized hourly forecast records from the hourly facet, merged
/// with observation history. Rows older than 90 minutes are dropped and the
/// output is capped at 48 rows.
pub fn build_hourly(store: &AggregateStore, now: NaiveDateTime) -> Vec<Map<String, Value>> {
    let Some(items) = store.facet(Facet::Hourly).and_then(Value::as_array) else {
        return Vec::new();
    };
    let history = store.facet(Facet::ObservationHistory);

    let mut rows = Vec::new();
    for item in items {
        if rows.len() >= HOURLY_ROW_CAP {
            break;
        }
        let code = format!("d{}", text(item, "ja").unwrap_or_default());
        let Some(info) = condition_info(&code) else {
            continue;
        };
        let stamp = text(item, "jf").unwrap_or_default();
        let Ok(time) = NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M") else {
            continue;
        };
        if now - time > Duration::minutes(HOURLY_STALE_MINUTES) {
            continue;
        }

        let observed = history.and_then(|h| h.get(stamp));

        let mut row = Map::new();
        row.insert("datetime".into(), Value::String(time.format("%Y-%m-%dT%H:%M:%S").to_string()));
        row.insert("condition".into(), Value::String(info.condition.as_str().into()));
        row.insert("skycon".into(), Value::String(info.skycon.into()));
        row.insert("cloud_coverage".into(), Value::from(info.cloud_coverage));

        let precipitation = observed
            .and_then(|o| o.get("rain"))
            .and_then(value_as_f64)
            .unwrap_or(info.precipitation);
        row.insert("precipitation".into(), Value::from(precipitation));

        if let Some(temp) = item.get("jb").and_then(value_as_f64) {
            row.insert("temperature".into(), Value::from(temp));
        }
        if let Some(humidity) = item.get("je").and_then(value_as_f64) {
            row.insert("humidity".into(), Value::from(humidity));
        }
        if let Some(pressure) = item.get("jj").and_then(value_as_f64) {
            row.insert("pressure".into(), Value::from(pressure));
        }
        if let Some(speed) = item.get("jg").and_then(value_as_f64) {
            row.insert("wind_speed".into(), Value::from(speed));
        }
        if let Some(bearing) = observed.and_then(|o| o.get("wind")).and_then(Value::as_str) {
            row.insert("wind_bearing".into(), Value::String(bearing.into()));
        }
        rows.push(row);
    }
    rows
}

fn parse_month_day(raw: &str, now: NaiveDateTime) -> Option<NaiveDate> {
    let (month, day) = raw.split_once('/')?;
    NaiveDate::from_ymd_opt(now.year(), month.parse().ok()?, day.parse().ok()?)
}

fn text<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn store_with_daily() -> AggregateStore {
        let mut store = AggregateStore::new();
        store.replace(
            Facet::Daily,
            json!([
                {"fa": "00", "fi": "1/15", "fc": "8", "fd": "-2", "fn": "40", "fe": "北风"},
                {"fa": "07", "fi": "1/16", "fc": "6", "fd": "0"},
                {"fa": "99", "fi": "1/17"}
            ]),
        );
        store.replace(Facet::Current, json!({"rain": "2.5"}));
        store
    }

    #[test]
    fn test_daily_rows_and_today_precipitation_override() {
        let rows = build_daily(&store_with_daily(), now());
        assert_eq!(rows.len(), 2);

        // Today: sunny code but measured rain wins.
        assert_eq!(rows[0]["condition"], "sunny");
        assert_eq!(rows[0]["precipitation"], json!(2.5));
        assert_eq!(rows[0]["temperature"], json!(8.0));
        assert_eq!(rows[0]["templow"], json!(-2.0));
        assert_eq!(rows[0]["wind_bearing"], "北风");

        // Tomorrow: nominal rate from the code table.
        assert_eq!(rows[1]["condition"], "rainy");
        assert_eq!(rows[1]["precipitation"], json!(0.5));
    }

    #[test]
    fn test_daily_unknown_code_skipped() {
        let rows = build_daily(&store_with_daily(), now());
        assert!(rows.iter().all(|r| r["datetime"] != "2024-01-17T00:00:00"));
    }

    #[test]
    fn test_hourly_merges_observation_and_drops_stale() {
        let mut store = AggregateStore::new();
        store.replace(
            Facet::Hourly,
            json!([
                {"ja": "01", "jf": "202401150800", "jb": "4"},
                {"ja": "01", "jf": "202401151200", "jb": "7", "je": "55", "jj": "1020", "jg": "12"},
                {"ja": "07", "jf": "202401151300", "jb": "6"}
            ]),
        );
        store.replace(
            Facet::ObservationHistory,
            json!({"202401151200": {"rain": 1.2, "wind": "东南风"}}),
        );

        let rows = build_hourly(&store, now());
        // 08:00 is more than 90 minutes old.
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0]["datetime"], "2024-01-15T12:00:00");
        assert_eq!(rows[0]["precipitation"], json!(1.2));
        assert_eq!(rows[0]["wind_bearing"], "东南风");
        assert_eq!(rows[0]["temperature"], json!(7.0));

        // No observation for 13:00: nominal rate, no bearing.
        assert_eq!(rows[1]["precipitation"], json!(0.5));
        assert!(!rows[1].contains_key("wind_bearing"));
    }

    #[test]
    fn test_hourly_row_cap() {
        let items: Vec<Value> = (0..60)
            .map(|i| {
                let stamp = now() + Duration::hours(i);
                json!({"ja": "00", "jf": stamp.format("%Y%m%d%H%M").to_string()})
            })
            .collect();
        let mut store = AggregateStore::new();
        store.replace(Facet::Hourly, Value::Array(items));

        let rows = build_hourly(&store, now());
        assert_eq!(rows.len(), HOURLY_ROW_CAP);
    }

    #[test]
    fn test_missing_facets_yield_empty() {
        let store = AggregateStore::new();
        assert!(build_daily(&store, now()).is_empty());
        assert!(build_hourly(&store, now()).is_empty());
    }
}
