//! Station identity resolution.
//!
//! A geographic query (explicit area id, explicit coordinates, or the
//! configured fallback coordinates) resolves once per client lifetime to a
//! canonical station record; every facet URL is built from it.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::config::StationConfig;
use crate::error::{HubError, HubResult};

/// Sentinel area id meaning "resolve by coordinates instead".
pub const AREA_AUTO: &str = "auto";

/// Canonical station identity, immutable after resolution.
#[derive(Debug, Clone)]
pub struct Station {
    pub area_id: String,
    /// Display name (provider-native).
    pub name: String,
    /// Short latin code.
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    /// The merged raw record, kept for diagnostics.
    pub raw: Map<String, Value>,
}

impl Station {
    /// Best label for logs and entity ids: short code, else display name.
    pub fn label(&self) -> &str {
        if !self.code.is_empty() {
            &self.code
        } else {
            &self.name
        }
    }
}

/// Resolution query, decided before any HTTP is issued.
#[derive(Debug, Clone, PartialEq)]
pub enum StationQuery {
    AreaId(String),
    Coordinates { lat: f64, lng: f64 },
}

impl StationQuery {
    /// Pick the resolution branch. Exactly one wins: explicit non-"auto"
    /// area id, else explicit coordinates, else configured coordinates.
    pub fn select(
        area_id: Option<&str>,
        lat: Option<f64>,
        lng: Option<f64>,
        fallback: &StationConfig,
    ) -> HubResult<Self> {
        if let Some(id) = area_id {
            if id != AREA_AUTO && !id.is_empty() {
                return Ok(StationQuery::AreaId(id.to_string()));
            }
        }
        if let (Some(lat), Some(lng)) = (lat, lng) {
            return Ok(StationQuery::Coordinates { lat, lng });
        }
        if let (Some(lat), Some(lng)) = (fallback.latitude, fallback.longitude) {
            return Ok(StationQuery::Coordinates { lat, lng });
        }
        Err(HubError::InvalidArguments(
            "station resolution needs an area id, coordinates, or configured fallback coordinates"
                .to_string(),
        ))
    }

    /// The JSON query object sent in the geolocation endpoint's `params`
    /// query parameter.
    pub fn to_params(&self) -> Value {
        match self {
            StationQuery::AreaId(id) => json!({"method": "stationinfo", "areaid": id}),
            StationQuery::Coordinates { lat, lng } => {
                json!({"method": "stationinfo", "lat": lat, "lng": lng})
            }
        }
    }
}

/// Parse the geolocation endpoint response into a Station.
///
/// The response carries a `location` object and a `data.station` object;
/// they are merged with station fields winning on key collision. A missing
/// station record is a lookup failure, not an empty station.
pub fn parse_station_response(body: &str) -> HubResult<Station> {
    let doc: Value = serde_json::from_str(body)
        .map_err(|e| HubError::StationLookupFailed(format!("{e}:\n{body}")))?;

    let station = doc
        .pointer("/data/station")
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            HubError::StationLookupFailed(format!("no station record in response: {body}"))
        })?;

    let mut merged = doc
        .get("location")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for (k, v) in station {
        merged.insert(k.clone(), v.clone());
    }

    let area_id = text_field(&merged, "areaid").ok_or_else(|| {
        HubError::StationLookupFailed(format!("station record lacks areaid: {body}"))
    })?;

    Ok(Station {
        area_id,
        name: text_field(&merged, "namecn").unwrap_or_default(),
        code: text_field(&merged, "nameen").unwrap_or_default(),
        latitude: number_field(&merged, "lat").unwrap_or(0.0),
        longitude: number_field(&merged, "lng").unwrap_or(0.0),
        raw: merged,
    })
}

/// Parse the free-text area search response into area_id -> display label.
///
/// The body is a paren-wrapped JSON array of `{"ref": "id~..~name.."}`
/// entries; refs with an over-long id or fewer than ten fields are noise
/// rows and skipped.
pub fn parse_search_response(body: &str) -> HubResult<BTreeMap<String, String>> {
    let trimmed = body
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(';')
        .trim_end_matches(')');
    let rows: Vec<Value> = serde_json::from_str(trimmed)
        .map_err(|e| HubError::StationLookupFailed(format!("area search response: {e}")))?;

    let mut areas = BTreeMap::new();
    for row in rows {
        let Some(reference) = row.get("ref").and_then(Value::as_str) else {
            continue;
        };
        let parts: Vec<&str> = reference.split('~').collect();
        let area_id = parts[0];
        if area_id.len() > 9 || parts.len() < 10 {
            continue;
        }
        areas.insert(area_id.to_string(), format!("{}-{}", parts[9], parts[2]));
    }
    Ok(areas)
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_fallback() -> StationConfig {
        StationConfig::default()
    }

    fn with_fallback() -> StationConfig {
        StationConfig {
            area_id: None,
            latitude: Some(39.9),
            longitude: Some(116.4),
        }
    }

    #[test]
    fn test_select_prefers_area_id() {
        let q = StationQuery::select(Some("101010100"), Some(1.0), Some(2.0), &no_fallback());
        assert_eq!(q.unwrap(), StationQuery::AreaId("101010100".to_string()));
    }

    #[test]
    fn test_select_auto_defers_to_coordinates() {
        let q = StationQuery::select(Some(AREA_AUTO), Some(31.2), Some(121.5), &no_fallback());
        assert_eq!(
            q.unwrap(),
            StationQuery::Coordinates { lat: 31.2, lng: 121.5 }
        );
    }

    #[test]
    fn test_select_falls_back_to_config() {
        let q = StationQuery::select(None, None, None, &with_fallback()).unwrap();
        assert_eq!(q, StationQuery::Coordinates { lat: 39.9, lng: 116.4 });
    }

    #[test]
    fn test_select_nothing_is_invalid_arguments() {
        let err = StationQuery::select(None, None, None, &no_fallback()).unwrap_err();
        assert!(matches!(err, HubError::InvalidArguments(_)));
    }

    #[test]
    fn test_parse_station_merges_with_station_precedence() {
        let body = r#"{
            "location": {"areaid": "wrong", "province": "北京", "lat": "39.80"},
            "data": {"station": {"areaid": "101010100", "namecn": "北京", "nameen": "beijing", "lat": "39.93", "lng": "116.42"}}
        }"#;
        let station = parse_station_response(body).unwrap();
        assert_eq!(station.area_id, "101010100");
        assert_eq!(station.name, "北京");
        assert_eq!(station.code, "beijing");
        assert!((station.latitude - 39.93).abs() < 1e-9);
        // location-only fields survive the merge
        assert_eq!(station.raw["province"], "北京");
    }

    #[test]
    fn test_parse_station_missing_record_fails() {
        let err = parse_station_response(r#"{"data": {}}"#).unwrap_err();
        assert!(matches!(err, HubError::StationLookupFailed(_)));

        let err = parse_station_response("not json").unwrap_err();
        assert!(matches!(err, HubError::StationLookupFailed(_)));
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"({"i": [1]})"#; // not an array
        assert!(parse_search_response(body).is_err());

        let body = r#"([
            {"ref": "101010100~beijing~北京~a~b~c~d~e~f~北京市"},
            {"ref": "1234567890123~x~y~a~b~c~d~e~f~long-id"},
            {"ref": "10101~short"},
            {"noref": true}
        ])"#;
        let areas = parse_search_response(body).unwrap();
        assert_eq!(areas.len(), 1);
        assert_eq!(areas["101010100"], "北京市-北京");
    }
}
