//! Shared aggregate document merging all facets.
//!
//! Each facet key is fully overwritten on a successful refresh of that
//! facet; a failed refresh leaves the previous value in place and records
//! the raw failing response under a sibling `<facet>_error_text` key, which
//! the next success clears. Only one job ever writes a given facet key.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// One named category of weather data, fetched and refreshed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Current,
    Indices,
    Alarms,
    Daily,
    Hourly,
    Minutely,
    ObservationHistory,
}

impl Facet {
    pub const ALL: [Facet; 7] = [
        Facet::Current,
        Facet::Indices,
        Facet::Alarms,
        Facet::Daily,
        Facet::Hourly,
        Facet::Minutely,
        Facet::ObservationHistory,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Facet::Current => "current",
            Facet::Indices => "indices",
            Facet::Alarms => "alarms",
            Facet::Daily => "daily",
            Facet::Hourly => "hourly",
            Facet::Minutely => "minutely",
            Facet::ObservationHistory => "observation_history",
        }
    }

    pub fn error_key(&self) -> String {
        format!("{}_error_text", self.key())
    }
}

impl std::fmt::Display for Facet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// In-memory document holding the latest structured value per facet.
///
/// Readers (converters, the status API) never mutate it; mutation is
/// whole-facet-key replacement by the owning fetch job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStore {
    facets: BTreeMap<String, Value>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest structured value for a facet, if any refresh succeeded yet.
    pub fn facet(&self, facet: Facet) -> Option<&Value> {
        self.facets.get(facet.key())
    }

    /// One field inside a facet's top-level object.
    pub fn field(&self, facet: Facet, field: &str) -> Option<&Value> {
        self.facet(facet)?.get(field)
    }

    /// Raw failing response text recorded for a facet, if its last refresh
    /// degraded or failed.
    pub fn error_text(&self, facet: Facet) -> Option<&str> {
        self.facets.get(&facet.error_key())?.as_str()
    }

    /// Replace a facet's value after a successful refresh; clears the
    /// facet's error key.
    pub fn replace(&mut self, facet: Facet, value: Value) {
        self.facets.insert(facet.key().to_string(), value);
        self.facets.remove(&facet.error_key());
    }

    /// Record a degraded/failed refresh: keep the previous structured value
    /// untouched, store the raw failing response.
    pub fn set_error(&mut self, facet: Facet, raw: String) {
        self.facets.insert(facet.error_key(), Value::String(raw));
    }

    /// Clear a facet's error key without touching its value (successful
    /// fetch whose page simply lacked the marker).
    pub fn clear_error(&mut self, facet: Facet) {
        self.facets.remove(&facet.error_key());
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// All keys currently present, facet values and error texts alike.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.facets.keys().map(String::as_str)
    }
}
