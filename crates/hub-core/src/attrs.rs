//! Normalized output attribute values.
//!
//! The provider's raw fields are decoded into a closed set of value kinds
//! instead of an untyped attribute bag; anything list-shaped keeps its raw
//! records so consumers can pick fields themselves.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// One decoded attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Bool(bool),
    Text(String),
    /// Parallel time/value pairs zipped into an ordered series.
    NumberSeries(BTreeMap<String, f64>),
    /// Name -> description mappings (e.g. living indices).
    TextMap(BTreeMap<String, String>),
    /// Normalized record lists (alarms, forecasts).
    Records(Vec<Map<String, Value>>),
}

impl AttrValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Map<String, Value>]> {
        match self {
            AttrValue::Records(r) => Some(r),
            _ => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

/// One full decode pass: attribute name -> value, in stable order.
pub type Payload = BTreeMap<String, AttrValue>;
