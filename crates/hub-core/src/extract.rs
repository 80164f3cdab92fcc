//! Embedded-fragment extraction.
//!
//! The provider serves most facets as HTML or script files with the actual
//! data assigned to inline script variables (`dataSK = {...};`,
//! `var alarmDZ101010100 = {...}`). Each fetcher locates its fragment with a
//! marker pattern and parses the captured braces as JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{HubError, HubResult};

/// A compiled marker pattern for one embedded fragment.
///
/// Patterns run with dot-matches-newline: the embedded objects span many
/// lines in the provider markup.
pub struct Marker {
    pub name: &'static str,
    regex: &'static LazyLock<Regex>,
}

macro_rules! marker {
    ($static_name:ident, $name:ident, $pattern:literal) => {
        static $static_name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).expect("static marker pattern"));
        pub static $name: Marker = Marker {
            name: stringify!($static_name),
            regex: &$static_name,
        };
    };
}

// Current conditions and living indices share one page.
marker!(DATA_SK, DATA_SK_MARKER, r"(?s)dataSK\s*=\s*(\{.*?\})\s*;");
marker!(DATA_ZS, DATA_ZS_MARKER, r"(?s)dataZS\s*=\s*(\{.*?\})\s*;");
// Alarm and forecast variables run greedily to the end of the script.
marker!(ALARM_DZ, ALARM_DZ_MARKER, r"(?s)var alarmDZ\w*\s*=\s*(\{.*\})");
marker!(DAILY_FC, DAILY_FC_MARKER, r"(?s)fc\s*=\s*(\{.*\})");
marker!(HOURLY_FC, HOURLY_FC_MARKER, r"(?s)fc180\s*=\s*(\{.*\})");
marker!(
    OBSERVE_24H,
    OBSERVE_24H_MARKER,
    r"(?s)observe24h_data\s*=\s*(\{.*?\})\s*;"
);

/// Locate `marker` in `text` and parse the captured fragment as JSON.
///
/// Returns `Ok(None)` when the marker is absent. A marker that matches but
/// captures invalid JSON means the provider changed its output format; that
/// surfaces as `MalformedPayload` so the facet refresh fails visibly instead
/// of silently yielding nothing.
pub fn extract(text: &str, marker: &Marker) -> HubResult<Option<Value>> {
    let Some(caps) = marker.regex.captures(text) else {
        return Ok(None);
    };
    let fragment = &caps[1];
    serde_json::from_str(fragment)
        .map(Some)
        .map_err(|source| HubError::MalformedPayload {
            marker: marker.name.to_string(),
            source,
        })
}
