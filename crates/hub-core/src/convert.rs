//! Converter registry and decode pipeline.
//!
//! Converters are registered once at startup and never mutated. Each one
//! declares where it reads from (a facet field, a whole facet, or the whole
//! store for multi-facet synthesis), a transform variant from a closed set,
//! and an opaque display-option bag handed through to consumers unchanged.
//! One decode pass walks the registry in stable order and produces a payload
//! of normalized attributes; a converter whose source is absent is skipped,
//! never an error.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::attrs::{AttrValue, Payload};
use crate::conditions::condition_info;
use crate::error::{HubError, HubResult};
use crate::forecast;
use crate::store::{AggregateStore, Facet};

/// Alarm titles arrive as "<issuer>发布<的><title>"; everything through the
/// issuance verb is boilerplate.
static ALARM_TITLE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^.*?发布的?").expect("static pattern"));

/// Separator used when several distinct alarm titles collapse into one
/// consumer-facing string.
const ALARM_TITLE_JOIN: &str = "、";

// ============================================================================
// Converter definition
// ============================================================================

/// Where a converter reads its raw value from.
#[derive(Debug, Clone)]
pub enum Source {
    /// One field of a facet's top-level object.
    Field(Facet, String),
    /// A facet's whole structured value.
    Whole(Facet),
    /// The whole aggregate store (multi-facet synthesis).
    Store,
}

/// Registration-time enablement. Decode runs for all converters; this flag
/// only steers which attributes get consumers auto-registered by the
/// embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enablement {
    Enabled,
    Disabled,
    Lazy,
}

/// What a numeric converter does when a value fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericPolicy {
    /// Omit the attribute from the payload.
    Drop,
    /// Surface a NumericParse error for this tick (attribute still omitted;
    /// the rest of the pipeline continues).
    Fail,
}

/// The closed set of transform variants.
#[derive(Debug, Clone)]
pub enum Transform {
    Passthrough,
    Numeric {
        unit: Option<String>,
        precision: u32,
        policy: NumericPolicy,
    },
    /// Numeric wind speed plus sibling direction/level attributes read from
    /// the current facet.
    WindSpeed {
        unit: String,
        precision: u32,
        policy: NumericPolicy,
    },
    /// Provider weather code through the condition table.
    Condition,
    /// Alarm list aggregation: has-warning flag, normalized titles, picture
    /// URL, record list.
    Alarms,
    /// Minutely headline plus zipped precipitation series.
    Minutely,
    /// Living-indices name/description map plus headline texts.
    Indices,
    DailyForecast,
    HourlyForecast,
}

/// One registered converter.
#[derive(Debug, Clone)]
pub struct Converter {
    pub attr: String,
    pub source: Source,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub enablement: Enablement,
    /// Opaque display metadata (units, icon, device class) passed through to
    /// consumers unchanged.
    pub options: Map<String, Value>,
    pub transform: Transform,
}

impl Converter {
    pub fn new(attr: &str, source: Source, transform: Transform) -> Self {
        Self {
            attr: attr.to_string(),
            source,
            parent: None,
            children: Vec::new(),
            enablement: Enablement::Enabled,
            options: Map::new(),
            transform,
        }
    }

    /// Plain passthrough of one current-facet field.
    pub fn passthrough(attr: &str, field: &str) -> Self {
        Self::new(
            attr,
            Source::Field(Facet::Current, field.to_string()),
            Transform::Passthrough,
        )
    }

    /// Numeric current-facet field, precision 1, drop-on-parse-failure.
    pub fn numeric(attr: &str, field: &str) -> Self {
        Self::new(
            attr,
            Source::Field(Facet::Current, field.to_string()),
            Transform::Numeric {
                unit: None,
                precision: 1,
                policy: NumericPolicy::Drop,
            },
        )
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        match &mut self.transform {
            Transform::Numeric { unit: u, .. } => *u = Some(unit.to_string()),
            Transform::WindSpeed { unit: u, .. } => *u = unit.to_string(),
            _ => {}
        }
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        match &mut self.transform {
            Transform::Numeric { precision: p, .. }
            | Transform::WindSpeed { precision: p, .. } => *p = precision,
            _ => {}
        }
        self
    }

    pub fn with_policy(mut self, policy: NumericPolicy) -> Self {
        match &mut self.transform {
            Transform::Numeric { policy: p, .. } | Transform::WindSpeed { policy: p, .. } => {
                *p = policy
            }
            _ => {}
        }
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        if let Value::Object(map) = options {
            self.options.extend(map);
        }
        self
    }

    pub fn with_children(mut self, children: &[&str]) -> Self {
        self.children = children.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enablement = Enablement::Disabled;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.enablement = Enablement::Lazy;
        self
    }
}

// ============================================================================
// Decode context
// ============================================================================

/// Per-pass context: the decode clock plus the URL pieces derived
/// attributes need. Two passes with equal context over an unchanged store
/// produce identical payloads.
#[derive(Debug, Clone, Default)]
pub struct DecodeCx {
    pub now: Option<NaiveDateTime>,
    pub area_id: Option<String>,
    pub referer: Option<String>,
    /// Web-node base URL ("https://m.<domain>/") for rendered pictures.
    pub web_base: Option<String>,
}

impl DecodeCx {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            now: Some(now),
            ..Self::default()
        }
    }

    fn clock(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| chrono::Utc::now().naive_utc())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Converter registry keyed by attribute name. Iteration order is the key
/// order, which keeps decode output deterministic.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    converters: BTreeMap<String, Converter>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, converter: Converter) {
        self.converters.insert(converter.attr.clone(), converter);
    }

    pub fn get(&self, attr: &str) -> Option<&Converter> {
        self.converters.get(attr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Converter> {
        self.converters.values()
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// The attribute set a consumer of `attr` subscribes to: the attribute
    /// itself, its declared children, and every attribute whose parent is
    /// `attr`.
    pub fn subscribe_attrs(&self, attr: &str) -> Option<BTreeSet<String>> {
        let converter = self.get(attr)?;
        let mut attrs: BTreeSet<String> = BTreeSet::new();
        attrs.insert(converter.attr.clone());
        attrs.extend(converter.children.iter().cloned());
        attrs.extend(
            self.converters
                .values()
                .filter(|c| c.parent.as_deref() == Some(attr))
                .map(|c| c.attr.clone()),
        );
        Some(attrs)
    }

    /// Run one full decode pass over the store.
    ///
    /// Per-converter failures are contained: the converter's attributes are
    /// omitted and the pass continues.
    pub fn decode(&self, store: &AggregateStore, cx: &DecodeCx) -> Payload {
        let mut payload = Payload::new();
        for converter in self.converters.values() {
            if let Err(e) = apply(converter, store, cx, &mut payload) {
                warn!(attr = %converter.attr, error = %e, "Converter failed; skipping");
            }
        }
        payload
    }
}

/// The converter set for the provider's standard attribute surface.
pub fn default_registry() -> ConverterRegistry {
    let mut registry = ConverterRegistry::new();

    registry.register(Converter::numeric("precipitation", "rain").with_options(json!({
        "device_class": "precipitation",
        "state_class": "measurement",
        "unit_of_measurement": "mm",
    })));
    registry.register(
        Converter::numeric("precipitation_24h", "rain24h").with_options(json!({
            "device_class": "precipitation",
            "state_class": "measurement",
            "unit_of_measurement": "mm",
        })),
    );
    registry.register(Converter::numeric("temperature", "temp").with_options(json!({
        "device_class": "temperature",
        "state_class": "measurement",
        "unit_of_measurement": "°C",
    })));
    registry.register(
        Converter::numeric("humidity", "sd")
            .with_unit("%")
            .with_options(json!({
                "device_class": "humidity",
                "state_class": "measurement",
                "unit_of_measurement": "%",
            })),
    );
    registry.register(Converter::numeric("pm25", "aqi_pm25").with_options(json!({
        "device_class": "pm25",
        "state_class": "measurement",
        "unit_of_measurement": "µg/m³",
    })));
    registry.register(
        Converter::numeric("aqi", "aqi")
            .with_precision(0)
            .with_options(json!({
                "state_class": "measurement",
                "icon": "mdi:blur",
            })),
    );
    registry.register(
        Converter::numeric("atmospheric_pressure", "qy").with_options(json!({
            "device_class": "atmospheric_pressure",
            "state_class": "measurement",
            "unit_of_measurement": "hPa",
        })),
    );
    registry.register(
        Converter::numeric("visibility", "njd")
            .with_unit("km")
            .with_options(json!({
                "device_class": "distance",
                "state_class": "measurement",
                "unit_of_measurement": "km",
            })),
    );
    registry.register(
        Converter::new(
            "wind_speed",
            Source::Field(Facet::Current, "wse".to_string()),
            Transform::WindSpeed {
                unit: "km/h".to_string(),
                precision: 1,
                policy: NumericPolicy::Drop,
            },
        )
        .with_children(&[
            "wind_direction",
            "wind_direction_code",
            "wind_level",
            "wind_speed_and_unit",
        ])
        .with_options(json!({
            "device_class": "wind_speed",
            "state_class": "measurement",
            "unit_of_measurement": "km/h",
        })),
    );
    registry.register(
        Converter::new(
            "condition",
            Source::Field(Facet::Current, "weathercode".to_string()),
            Transform::Condition,
        )
        .with_children(&["condition_desc", "skycon"]),
    );
    registry.register(
        Converter::new("alarms", Source::Whole(Facet::Alarms), Transform::Alarms).with_children(
            &["alarms_title", "alarms_pic", "alarms_records"],
        ),
    );
    registry.register(
        Converter::new(
            "forecast_minutely",
            Source::Whole(Facet::Minutely),
            Transform::Minutely,
        )
        .with_children(&["minutely_precipitation"])
        .with_options(json!({"icon": "mdi:weather-pouring"})),
    );
    registry.register(
        Converter::new("indices", Source::Whole(Facet::Indices), Transform::Indices)
            .with_children(&["forecast_keypoint", "forecast_hourly_desc"]),
    );
    registry.register(Converter::new(
        "forecast_daily",
        Source::Store,
        Transform::DailyForecast,
    ));
    registry.register(Converter::new(
        "forecast_hourly",
        Source::Store,
        Transform::HourlyForecast,
    ));
    registry.register(Converter::passthrough("updated_time", "time"));
    registry.register(
        Converter::passthrough("limit_number", "limitnumber")
            .disabled()
            .with_options(json!({"icon": "mdi:counter"})),
    );

    registry
}

// ============================================================================
// Transform application
// ============================================================================

fn apply(
    converter: &Converter,
    store: &AggregateStore,
    cx: &DecodeCx,
    payload: &mut Payload,
) -> HubResult<()> {
    let value = match &converter.source {
        Source::Field(facet, field) => match store.field(*facet, field) {
            Some(v) => Some(v),
            None => return Ok(()), // no data yet for this attribute
        },
        Source::Whole(facet) => match store.facet(*facet) {
            Some(v) => Some(v),
            None => return Ok(()),
        },
        Source::Store => None,
    };

    match &converter.transform {
        Transform::Passthrough => {
            if let Some(attr) = value.and_then(json_to_attr) {
                payload.insert(converter.attr.clone(), attr);
            }
        }
        Transform::Numeric {
            unit,
            precision,
            policy,
        } => {
            let Some(raw) = value else { return Ok(()) };
            match decode_numeric(raw, unit.as_deref(), *precision) {
                Some(n) => {
                    payload.insert(converter.attr.clone(), AttrValue::Number(n));
                }
                None => return numeric_failure(converter, raw, *policy),
            }
        }
        Transform::WindSpeed {
            unit,
            precision,
            policy,
        } => {
            let Some(raw) = value else { return Ok(()) };
            let Some(speed) = decode_numeric(raw, Some(unit.as_str()), *precision) else {
                return numeric_failure(converter, raw, *policy);
            };
            payload.insert(converter.attr.clone(), AttrValue::Number(speed));
            let siblings = [
                ("wind_direction", "WD"),
                ("wind_direction_code", "wde"),
                ("wind_level", "WS"),
                ("wind_speed_and_unit", "wse"),
            ];
            for (attr, field) in siblings {
                if let Some(text) = store.field(Facet::Current, field).and_then(Value::as_str) {
                    payload.insert(attr.to_string(), AttrValue::Text(text.to_string()));
                }
            }
        }
        Transform::Condition => {
            let code = value.and_then(Value::as_str).unwrap_or_default();
            let Some(info) = condition_info(code) else {
                return Ok(());
            };
            payload.insert(
                converter.attr.clone(),
                AttrValue::Text(info.condition.as_str().to_string()),
            );
            payload.insert("skycon".to_string(), AttrValue::Text(info.skycon.to_string()));
            if let Some(desc) = store.field(Facet::Current, "weather").and_then(Value::as_str) {
                payload.insert("condition_desc".to_string(), AttrValue::Text(desc.to_string()));
            }
        }
        Transform::Alarms => {
            let alarms = value.and_then(Value::as_array).cloned().unwrap_or_default();
            decode_alarms(&alarms, cx, &converter.attr, payload);
        }
        Transform::Minutely => {
            let Some(doc) = value else { return Ok(()) };
            if let Some(msg) = doc.get("msg").and_then(Value::as_str) {
                payload.insert(converter.attr.clone(), AttrValue::Text(msg.to_string()));
            }
            payload.insert(
                "minutely_precipitation".to_string(),
                AttrValue::NumberSeries(zip_minutely(doc)),
            );
        }
        Transform::Indices => {
            let Some(doc) = value else { return Ok(()) };
            let indices = decode_indices(doc);
            if !indices.is_empty() {
                payload.insert(converter.attr.clone(), AttrValue::TextMap(indices));
            }
            if let Some(text) = doc.get("ys_des_s").and_then(Value::as_str) {
                payload.insert(
                    "forecast_keypoint".to_string(),
                    AttrValue::Text(text.to_string()),
                );
            }
            if let Some(text) = doc.get("ct_des_s").and_then(Value::as_str) {
                payload.insert(
                    "forecast_hourly_desc".to_string(),
                    AttrValue::Text(text.to_string()),
                );
            }
        }
        Transform::DailyForecast => {
            let rows = forecast::build_daily(store, cx.clock());
            if !rows.is_empty() {
                payload.insert(converter.attr.clone(), AttrValue::Records(rows));
            }
        }
        Transform::HourlyForecast => {
            let rows = forecast::build_hourly(store, cx.clock());
            if !rows.is_empty() {
                payload.insert(converter.attr.clone(), AttrValue::Records(rows));
            }
        }
    }
    Ok(())
}

fn numeric_failure(converter: &Converter, raw: &Value, policy: NumericPolicy) -> HubResult<()> {
    match policy {
        NumericPolicy::Drop => Ok(()),
        NumericPolicy::Fail => Err(HubError::NumericParse {
            attr: converter.attr.clone(),
            raw: raw_text(raw),
        }),
    }
}

/// Strip the unit substring, trim, and round half-up at `precision`.
fn decode_numeric(raw: &Value, unit: Option<&str>, precision: u32) -> Option<f64> {
    let mut text = raw_text(raw);
    if let Some(unit) = unit {
        if !unit.is_empty() {
            text = text.replace(unit, "");
        }
    }
    round_half_up(text.trim(), precision)
}

fn raw_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Deterministic half-up rounding on the decimal text itself.
///
/// Binary floats cannot represent most provider decimals exactly, so
/// `(x * 10^p).round()` misrounds ties like 23.45; operating on the digits
/// keeps `23.45 -> 23.5` and `23.44 -> 23.4` exact. Halves round away from
/// zero.
fn round_half_up(raw: &str, precision: u32) -> Option<f64> {
    let text = raw.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let precision = precision as usize;
    let kept = &frac_part[..frac_part.len().min(precision)];
    let mut scaled: i64 = 0;
    for b in int_part.bytes().chain(kept.bytes()) {
        scaled = scaled.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
    }
    for _ in kept.len()..precision {
        scaled = scaled.checked_mul(10)?;
    }
    if frac_part.len() > precision && frac_part.as_bytes()[precision] >= b'5' {
        scaled = scaled.checked_add(1)?;
    }

    let mut value = scaled as f64 / 10f64.powi(precision as i32);
    if negative {
        value = -value;
    }
    Some(value)
}

fn decode_alarms(alarms: &[Value], cx: &DecodeCx, attr: &str, payload: &mut Payload) {
    payload.insert(attr.to_string(), AttrValue::Bool(!alarms.is_empty()));
    if alarms.is_empty() {
        return;
    }

    // Normalized titles, de-duplicated but order-preserving.
    let mut titles: Vec<String> = Vec::new();
    for alarm in alarms {
        let Some(title) = alarm.get("w13").and_then(Value::as_str) else {
            continue;
        };
        let stripped = ALARM_TITLE_PREFIX.replace(title, "").to_string();
        let stripped = if stripped.is_empty() {
            title.to_string()
        } else {
            stripped
        };
        if !titles.contains(&stripped) {
            titles.push(stripped);
        }
    }
    if !titles.is_empty() {
        payload.insert(
            "alarms_title".to_string(),
            AttrValue::Text(titles.join(ALARM_TITLE_JOIN)),
        );
    }

    if let (Some(base), Some(code)) = (&cx.web_base, alarm_code(&alarms[0])) {
        payload.insert(
            "alarms_pic".to_string(),
            AttrValue::Text(format!("{base}alarmpic/{code}.gif")),
        );
    }

    let records: Vec<Map<String, Value>> = alarms
        .iter()
        .map(|alarm| {
            let mut record = Map::new();
            record.insert("province".into(), alarm.get("w1").cloned().unwrap_or(Value::Null));
            record.insert("city".into(), alarm.get("w2").cloned().unwrap_or(Value::Null));
            record.insert(
                "code".into(),
                alarm_code(alarm).map(Value::String).unwrap_or(Value::Null),
            );
            record.insert("title".into(), alarm.get("w13").cloned().unwrap_or(Value::String(String::new())));
            record.insert(
                "description".into(),
                alarm.get("w9").cloned().unwrap_or(Value::String(String::new())),
            );
            record.insert("alert_id".into(), alarm.get("w16").cloned().unwrap_or(Value::Null));
            if let (Some(referer), Some(area_id)) = (&cx.referer, &cx.area_id) {
                record.insert(
                    "link".into(),
                    Value::String(format!("{referer}warning/publish_area.shtml?code={area_id}")),
                );
            }
            record
        })
        .collect();
    payload.insert("alarms_records".to_string(), AttrValue::Records(records));
}

/// Alarm kind code: severity family and level concatenated.
fn alarm_code(alarm: &Value) -> Option<String> {
    let family = alarm.get("w4").and_then(Value::as_str)?;
    let level = alarm.get("w6").and_then(Value::as_str)?;
    Some(format!("{family}{level}"))
}

/// Zip the parallel time/value arrays into an ordered series; mismatched
/// lengths mean the provider sent a torn document, so the series is empty.
fn zip_minutely(doc: &Value) -> BTreeMap<String, f64> {
    let mut series = BTreeMap::new();
    let (Some(times), Some(values)) = (
        doc.get("time").and_then(Value::as_array),
        doc.get("precipitation").and_then(Value::as_array),
    ) else {
        return series;
    };
    if times.len() != values.len() {
        return series;
    }
    for (time, value) in times.iter().zip(values) {
        let key = match time {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let Some(amount) = value.as_f64().or_else(|| {
            value.as_str().and_then(|s| s.trim().parse().ok())
        }) else {
            continue;
        };
        series.insert(key, amount);
    }
    series
}

fn decode_indices(doc: &Value) -> BTreeMap<String, String> {
    let mut indices = BTreeMap::new();
    let Some(map) = doc.as_object() else {
        return indices;
    };
    for (key, value) in map {
        let Some(base) = key.strip_suffix("_name") else {
            continue;
        };
        let Some(name) = value.as_str() else {
            continue;
        };
        let Some(description) = map.get(&format!("{base}_des_s")).and_then(Value::as_str) else {
            continue;
        };
        indices.insert(name.to_string(), description.to_string());
    }
    indices
}

fn json_to_attr(value: &Value) -> Option<AttrValue> {
    match value {
        Value::String(s) => Some(AttrValue::Text(s.clone())),
        Value::Number(n) => n.as_f64().map(AttrValue::Number),
        Value::Bool(b) => Some(AttrValue::Bool(*b)),
        Value::Array(items) => {
            let records: Option<Vec<Map<String, Value>>> = items
                .iter()
                .map(|v| v.as_object().cloned())
                .collect();
            records.map(AttrValue::Records)
        }
        _ => None,
    }
}
