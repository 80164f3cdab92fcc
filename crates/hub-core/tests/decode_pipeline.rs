//! End-to-end decode pipeline tests: provider-shaped fixture pages through
//! extraction, the aggregate store, the converter registry and the change
//! notifier.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use hub_core::extract::{extract, DAILY_FC_MARKER, DATA_SK_MARKER, DATA_ZS_MARKER};
use hub_core::{
    default_registry, AggregateStore, AttrValue, ChangeNotifier, Consumer, DecodeCx, Facet,
    Payload,
};
use serde_json::{json, Value};

// ============================================================================
// Fixtures
// ============================================================================

const SUMMARY_PAGE: &str = r#"
<script>
var dataSK = dataSK || {};
dataSK = {
    "temp": "23.45",
    "sd": "41%",
    "rain": "0.5",
    "qy": "1013",
    "njd": "16km",
    "wse": "12km/h",
    "WD": "东南风",
    "wde": "SE",
    "WS": "3级",
    "weathercode": "d01",
    "weather": "多云",
    "time": "14:25",
    "aqi": "58",
    "aqi_pm25": "37"
};
dataZS = {
    "zs": {
        "ct_name": "穿衣",
        "ct_des_s": "天气舒适",
        "ys_des_s": "无需带伞"
    }
};
</script>
"#;

const DAILY_PAGE: &str = r#"fc = {"f": [
    {"fa": "01", "fi": "1/15", "fc": "10", "fd": "2", "fn": "40", "fe": "北风"},
    {"fa": "07", "fi": "1/16", "fc": "8", "fd": "1"}
]}"#;

fn fixture_store() -> AggregateStore {
    let mut store = AggregateStore::new();

    let current = extract(SUMMARY_PAGE, &DATA_SK_MARKER).unwrap().unwrap();
    store.replace(Facet::Current, current);

    let indices = extract(SUMMARY_PAGE, &DATA_ZS_MARKER).unwrap().unwrap();
    store.replace(Facet::Indices, indices["zs"].clone());

    let daily = extract(DAILY_PAGE, &DAILY_FC_MARKER).unwrap().unwrap();
    store.replace(Facet::Daily, daily["f"].clone());

    store.replace(
        Facet::Minutely,
        json!({
            "msg": "两小时内无降水",
            "time": ["14:00", "14:05", "14:10"],
            "precipitation": [0.0, 0.1, 0.0]
        }),
    );

    store
}

fn fixture_cx() -> DecodeCx {
    let mut cx = DecodeCx::at(
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap(),
    );
    cx.area_id = Some("101010100".to_string());
    cx.referer = Some("https://m.weather.example.cn/".to_string());
    cx.web_base = Some("https://m.weather.example.cn/".to_string());
    cx
}

// ============================================================================
// Full pipeline
// ============================================================================

#[test]
fn test_fixture_pages_decode_to_normalized_attributes() {
    let payload = default_registry().decode(&fixture_store(), &fixture_cx());

    // Numeric conversions, half-up at precision 1.
    assert_eq!(payload["temperature"], AttrValue::Number(23.5));
    assert_eq!(payload["humidity"], AttrValue::Number(41.0));
    assert_eq!(payload["visibility"], AttrValue::Number(16.0));
    assert_eq!(payload["wind_speed"], AttrValue::Number(12.0));
    assert_eq!(payload["aqi"], AttrValue::Number(58.0));

    // Wind sibling group arrives with the speed.
    assert_eq!(payload["wind_direction"], AttrValue::Text("东南风".into()));
    assert_eq!(payload["wind_level"], AttrValue::Text("3级".into()));

    // Condition code mapped through the table.
    assert_eq!(payload["condition"], AttrValue::Text("partlycloudy".into()));
    assert_eq!(payload["condition_desc"], AttrValue::Text("多云".into()));

    // Indices and headline texts.
    let AttrValue::TextMap(indices) = &payload["indices"] else {
        panic!("expected indices map");
    };
    assert_eq!(indices["穿衣"], "天气舒适");
    assert_eq!(payload["forecast_keypoint"], AttrValue::Text("无需带伞".into()));

    // Daily forecast: today's row takes the measured rain.
    let rows = payload["forecast_daily"].as_records().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["precipitation"], json!(0.5));
    assert_eq!(rows[1]["condition"], "rainy");

    // Minutely series zipped.
    let AttrValue::NumberSeries(series) = &payload["minutely_precipitation"] else {
        panic!("expected minutely series");
    };
    assert_eq!(series.len(), 3);

    // Absent facets stay absent: no alarm attributes without an alarms
    // facet, rather than a decode failure.
    assert!(!payload.contains_key("alarms"));
}

#[test]
fn test_decode_is_idempotent_on_unchanged_snapshot() {
    let store = fixture_store();
    let cx = fixture_cx();
    let registry = default_registry();

    let first = registry.decode(&store, &cx);
    let second = registry.decode(&store, &cx);
    assert_eq!(first, second);

    // Byte-identical when serialized, not merely structurally equal.
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[test]
fn test_partial_store_decodes_partially() {
    let mut store = AggregateStore::new();
    store.replace(Facet::Current, json!({"temp": "5.0"}));

    let payload = default_registry().decode(&store, &fixture_cx());
    assert_eq!(payload["temperature"], AttrValue::Number(5.0));
    assert!(!payload.contains_key("humidity"));
    assert!(!payload.contains_key("forecast_daily"));
}

// ============================================================================
// Notifier integration
// ============================================================================

#[derive(Default)]
struct Recorder {
    deliveries: Mutex<Vec<Payload>>,
}

impl Consumer for Recorder {
    fn on_payload(&self, payload: &Payload) {
        self.deliveries.lock().unwrap().push(payload.clone());
    }
}

#[test]
fn test_decode_then_notify_delivers_full_payload_to_interested() {
    let registry = default_registry();
    let notifier = ChangeNotifier::new();

    let wind = Arc::new(Recorder::default());
    notifier.register(
        "wind_speed",
        registry.subscribe_attrs("wind_speed").unwrap(),
        wind.clone(),
    );

    let alarms = Arc::new(Recorder::default());
    notifier.register(
        "alarms",
        registry.subscribe_attrs("alarms").unwrap(),
        alarms.clone(),
    );

    let payload = registry.decode(&fixture_store(), &fixture_cx());
    notifier.notify(&payload);

    // The wind consumer intersects (wind_speed et al.) and receives the
    // complete payload.
    let deliveries = wind.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].contains_key("temperature"));

    // No alarms facet was fetched, so the alarm consumer sees nothing.
    assert!(alarms.deliveries.lock().unwrap().is_empty());
}

#[test]
fn test_consumer_subscription_covers_sibling_group() {
    let registry = default_registry();
    let subscribed: BTreeSet<String> = registry.subscribe_attrs("alarms").unwrap();
    assert!(subscribed.contains("alarms"));
    assert!(subscribed.contains("alarms_title"));
    assert!(subscribed.contains("alarms_pic"));
    assert!(subscribed.contains("alarms_records"));
}

// ============================================================================
// Degraded facets
// ============================================================================

#[test]
fn test_degraded_facet_keeps_decoding_previous_value() {
    let mut store = fixture_store();
    store.set_error(Facet::Current, "<html>502</html>".to_string());

    let payload = default_registry().decode(&store, &fixture_cx());
    // The stale current value still decodes; the error text is diagnostics,
    // not data.
    assert_eq!(payload["temperature"], AttrValue::Number(23.5));

    let raw: Value = serde_json::to_value(&store).unwrap();
    assert_eq!(raw["facets"]["current_error_text"], "<html>502</html>");
}
