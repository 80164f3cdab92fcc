//! Aggregation client.
//!
//! One client owns one resolved station, the shared aggregate store, the
//! converter registry and the change notifier. Each facet has a refresher
//! that fetches, extracts and merges; the current-conditions refresh is the
//! only one followed by a decode + notify pass (other facets surface in
//! derived attributes on the next current tick).

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::attrs::Payload;
use crate::config::ClientConfig;
use crate::convert::{default_registry, ConverterRegistry, DecodeCx};
use crate::error::{HubError, HubResult};
use crate::extract::{
    extract, Marker, ALARM_DZ_MARKER, DAILY_FC_MARKER, DATA_SK_MARKER, DATA_ZS_MARKER,
    HOURLY_FC_MARKER, OBSERVE_24H_MARKER,
};
use crate::http::{FetchedText, Node, ProviderHttp};
use crate::notify::{ChangeNotifier, Consumer, ConsumerHandle};
use crate::observe::reconstruct_history;
use crate::station::{parse_search_response, parse_station_response, Station, StationQuery};
use crate::store::{AggregateStore, Facet};

pub struct WeatherClient {
    config: ClientConfig,
    http: ProviderHttp,
    station: RwLock<Option<Station>>,
    store: RwLock<AggregateStore>,
    converters: ConverterRegistry,
    notifier: ChangeNotifier,
}

impl std::fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherClient")
            .field("config", &self.config)
            .field("station", &self.station)
            .finish_non_exhaustive()
    }
}

impl WeatherClient {
    /// Build a client with the standard converter set. No network is
    /// touched until `init`.
    pub fn new(config: ClientConfig) -> HubResult<Self> {
        Self::with_registry(config, default_registry())
    }

    pub fn with_registry(config: ClientConfig, converters: ConverterRegistry) -> HubResult<Self> {
        let http = ProviderHttp::new(config.provider.clone())?;
        Ok(Self {
            config,
            http,
            station: RwLock::new(None),
            store: RwLock::new(AggregateStore::new()),
            converters,
            notifier: ChangeNotifier::new(),
        })
    }

    /// Resolve the station from the configured query. Fatal on failure:
    /// without a station no facet URL can be built.
    pub async fn init(&self) -> HubResult<()> {
        if self.station.read().expect("station lock").is_some() {
            return Ok(());
        }
        let station = self
            .resolve_station(
                self.config.station.area_id.as_deref(),
                self.config.station.latitude,
                self.config.station.longitude,
            )
            .await?;
        info!(area_id = %station.area_id, name = %station.name, "Resolved station");
        *self.station.write().expect("station lock") = Some(station);
        Ok(())
    }

    /// Resolve a station without storing it. `init` and explicit
    /// re-resolution both go through here.
    pub async fn resolve_station(
        &self,
        area_id: Option<&str>,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> HubResult<Station> {
        let query = StationQuery::select(area_id, lat, lng, &self.config.station)?;
        let url = self.http.api_url("geong/v1/api", Node::Geo);
        let params = vec![(
            "params".to_string(),
            serde_json::to_string(&query.to_params())
                .map_err(|e| HubError::StationLookupFailed(e.to_string()))?,
        )];
        let page = self.http.get_text(&url, &params).await.map_err(|e| {
            HubError::StationLookupFailed(format!("geolocation request failed: {e}"))
        })?;
        parse_station_response(&page.body)
    }

    /// Re-resolve with a new area id, replacing the stored station.
    pub async fn set_area(&self, area_id: &str) -> HubResult<Station> {
        let station = self.resolve_station(Some(area_id), None, None).await?;
        info!(area_id = %station.area_id, "Station re-resolved");
        *self.station.write().expect("station lock") = Some(station.clone());
        Ok(station)
    }

    /// Free-text area lookup for configuration frontends; not used by the
    /// polling core.
    pub async fn search_areas(&self, name: &str) -> HubResult<BTreeMap<String, String>> {
        let url = self.http.api_url("search", Node::Search);
        let params = vec![("cityname".to_string(), name.to_string())];
        let page = self.http.get_text(&url, &params).await?;
        parse_search_response(&page.body)
    }

    pub fn station(&self) -> HubResult<Station> {
        self.station
            .read()
            .expect("station lock")
            .clone()
            .ok_or_else(|| {
                HubError::StationLookupFailed("station not resolved; call init first".to_string())
            })
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// A consistent copy of the aggregate store.
    pub fn store_snapshot(&self) -> AggregateStore {
        self.store.read().expect("store lock").clone()
    }

    /// Register a consumer for one attribute. The subscription set is the
    /// attribute, its converter's children, and attributes declaring it as
    /// parent. Duplicate registrations return the existing handle.
    pub fn register_consumer(
        &self,
        attr: &str,
        sink: std::sync::Arc<dyn Consumer>,
    ) -> HubResult<ConsumerHandle> {
        let subscribed = self.converters.subscribe_attrs(attr).ok_or_else(|| {
            HubError::InvalidArguments(format!("no converter owns attribute '{attr}'"))
        })?;
        Ok(self.notifier.register(attr, subscribed, sink))
    }

    // ------------------------------------------------------------------
    // Facet refresh
    // ------------------------------------------------------------------

    /// Refresh one facet. `Current` and `Indices` share the summary page
    /// and refresh together.
    pub async fn refresh(&self, facet: Facet) -> HubResult<()> {
        match facet {
            Facet::Current | Facet::Indices => self.refresh_summary().await,
            Facet::Alarms => self.refresh_alarms().await,
            Facet::Daily => self.refresh_daily().await,
            Facet::Hourly => self.refresh_hourly().await,
            Facet::Minutely => self.refresh_minutely().await,
            Facet::ObservationHistory => self.refresh_observation().await,
        }
    }

    /// Current conditions + living indices.
    pub async fn refresh_summary(&self) -> HubResult<()> {
        let station = self.station()?;
        let url = self
            .http
            .api_url(&format!("weather_index/{}.html", station.area_id), Node::Data);
        let page = self.http.get_text(&url, &[]).await?;
        self.ingest_summary(page)
    }

    pub async fn refresh_alarms(&self) -> HubResult<()> {
        let station = self.station()?;
        let url = self
            .http
            .api_url(&format!("dingzhi/{}.html", station.area_id), Node::Data);
        let page = self.http.get_text(&url, &[]).await?;
        self.ingest_list_page(Facet::Alarms, page, &ALARM_DZ_MARKER, "w")
    }

    pub async fn refresh_daily(&self) -> HubResult<()> {
        let station = self.station()?;
        let url = self
            .http
            .api_url(&format!("weixinfc/{}.html", station.area_id), Node::Data);
        let page = self.http.get_text(&url, &[]).await?;
        self.ingest_list_page(Facet::Daily, page, &DAILY_FC_MARKER, "f")
    }

    pub async fn refresh_hourly(&self) -> HubResult<()> {
        let station = self.station()?;
        let url = self
            .http
            .api_url(&format!("wap_180h/{}.html", station.area_id), Node::Data);
        let page = self.http.get_text(&url, &[]).await?;
        self.ingest_list_page(Facet::Hourly, page, &HOURLY_FC_MARKER, "jh")
    }

    pub async fn refresh_minutely(&self) -> HubResult<()> {
        let station = self.station()?;
        let url = self.http.api_url("webgis_rain_new/webgis/minute", Node::Radar);
        let params = vec![
            ("lat".to_string(), station.latitude.to_string()),
            ("lon".to_string(), station.longitude.to_string()),
        ];
        let page = self.http.get_text(&url, &params).await?;
        self.ingest_minutely(page)
    }

    pub async fn refresh_observation(&self) -> HubResult<()> {
        let station = self.station()?;
        let url = self
            .http
            .api_url(&format!("weather/{}.shtml", station.area_id), Node::Observe);
        let page = self.http.get_text(&url, &[]).await?;
        self.ingest_observation(page)
    }

    // ------------------------------------------------------------------
    // Body ingestion (split from fetch for testability)
    // ------------------------------------------------------------------

    fn ingest_summary(&self, page: FetchedText) -> HubResult<()> {
        if !page.is_ok() {
            self.degrade(Facet::Current, &page);
            return Ok(());
        }
        let current = match extract(&page.body, &DATA_SK_MARKER) {
            Ok(v) => v,
            Err(e) => return self.malformed(Facet::Current, page.body, e),
        };
        let indices = match extract(&page.body, &DATA_ZS_MARKER) {
            Ok(v) => v,
            Err(e) => return self.malformed(Facet::Current, page.body, e),
        };

        let mut store = self.store.write().expect("store lock");
        store.clear_error(Facet::Current);
        if let Some(current) = current {
            store.replace(Facet::Current, current);
        }
        if let Some(indices) = indices {
            let zs = indices.get("zs").cloned().unwrap_or(Value::Null);
            if !zs.is_null() {
                store.replace(Facet::Indices, zs);
            }
        }
        Ok(())
    }

    /// Shared path for the list-shaped script pages: extract the marker,
    /// pull the inner list, replace the facet.
    fn ingest_list_page(
        &self,
        facet: Facet,
        page: FetchedText,
        marker: &Marker,
        inner_key: &str,
    ) -> HubResult<()> {
        if !page.is_ok() {
            self.degrade(facet, &page);
            return Ok(());
        }
        match extract(&page.body, marker) {
            Ok(Some(doc)) => {
                let list = doc
                    .get(inner_key)
                    .cloned()
                    .unwrap_or_else(|| Value::Array(Vec::new()));
                self.store.write().expect("store lock").replace(facet, list);
                Ok(())
            }
            Ok(None) => {
                debug!(facet = %facet, "Marker absent; keeping previous value");
                self.store.write().expect("store lock").clear_error(facet);
                Ok(())
            }
            Err(e) => self.malformed(facet, page.body, e),
        }
    }

    fn ingest_minutely(&self, page: FetchedText) -> HubResult<()> {
        if !page.is_ok() {
            self.degrade(Facet::Minutely, &page);
            return Ok(());
        }
        match serde_json::from_str::<Value>(&page.body) {
            Ok(doc) => {
                self.store
                    .write()
                    .expect("store lock")
                    .replace(Facet::Minutely, doc);
                Ok(())
            }
            Err(source) => self.malformed(
                Facet::Minutely,
                page.body,
                HubError::MalformedPayload {
                    marker: "minutely body".to_string(),
                    source,
                },
            ),
        }
    }

    fn ingest_observation(&self, page: FetchedText) -> HubResult<()> {
        if !page.is_ok() {
            self.degrade(Facet::ObservationHistory, &page);
            return Ok(());
        }
        match extract(&page.body, &OBSERVE_24H_MARKER) {
            Ok(Some(doc)) => {
                let mut store = self.store.write().expect("store lock");
                store.clear_error(Facet::ObservationHistory);
                if let Some(history) = reconstruct_history(&doc) {
                    store.replace(Facet::ObservationHistory, history);
                }
                Ok(())
            }
            Ok(None) => {
                self.store
                    .write()
                    .expect("store lock")
                    .clear_error(Facet::ObservationHistory);
                Ok(())
            }
            Err(e) => self.malformed(Facet::ObservationHistory, page.body, e),
        }
    }

    fn degrade(&self, facet: Facet, page: &FetchedText) {
        warn!(facet = %facet, status = page.status, url = %page.url, "Non-200 response; facet degraded");
        self.store
            .write()
            .expect("store lock")
            .set_error(facet, page.body.clone());
    }

    fn malformed(&self, facet: Facet, body: String, err: HubError) -> HubResult<()> {
        self.store.write().expect("store lock").set_error(facet, body);
        Err(err)
    }

    // ------------------------------------------------------------------
    // Decode + notify
    // ------------------------------------------------------------------

    /// One full decode pass over a consistent store snapshot.
    pub fn decode(&self) -> Payload {
        let snapshot = self.store_snapshot();
        self.converters.decode(&snapshot, &self.decode_cx())
    }

    /// Decode and deliver to interested consumers. Run by the
    /// current-conditions job after a successful refresh.
    pub fn decode_and_notify(&self) -> Payload {
        let payload = self.decode();
        self.notifier.notify(&payload);
        payload
    }

    fn decode_cx(&self) -> DecodeCx {
        let offset = Duration::hours(i64::from(self.config.provider.utc_offset_hours));
        DecodeCx {
            now: Some((Utc::now() + offset).naive_utc()),
            area_id: self
                .station
                .read()
                .expect("station lock")
                .as_ref()
                .map(|s| s.area_id.clone()),
            referer: Some(self.config.provider.referer.clone()),
            web_base: Some(self.http.web_url("")),
        }
    }
}
