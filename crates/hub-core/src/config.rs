//! Client configuration loading.
//!
//! Loads provider/station/schedule settings from a YAML file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Root configuration for one aggregation client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Provider endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base domain all endpoint families hang off (e.g. "weather.com.cn").
    pub domain: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Accept invalid certificates on provider endpoints (legacy quirk).
    #[serde(default = "default_true")]
    pub insecure_tls: bool,
    /// Rewrite https to plain http for the www node (legacy quirk).
    #[serde(default = "default_true")]
    pub legacy_plain_www: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Provider-local UTC offset; facet timestamps and forecast cutoffs are
    /// in provider-local time, not UTC.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default)]
    pub nodes: NodeConfig,
}

/// Node subdomain per endpoint family.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_data")]
    pub data: String,
    #[serde(default = "default_node_geo")]
    pub geo: String,
    #[serde(default = "default_node_search")]
    pub search: String,
    #[serde(default = "default_node_radar")]
    pub radar: String,
    #[serde(default = "default_node_observe")]
    pub observe: String,
    #[serde(default = "default_node_web")]
    pub web: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data: default_node_data(),
            geo: default_node_geo(),
            search: default_node_search(),
            radar: default_node_radar(),
            observe: default_node_observe(),
            web: default_node_web(),
        }
    }
}

/// Station selection: explicit area id ("auto" defers to coordinates),
/// explicit coordinates, or nothing (resolver falls back to these
/// configured coordinates when the caller supplies none).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationConfig {
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Per-facet polling intervals, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_current_secs")]
    pub current_secs: u64,
    #[serde(default = "default_alarms_secs")]
    pub alarms_secs: u64,
    #[serde(default = "default_daily_secs")]
    pub daily_secs: u64,
    #[serde(default = "default_hourly_secs")]
    pub hourly_secs: u64,
    #[serde(default = "default_observation_secs")]
    pub observation_secs: u64,
    #[serde(default = "default_minutely_secs")]
    pub minutely_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            current_secs: default_current_secs(),
            alarms_secs: default_alarms_secs(),
            daily_secs: default_daily_secs(),
            hourly_secs: default_hourly_secs(),
            observation_secs: default_observation_secs(),
            minutely_secs: default_minutely_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_referer() -> String {
    "https://m.weather.com.cn/".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_1) AppleWebKit/537 (KHTML, like Gecko) Chrome/116.0 Safari/537".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_utc_offset_hours() -> i32 {
    8
}

fn default_node_data() -> String {
    "d1".to_string()
}

fn default_node_geo() -> String {
    "d7".to_string()
}

fn default_node_search() -> String {
    "toy1".to_string()
}

fn default_node_radar() -> String {
    "d3".to_string()
}

fn default_node_observe() -> String {
    "www".to_string()
}

fn default_node_web() -> String {
    "m".to_string()
}

fn default_current_secs() -> u64 {
    60
}

fn default_alarms_secs() -> u64 {
    300
}

fn default_daily_secs() -> u64 {
    3600
}

fn default_hourly_secs() -> u64 {
    1800
}

fn default_observation_secs() -> u64 {
    1800
}

fn default_minutely_secs() -> u64 {
    120
}

impl ClientConfig {
    /// Load a client configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ClientConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(domain = %config.provider.domain, path = %path.display(), "Loaded client config");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
provider:
  domain: weather.com.cn
"#;
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider.domain, "weather.com.cn");
        assert!(config.provider.insecure_tls);
        assert_eq!(config.provider.timeout_secs, 20);
        assert_eq!(config.provider.nodes.geo, "d7");
        assert_eq!(config.schedule.current_secs, 60);
        assert_eq!(config.schedule.alarms_secs, 300);
        assert!(config.station.area_id.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
provider:
  domain: weather.com.cn
  insecure_tls: false
  timeout_secs: 10
  nodes:
    data: d2
station:
  area_id: "101010100"
  latitude: 39.9
  longitude: 116.4
schedule:
  current_secs: 30
  minutely_secs: 60
"#;
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.provider.insecure_tls);
        assert_eq!(config.provider.nodes.data, "d2");
        // Unset nodes keep their defaults
        assert_eq!(config.provider.nodes.observe, "www");
        assert_eq!(config.station.area_id.as_deref(), Some("101010100"));
        assert_eq!(config.schedule.current_secs, 30);
        assert_eq!(config.schedule.daily_secs, 3600);
    }
}
