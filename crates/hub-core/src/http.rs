//! Provider HTTP plumbing.
//!
//! All requests are unauthenticated GETs carrying a fixed Referer and
//! User-Agent, with redirects disabled. URLs are built from the configured
//! base domain plus a node subdomain per endpoint family, with a
//! cache-busting millisecond timestamp appended to API calls (web page URLs
//! omit it). Certificate relaxation and the plain-http rewrite for the www
//! node are provider legacy quirks and stay configurable.

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::redirect::Policy;

use crate::config::ProviderConfig;
use crate::error::{HubError, HubResult};

/// Endpoint family, selecting the node subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Facet pages (summary, alarms, daily, hourly).
    Data,
    /// Geolocation / station info.
    Geo,
    /// Free-text area search.
    Search,
    /// Minutely precipitation grid.
    Radar,
    /// Legacy observation pages.
    Observe,
    /// Human-facing web pages (pictures, configuration links).
    Web,
}

/// One fetched response body plus the status it arrived with.
#[derive(Debug)]
pub struct FetchedText {
    pub status: u16,
    pub body: String,
    pub url: String,
}

impl FetchedText {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// HTTP client bound to one provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderHttp {
    client: reqwest::Client,
    provider: ProviderConfig,
}

impl ProviderHttp {
    pub fn new(provider: ProviderConfig) -> HubResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            REFERER,
            HeaderValue::from_str(&provider.referer)
                .map_err(|e| HubError::Config(format!("bad referer header: {e}")))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&provider.user_agent)
                .map_err(|e| HubError::Config(format!("bad user-agent header: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(provider.timeout_secs))
            .redirect(Policy::none())
            .danger_accept_invalid_certs(provider.insecure_tls)
            .build()?;

        Ok(Self { client, provider })
    }

    fn node_subdomain(&self, node: Node) -> &str {
        let nodes = &self.provider.nodes;
        match node {
            Node::Data => &nodes.data,
            Node::Geo => &nodes.geo,
            Node::Search => &nodes.search,
            Node::Radar => &nodes.radar,
            Node::Observe => &nodes.observe,
            Node::Web => &nodes.web,
        }
    }

    /// Build an API URL with the cache-busting `_` parameter.
    pub fn api_url(&self, path: &str, node: Node) -> String {
        self.build_url(path, node, true)
    }

    /// Build a web page URL (no cache buster).
    pub fn web_url(&self, path: &str) -> String {
        self.build_url(path, Node::Web, false)
    }

    fn build_url(&self, path: &str, node: Node, with_time: bool) -> String {
        let path = path.trim_start_matches('/');
        let mut url = format!(
            "https://{}.{}/{}",
            self.node_subdomain(node),
            self.provider.domain,
            path
        );
        if with_time {
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str(&format!("_={}", Utc::now().timestamp_millis()));
        }
        if self.provider.legacy_plain_www {
            url = url.replace("https://www", "http://www");
        }
        url
    }

    /// Issue one GET and return the body text regardless of status; an empty
    /// body is an error (a blank page means the provider dropped us, not
    /// that there is no weather).
    pub async fn get_text(&self, url: &str, query: &[(String, String)]) -> HubResult<FetchedText> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        if body.is_empty() {
            return Err(HubError::EmptyResponse {
                url: url.to_string(),
            });
        }
        Ok(FetchedText {
            status,
            body,
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    fn provider() -> ProviderConfig {
        ProviderConfig {
            domain: "weather.example.cn".to_string(),
            referer: "https://m.weather.example.cn/".to_string(),
            user_agent: "test-agent".to_string(),
            insecure_tls: false,
            legacy_plain_www: true,
            timeout_secs: 20,
            utc_offset_hours: 8,
            nodes: NodeConfig::default(),
        }
    }

    #[test]
    fn test_api_url_has_cache_buster() {
        let http = ProviderHttp::new(provider()).unwrap();
        let url = http.api_url("weather_index/101010100.html", Node::Data);
        assert!(url.starts_with("https://d1.weather.example.cn/weather_index/101010100.html?_="));
    }

    #[test]
    fn test_api_url_appends_to_existing_query() {
        let http = ProviderHttp::new(provider()).unwrap();
        let url = http.api_url("geong/v1/api?x=1", Node::Geo);
        assert!(url.starts_with("https://d7.weather.example.cn/geong/v1/api?x=1&_="));
    }

    #[test]
    fn test_www_node_rewritten_to_plain_http() {
        let http = ProviderHttp::new(provider()).unwrap();
        let url = http.api_url("weather/101010100.shtml", Node::Observe);
        assert!(url.starts_with("http://www.weather.example.cn/weather/101010100.shtml?_="));
    }

    #[test]
    fn test_www_rewrite_can_be_disabled() {
        let mut cfg = provider();
        cfg.legacy_plain_www = false;
        let http = ProviderHttp::new(cfg).unwrap();
        let url = http.api_url("weather/101010100.shtml", Node::Observe);
        assert!(url.starts_with("https://www.weather.example.cn/"));
    }

    #[test]
    fn test_web_url_has_no_cache_buster() {
        let http = ProviderHttp::new(provider()).unwrap();
        let url = http.web_url("mweather/101010100.shtml");
        assert_eq!(url, "https://m.weather.example.cn/mweather/101010100.shtml");
    }
}
