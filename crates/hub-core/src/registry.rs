//! Client registry.
//!
//! One client per configuration entry, owned by the embedding application
//! through explicit create/lookup/destroy calls. Nothing here is a process
//! global; an application that wants two providers holds two registries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::client::WeatherClient;
use crate::config::ClientConfig;
use crate::error::{HubError, HubResult};

#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, Arc<WeatherClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a client under `entry_id`. Creating an id twice is
    /// a caller bug, not a lookup.
    pub fn create(&self, entry_id: &str, config: ClientConfig) -> HubResult<Arc<WeatherClient>> {
        let mut clients = self.clients.lock().expect("registry lock");
        if clients.contains_key(entry_id) {
            return Err(HubError::InvalidArguments(format!(
                "client '{entry_id}' already exists"
            )));
        }
        let client = Arc::new(WeatherClient::new(config)?);
        clients.insert(entry_id.to_string(), client.clone());
        info!(entry_id = %entry_id, "Created client");
        Ok(client)
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<WeatherClient>> {
        self.clients
            .lock()
            .expect("registry lock")
            .get(entry_id)
            .cloned()
    }

    /// Drop a client. In-flight refreshes on other handles finish on their
    /// own; the registry only forgets the entry.
    pub fn destroy(&self, entry_id: &str) -> Option<Arc<WeatherClient>> {
        let removed = self
            .clients
            .lock()
            .expect("registry lock")
            .remove(entry_id);
        if removed.is_some() {
            info!(entry_id = %entry_id, "Destroyed client");
        }
        removed
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .clients
            .lock()
            .expect("registry lock")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        serde_yaml::from_str(
            r#"
provider:
  domain: weather.example.cn
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_create_lookup_destroy() {
        let registry = ClientRegistry::new();
        assert!(registry.get("main").is_none());

        registry.create("main", config()).unwrap();
        assert!(registry.get("main").is_some());
        assert_eq!(registry.ids(), vec!["main".to_string()]);

        assert!(registry.destroy("main").is_some());
        assert!(registry.get("main").is_none());
        assert!(registry.destroy("main").is_none());
    }

    #[test]
    fn test_duplicate_create_is_an_error() {
        let registry = ClientRegistry::new();
        registry.create("main", config()).unwrap();
        let err = registry.create("main", config()).unwrap_err();
        assert!(matches!(err, HubError::InvalidArguments(_)));
    }
}
