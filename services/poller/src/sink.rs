//! Latest-state consumer.
//!
//! Consumers in this service all share one sink that folds every delivered
//! payload into the latest-known attribute map served by the status API.
//! Nothing is persisted; the first-refresh cycle rebuilds state on start.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use hub_core::{Consumer, Payload};
use tracing::debug;

#[derive(Default)]
pub struct LatestState {
    payload: RwLock<Payload>,
    updated_at: RwLock<Option<DateTime<Utc>>>,
}

impl LatestState {
    pub fn snapshot(&self) -> (Payload, Option<DateTime<Utc>>) {
        (
            self.payload.read().expect("latest lock").clone(),
            *self.updated_at.read().expect("latest lock"),
        )
    }
}

impl Consumer for LatestState {
    fn on_payload(&self, payload: &Payload) {
        let mut latest = self.payload.write().expect("latest lock");
        for (attr, value) in payload {
            latest.insert(attr.clone(), value.clone());
        }
        *self.updated_at.write().expect("latest lock") = Some(Utc::now());
        debug!(attrs = payload.len(), "Payload folded into latest state");
    }
}
