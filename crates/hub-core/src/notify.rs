//! Selective change notification.
//!
//! Consumers register once per attribute with the set of attributes they
//! care about. Each decode pass hands the full payload to every consumer
//! whose subscription intersects the payload's keys: sibling attributes a
//! converter emits as a group arrive atomically, and consumers read only
//! the keys they declared.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::attrs::Payload;

/// A payload sink provided by the embedding application.
pub trait Consumer: Send + Sync {
    fn on_payload(&self, payload: &Payload);
}

/// Registration receipt: the owning attribute plus the resolved
/// subscription set.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    pub attr: String,
    pub subscribed: BTreeSet<String>,
}

struct Registered {
    attr: String,
    subscribed: BTreeSet<String>,
    sink: Arc<dyn Consumer>,
}

/// Tracks consumers and delivers decode payloads selectively.
#[derive(Default)]
pub struct ChangeNotifier {
    consumers: RwLock<Vec<Registered>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer for `attr`. Registration is idempotent: a second
    /// registration for the same attribute returns the existing handle and
    /// keeps the original sink.
    pub fn register(
        &self,
        attr: &str,
        subscribed: BTreeSet<String>,
        sink: Arc<dyn Consumer>,
    ) -> ConsumerHandle {
        let mut consumers = self.consumers.write().expect("notifier lock");
        if let Some(existing) = consumers.iter().find(|c| c.attr == attr) {
            return ConsumerHandle {
                attr: existing.attr.clone(),
                subscribed: existing.subscribed.clone(),
            };
        }
        consumers.push(Registered {
            attr: attr.to_string(),
            subscribed: subscribed.clone(),
            sink,
        });
        ConsumerHandle {
            attr: attr.to_string(),
            subscribed,
        }
    }

    pub fn is_registered(&self, attr: &str) -> bool {
        self.consumers
            .read()
            .expect("notifier lock")
            .iter()
            .any(|c| c.attr == attr)
    }

    pub fn len(&self) -> usize {
        self.consumers.read().expect("notifier lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one decode payload. Consumers with no intersecting attribute
    /// are not called; interested consumers receive the complete payload.
    pub fn notify(&self, payload: &Payload) {
        if payload.is_empty() {
            return;
        }
        let consumers = self.consumers.read().expect("notifier lock");
        for consumer in consumers.iter() {
            let interested = consumer
                .subscribed
                .iter()
                .any(|attr| payload.contains_key(attr));
            if !interested {
                continue;
            }
            debug!(attr = %consumer.attr, keys = payload.len(), "Delivering payload");
            consumer.sink.on_payload(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::AttrValue;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        deliveries: Mutex<Vec<Payload>>,
    }

    impl Consumer for Recorder {
        fn on_payload(&self, payload: &Payload) {
            self.deliveries.lock().unwrap().push(payload.clone());
        }
    }

    fn attrs(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn payload(entries: &[(&str, f64)]) -> Payload {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), AttrValue::Number(*v)))
            .collect()
    }

    #[test]
    fn test_interested_consumer_gets_full_payload() {
        let notifier = ChangeNotifier::new();
        let recorder = Arc::new(Recorder::default());
        notifier.register("a", attrs(&["a", "b"]), recorder.clone());

        notifier.notify(&payload(&[("b", 1.0), ("c", 2.0)]));

        let deliveries = recorder.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        // Full payload, not just the intersection.
        assert_eq!(deliveries[0].len(), 2);
        assert!(deliveries[0].contains_key("c"));
    }

    #[test]
    fn test_uninterested_consumer_gets_nothing() {
        let notifier = ChangeNotifier::new();
        let recorder = Arc::new(Recorder::default());
        notifier.register("a", attrs(&["a", "b"]), recorder.clone());

        notifier.notify(&payload(&[("c", 2.0)]));

        assert!(recorder.deliveries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_payload_is_noop() {
        let notifier = ChangeNotifier::new();
        let recorder = Arc::new(Recorder::default());
        notifier.register("a", attrs(&["a"]), recorder.clone());

        notifier.notify(&Payload::new());

        assert!(recorder.deliveries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let notifier = ChangeNotifier::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        notifier.register("a", attrs(&["a"]), first.clone());
        let handle = notifier.register("a", attrs(&["a", "z"]), second.clone());

        assert_eq!(notifier.len(), 1);
        // The original subscription wins.
        assert_eq!(handle.subscribed, attrs(&["a"]));

        notifier.notify(&payload(&[("a", 1.0)]));
        assert_eq!(first.deliveries.lock().unwrap().len(), 1);
        assert!(second.deliveries.lock().unwrap().is_empty());
    }
}
