//! Gateway-side view of discovered service instances.
//!
//! Listeners are the only writers; routing code reads. Each service key lives
//! in its own `DashMap` shard entry, so an update to one service never blocks
//! reads of another.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::constants::TABLE_FEED_BUFFER;
use crate::DiscoveryDelta;
use crate::Endpoint;
use crate::RegisteredType;
use crate::ServiceKey;

/// Service key -> endpoints (by endpoint id)
///
/// A key whose last endpoint is removed disappears from the table.
#[derive(Debug)]
pub struct ServiceTable {
    services: DashMap<ServiceKey, BTreeMap<String, Endpoint>>,
    feed: broadcast::Sender<DiscoveryDelta>,
}

impl Default for ServiceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceTable {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(TABLE_FEED_BUFFER);
        Self {
            services: DashMap::new(),
            feed,
        }
    }

    /// Applies one delta. Returns false when it changed nothing.
    pub fn apply(
        &self,
        delta: DiscoveryDelta,
    ) -> bool {
        let changed = match &delta {
            DiscoveryDelta::Added { key, endpoint } => {
                let mut endpoints = self.services.entry(key.clone()).or_default();
                if endpoints.get(&endpoint.id) == Some(endpoint) {
                    false
                } else {
                    endpoints.insert(endpoint.id.clone(), endpoint.clone());
                    true
                }
            }
            DiscoveryDelta::Removed { key, endpoint_id } => {
                let mut removed = false;
                self.services.remove_if_mut(key, |_, endpoints| {
                    removed = endpoints.remove(endpoint_id).is_some();
                    endpoints.is_empty()
                });
                removed
            }
        };

        if changed {
            trace!(key = %delta.key(), ?delta, "service table updated");
            // No receivers is fine
            let _ = self.feed.send(delta);
        }
        changed
    }

    /// Removes every key of `name` in the given scope (all groups and versions)
    pub fn purge(
        &self,
        registered_type: RegisteredType,
        name: &str,
    ) -> usize {
        let keys: Vec<ServiceKey> = self
            .services
            .iter()
            .filter(|e| e.key().registered_type == registered_type && e.key().name == name)
            .map(|e| e.key().clone())
            .collect();

        let mut purged = 0;
        for key in keys {
            if let Some((key, endpoints)) = self.services.remove(&key) {
                for endpoint_id in endpoints.into_keys() {
                    purged += 1;
                    let _ = self.feed.send(DiscoveryDelta::Removed {
                        key: key.clone(),
                        endpoint_id,
                    });
                }
            }
        }
        purged
    }

    /// Endpoints of `key`, ordered by endpoint id
    pub fn instances(
        &self,
        key: &ServiceKey,
    ) -> Vec<Endpoint> {
        self.services
            .get(key)
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(
        &self,
        key: &ServiceKey,
    ) -> bool {
        self.services.contains_key(key)
    }

    pub fn services(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<ServiceKey> = self.services.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Keys of one scope only
    pub fn services_of(
        &self,
        registered_type: RegisteredType,
    ) -> Vec<ServiceKey> {
        self.services()
            .into_iter()
            .filter(|k| k.registered_type == registered_type)
            .collect()
    }

    /// Point-in-time copy: key -> endpoint ids
    pub fn snapshot(&self) -> BTreeMap<ServiceKey, Vec<String>> {
        self.services
            .iter()
            .map(|e| (e.key().clone(), e.value().keys().cloned().collect()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Feed of applied deltas for consumers that prefer push over polling
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryDelta> {
        self.feed.subscribe()
    }
}
