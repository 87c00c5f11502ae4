use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use super::SvcListenerRegistry;
use crate::Listener;
use crate::ServiceKey;

/// DashMap-backed [`SvcListenerRegistry`]
///
/// Inserts from scope listeners and bulk removal during unsubscribe only ever
/// lock the shard of the key involved.
#[derive(Default)]
pub struct BaseRegistry {
    listeners: DashMap<ServiceKey, Arc<dyn Listener>>,
}

impl BaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn contains(
        &self,
        key: &ServiceKey,
    ) -> bool {
        self.listeners.contains_key(key)
    }
}

impl SvcListenerRegistry for BaseRegistry {
    fn set_svc_listener(
        &self,
        key: ServiceKey,
        listener: Arc<dyn Listener>,
    ) -> bool {
        match self.listeners.entry(key) {
            Entry::Occupied(entry) => {
                trace!(service = %entry.key(), "service listener already registered");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(listener);
                true
            }
        }
    }

    fn get_all_svc_listener(&self) -> HashMap<ServiceKey, Arc<dyn Listener>> {
        self.listeners
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn remove_svc_listener(
        &self,
        key: &ServiceKey,
    ) -> Option<Arc<dyn Listener>> {
        // Cancel while the shard is still locked
        self.listeners
            .remove_if(key, |_, listener| {
                listener.cancel();
                true
            })
            .map(|(_, listener)| listener)
    }
}
