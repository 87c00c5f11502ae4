//! Gateway-facing registry surface.
//!
//! [`CoordinatorRegistry`] is the orchestrator: it owns the session, one
//! scope listener per [`RegisteredType`](crate::RegisteredType) and a
//! [`BaseRegistry`] of per-service listeners, reached only through the
//! narrow [`SvcListenerRegistry`] capability.

mod base;
mod coordinator_registry;

pub use base::*;
pub use coordinator_registry::*;


use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Listener;
use crate::Result;
use crate::ServiceKey;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Ensures every scope listener is watching.
    ///
    /// Every scope is attempted; failures are aggregated in `Error::Incomplete`.
    async fn do_subscribe(&self) -> Result<()>;

    /// Closes scope listeners, then drains the per-service listeners.
    ///
    /// Best effort: a failed step does not stop the remaining ones and nothing is
    /// rolled back, so a partial teardown is a possible outcome.
    async fn do_unsubscribe(&self) -> Result<()>;
}

/// Tracking table of per-service listeners
pub trait SvcListenerRegistry: Send + Sync {
    /// Records `listener` under `key`; false if the key is already taken
    fn set_svc_listener(
        &self,
        key: ServiceKey,
        listener: Arc<dyn Listener>,
    ) -> bool;

    fn get_all_svc_listener(&self) -> HashMap<ServiceKey, Arc<dyn Listener>>;

    /// Removes the entry and cancels its watch in one step
    fn remove_svc_listener(
        &self,
        key: &ServiceKey,
    ) -> Option<Arc<dyn Listener>>;
}
