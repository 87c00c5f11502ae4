//! Watch loops that mirror the coordination service into the service table.
//!
//! Two levels, both driven by the same [`WatchTask`] loop:
//! - [`ScopeListener`] - one per registration scope, watches the scope root and
//!   starts/stops a [`ServiceListener`] per service found under it
//! - [`ServiceListener`] - watches one service's instance directory and applies
//!   `Added`/`Removed` deltas to the table
//!
//! Scope specifics (paths, payload format) live in a [`ScopeSchema`].

mod schema;
mod scope_listener;
mod service_listener;
mod state;
mod watch_task;

pub use schema::*;
pub use scope_listener::*;
pub use service_listener::*;
pub use state::*;
pub(crate) use watch_task::*;

#[cfg(test)]
mod schema_test;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::RegisteredType;
use crate::Result;

pub type InterfaceListener = ScopeListener<InterfaceSchema>;
pub type ApplicationListener = ScopeListener<ApplicationSchema>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    fn registered_type(&self) -> RegisteredType;

    fn state(&self) -> ListenerState;

    /// Starts the watch loop in the background.
    ///
    /// No-op while a loop is running; fails with `ListenerClosed` once closed.
    fn watch_and_handle(&self) -> Result<()>;

    /// Stops table writes immediately and signals the loop, without waiting.
    fn cancel(&self);

    /// Cancels and waits for the loop to exit (bounded by the close grace period).
    ///
    /// Valid in any state, idempotent.
    async fn close(&self);
}
