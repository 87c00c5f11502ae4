//! Service-discovery client for an API gateway.
//!
//! Keeps the gateway's [`ServiceTable`] in sync with a watch-capable
//! coordination service. [`CoordinatorRegistry`] owns the session and drives one
//! [`ScopeListener`] per [`RegisteredType`]; each scope listener starts a
//! [`ServiceListener`] per service it finds.
//!
//! ```ignore
//! let config = RegistryConfig::load(Some("config/registry.toml"))?;
//! let registry = CoordinatorRegistry::new(config, &connector).await?;
//! registry.do_subscribe().await?;
//! let endpoints = registry.service_table().instances(&ServiceKey::application("shop"));
//! registry.shutdown().await?;
//! ```

pub mod constants;
mod config;
mod errors;
mod listener;
mod model;
mod registry;
mod session;
mod table;
pub(crate) mod utils;

pub use config::*;
pub use errors::*;
pub use listener::*;
pub use model::*;
pub use registry::*;
pub use session::*;
pub use table::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
mod table_test;
