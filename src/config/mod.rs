//! Configuration management for the registry watcher.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Config file given by the caller or `CONFIG_PATH`
//! 3. Environment variables with the `REGISTRY__` prefix (highest priority)
//!

mod registry;
mod retry;
pub use registry::*;
pub use retry::*;
