//! Registry Error Hierarchy
//!
//! Defines the error types surfaced by the registry watcher, categorized by
//! the layer that produced them: configuration, connection establishment,
//! listener bookkeeping, watch maintenance and individual session calls.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::RegisteredType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration source could not be read or deserialized
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Registry configuration failed validation (malformed timeout, no addresses, ...)
    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),

    /// The coordination service could not be reached
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Listener bookkeeping failures inside the orchestrator
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Watch establishment or re-arm failures
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// A single session-client call failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Best-effort operation where some steps failed; completed steps are not rolled back
    #[error("{operation} incomplete: {} step(s) failed: {}", .failures.len(), join_failures(.failures))]
    Incomplete {
        operation: &'static str,
        failures: Vec<Error>,
    },

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connector did not answer before the session timeout
    #[error("Connect to {addresses:?} timed out after {timeout:?}")]
    Timeout { addresses: Vec<String>, timeout: Duration },

    /// None of the configured addresses accepted the session
    #[error("Coordination service unreachable at {addresses:?}: {reason}")]
    Unreachable { addresses: Vec<String>, reason: String },

    /// Address list was empty after parsing
    #[error("No coordination service address configured")]
    NoAddress,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No listener registered for the scope (construction bug or already unsubscribed)
    #[error("Listener for {0} level registration is not initialized")]
    ListenerNotInitialized(RegisteredType),

    /// The listener reached its terminal state and cannot watch again
    #[error("Listener for {0} level registration is closed")]
    ListenerClosed(RegisteredType),

    #[error("Unsupported registry protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Watch task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Retry policy exhaustion while (re)arming a watch
    #[error("Watch on {path} failed after {attempts} attempts")]
    RetryExhausted { path: String, attempts: usize },

    /// A single session call exceeded its per-attempt timeout
    #[error("Watch on {path} timed out after {after:?}")]
    Timeout { path: String, after: Duration },

    /// Node payload could not be turned into an endpoint
    #[error("Cannot decode node {path}: {reason}")]
    Decode { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Session is currently disconnected; retry after reconnect
    #[error("Connection to coordination service lost")]
    ConnectionLoss,

    /// Session expired; all watches are gone
    #[error("Coordination session expired")]
    SessionExpired,

    /// Client was closed by its owner
    #[error("Session client closed")]
    Closed,
}

fn join_failures(failures: &[Error]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Returns true when this error, or any aggregated step, is a missing-listener failure
    pub fn is_listener_not_initialized(&self) -> bool {
        match self {
            Error::Registry(RegistryError::ListenerNotInitialized(_)) => true,
            Error::Incomplete { failures, .. } => failures.iter().any(Error::is_listener_not_initialized),
            _ => false,
        }
    }

    /// Aggregated step failures, or the error itself for single-step errors
    pub fn failures(&self) -> Vec<&Error> {
        match self {
            Error::Incomplete { failures, .. } => failures.iter().collect(),
            other => vec![other],
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        RegistryError::TaskFailed(err).into()
    }
}

impl From<humantime::DurationError> for Error {
    fn from(err: humantime::DurationError) -> Self {
        Error::InvalidConfig(format!("malformed duration: {}", err))
    }
}
