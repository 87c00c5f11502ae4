use std::time::Duration;

// -
// Session

/// Name handed to the session connector, shows up in its logs
pub const REGISTRY_CLIENT_NAME: &str = "zk registry";

/// Only protocol this registry speaks
pub const ZOOKEEPER_PROTOCOL: &str = "zookeeper";

/// Cool-down before a listener retries after its backoff policy was exhausted
pub(crate) const CONN_DELAY: Duration = Duration::from_secs(3);

/// Capacity of the raw session event channel handed out by connectors
pub const SESSION_EVENT_BUFFER: usize = 64;

// -
// Registration layout

/// Interface level registrations: `/dubbo/<interface>/providers/<encoded url>`
pub(crate) const DEFAULT_INTERFACE_ROOT: &str = "/dubbo";
pub(crate) const PROVIDERS_CATEGORY: &str = "providers";

/// Children of the interface root that hold configuration, not interfaces
pub(crate) const INTERFACE_ROOT_RESERVED: [&str; 3] = ["config", "metadata", "mapping"];

/// Application level registrations: `/services/<application>/<instance id>`
pub(crate) const DEFAULT_APPLICATION_ROOT: &str = "/services";

// -
// Listener lifecycle

/// How long `close()` waits for a watch loop to acknowledge cancellation
pub(crate) const DEFAULT_CLOSE_GRACE_MS: u64 = 3000;

/// Capacity of the delta feed exposed by the service table
pub(crate) const TABLE_FEED_BUFFER: usize = 1024;
