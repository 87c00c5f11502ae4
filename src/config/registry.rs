use std::env;
use std::time::Duration;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::constants::DEFAULT_APPLICATION_ROOT;
use crate::constants::DEFAULT_CLOSE_GRACE_MS;
use crate::constants::DEFAULT_INTERFACE_ROOT;
use crate::constants::ZOOKEEPER_PROTOCOL;
use crate::Error;
use crate::RegistryError;
use crate::Result;

const ENV_PREFIX: &str = "REGISTRY";

/// Settings for one coordination-service backed registry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Registry backend, only `zookeeper` is understood
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Comma separated `host:port` list
    #[serde(default = "default_address")]
    pub address: String,

    /// Session timeout, e.g. `"3s"` or `"500ms"`
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Root of interface level registrations
    #[serde(default = "default_interface_root")]
    pub interface_root: String,

    /// Root of application level registrations
    #[serde(default = "default_application_root")]
    pub application_root: String,

    /// Retry policy for (re)arming watches
    #[serde(default)]
    pub watch_retry: BackoffPolicy,

    /// Grace period granted to a watch loop on close (unit: milliseconds)
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            address: default_address(),
            timeout: default_timeout(),
            interface_root: default_interface_root(),
            application_root: default_application_root(),
            watch_retry: BackoffPolicy::default(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

impl RegistryConfig {
    /// Defaults, overlaid with `CONFIG_PATH` (if set) and `REGISTRY__*` variables.
    ///
    /// No validation happens here, call [`validate`](Self::validate) once all
    /// overrides are applied.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies a config file on top of the current values, environment still wins.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Loads defaults plus an optional file and validates the result.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = Self::new()?;
        if let Some(path) = path {
            config = config.with_override_config(path)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Splits `address` on commas, dropping blanks.
    pub fn addresses(&self) -> Vec<String> {
        self.address
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Parses the session timeout string.
    pub fn session_timeout(&self) -> Result<Duration> {
        let timeout = humantime::parse_duration(self.timeout.trim())
            .map_err(|_| Error::InvalidConfig(format!("Incorrect timeout configuration: {}", self.timeout)))?;
        if timeout.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "Incorrect timeout configuration: {} (must be positive)",
                self.timeout
            )));
        }
        Ok(timeout)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// Validates registry configuration consistency
    /// # Errors
    /// Returns `Error::InvalidConfig` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.protocol != ZOOKEEPER_PROTOCOL {
            return Err(RegistryError::UnsupportedProtocol(self.protocol.clone()).into());
        }

        let addresses = self.addresses();
        if addresses.is_empty() {
            return Err(Error::InvalidConfig("address must list at least one host:port".into()));
        }
        for addr in &addresses {
            Self::validate_address(addr)?;
        }

        self.session_timeout()?;

        Self::validate_root(&self.interface_root, "interface_root")?;
        Self::validate_root(&self.application_root, "application_root")?;
        if self.interface_root == self.application_root {
            return Err(Error::InvalidConfig(
                "interface_root and application_root must differ".into(),
            ));
        }

        if self.watch_retry.base_delay_ms > self.watch_retry.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "watch_retry.base_delay_ms {} exceeds max_delay_ms {}",
                self.watch_retry.base_delay_ms, self.watch_retry.max_delay_ms
            )));
        }

        Ok(())
    }

    fn validate_address(addr: &str) -> Result<()> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidConfig(format!("address {} is not host:port", addr)))?;
        if host.is_empty() {
            return Err(Error::InvalidConfig(format!("address {} has an empty host", addr)));
        }
        match port.parse::<u16>() {
            Ok(p) if p != 0 => Ok(()),
            _ => Err(Error::InvalidConfig(format!("address {} has an invalid port", addr))),
        }
    }

    fn validate_root(
        root: &str,
        name: &str,
    ) -> Result<()> {
        if !root.starts_with('/') || root.len() < 2 || root.ends_with('/') {
            return Err(Error::InvalidConfig(format!(
                "{} must be an absolute node path, got {:?}",
                name, root
            )));
        }
        Ok(())
    }
}

fn default_protocol() -> String {
    ZOOKEEPER_PROTOCOL.to_string()
}
fn default_address() -> String {
    "127.0.0.1:2181".to_string()
}
fn default_timeout() -> String {
    "3s".to_string()
}
fn default_interface_root() -> String {
    DEFAULT_INTERFACE_ROOT.to_string()
}
fn default_application_root() -> String {
    DEFAULT_APPLICATION_ROOT.to_string()
}
fn default_close_grace_ms() -> u64 {
    DEFAULT_CLOSE_GRACE_MS
}
