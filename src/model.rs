//! Discovery data model shared by listeners, the service table and the
//! orchestrator.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Granularity at which services are published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegisteredType {
    /// One entry per RPC interface
    Interface,
    /// One entry per deployable application
    Application,
}

impl RegisteredType {
    pub const ALL: [RegisteredType; 2] = [RegisteredType::Interface, RegisteredType::Application];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegisteredType::Interface => "interface",
            RegisteredType::Application => "application",
        }
    }
}

impl fmt::Display for RegisteredType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one discoverable service
///
/// Interface keys carry the provider's group and version, application keys
/// leave both empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub registered_type: RegisteredType,
    pub name: String,
    pub group: Option<String>,
    pub version: Option<String>,
}

impl ServiceKey {
    pub fn interface(
        name: impl Into<String>,
        group: Option<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            registered_type: RegisteredType::Interface,
            name: name.into(),
            group: group.filter(|g| !g.is_empty()),
            version: version.filter(|v| !v.is_empty()),
        }
    }

    pub fn application(name: impl Into<String>) -> Self {
        Self {
            registered_type: RegisteredType::Application,
            name: name.into(),
            group: None,
            version: None,
        }
    }

    /// Key of the per-service listener that watches every group/version of `name`
    pub fn listener_key(
        registered_type: RegisteredType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            registered_type,
            name: name.into(),
            group: None,
            version: None,
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:", self.registered_type)?;
        if let Some(group) = &self.group {
            write!(f, "{}/", group)?;
        }
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

/// One reachable backend instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Stable id within its service (`host:port` for interface providers)
    pub id: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Change to apply to the service table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryDelta {
    /// Instance appeared, or its payload changed (upsert by endpoint id)
    Added { key: ServiceKey, endpoint: Endpoint },
    /// Instance went away
    Removed { key: ServiceKey, endpoint_id: String },
}

impl DiscoveryDelta {
    pub fn key(&self) -> &ServiceKey {
        match self {
            DiscoveryDelta::Added { key, .. } => key,
            DiscoveryDelta::Removed { key, .. } => key,
        }
    }
}
