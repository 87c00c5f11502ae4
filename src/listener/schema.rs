//! Subtree layout and payload format of each registration scope.

use std::collections::BTreeMap;

use serde::Deserialize;
use url::Url;

use crate::constants::INTERFACE_ROOT_RESERVED;
use crate::constants::PROVIDERS_CATEGORY;
use crate::session::join_path;
use crate::Endpoint;
use crate::RegisteredType;
use crate::RegistryConfig;
use crate::Result;
use crate::ServiceKey;
use crate::WatchError;

/// Where a scope's registrations live and how one instance node decodes
pub trait ScopeSchema: Send + Sync + 'static {
    const REGISTERED_TYPE: RegisteredType;

    /// Whether `decode_instance` needs the node's data, or the name alone is enough
    const NEEDS_DATA: bool;

    /// Scope root; its children are the services
    fn root_path(config: &RegistryConfig) -> String;

    /// Whether a child of the scope root names a service
    fn is_service(_name: &str) -> bool {
        true
    }

    /// Directory whose children are the instances of `service`
    fn service_path(
        root: &str,
        service: &str,
    ) -> String;

    /// Turns one instance node into the service key it belongs to and its endpoint
    fn decode_instance(
        service: &str,
        node: &str,
        data: Option<&[u8]>,
    ) -> Result<(ServiceKey, Endpoint)>;

    fn listener_key(service: &str) -> ServiceKey {
        ServiceKey::listener_key(Self::REGISTERED_TYPE, service)
    }
}

/// `/dubbo/<interface>/providers/<url-encoded provider url>`
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceSchema;

impl ScopeSchema for InterfaceSchema {
    const REGISTERED_TYPE: RegisteredType = RegisteredType::Interface;
    const NEEDS_DATA: bool = false;

    fn root_path(config: &RegistryConfig) -> String {
        config.interface_root.clone()
    }

    fn is_service(name: &str) -> bool {
        !INTERFACE_ROOT_RESERVED.contains(&name)
    }

    fn service_path(
        root: &str,
        service: &str,
    ) -> String {
        join_path(&join_path(root, service), PROVIDERS_CATEGORY)
    }

    fn decode_instance(
        service: &str,
        node: &str,
        _data: Option<&[u8]>,
    ) -> Result<(ServiceKey, Endpoint)> {
        let decode_error = |reason: String| WatchError::Decode {
            path: node.to_string(),
            reason,
        };

        let raw = urlencoding::decode(node).map_err(|e| decode_error(e.to_string()))?;
        let url = Url::parse(&raw).map_err(|e| decode_error(e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| decode_error("provider url has no host".into()))?;
        let port = url
            .port()
            .ok_or_else(|| decode_error("provider url has no port".into()))?;

        let mut metadata: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        metadata.insert("protocol".to_string(), url.scheme().to_string());
        let group = metadata.get("group").cloned();
        let version = metadata.get("version").cloned();

        let key = ServiceKey::interface(service, group, version);
        let endpoint = Endpoint::new(format!("{}:{}", host, port), host, port).with_metadata(metadata);
        Ok((key, endpoint))
    }
}

/// `/services/<application>/<instance id>`, JSON instance payload
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationSchema;

#[derive(Debug, Deserialize)]
struct InstancePayload {
    #[serde(default)]
    id: String,
    address: String,
    port: u16,
    #[serde(default)]
    payload: Option<InstanceMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct InstanceMetadata {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl ScopeSchema for ApplicationSchema {
    const REGISTERED_TYPE: RegisteredType = RegisteredType::Application;
    const NEEDS_DATA: bool = true;

    fn root_path(config: &RegistryConfig) -> String {
        config.application_root.clone()
    }

    fn service_path(
        root: &str,
        service: &str,
    ) -> String {
        join_path(root, service)
    }

    fn decode_instance(
        service: &str,
        node: &str,
        data: Option<&[u8]>,
    ) -> Result<(ServiceKey, Endpoint)> {
        let data = data.ok_or_else(|| WatchError::Decode {
            path: node.to_string(),
            reason: "instance node has no data".into(),
        })?;
        let instance: InstancePayload = serde_json::from_slice(data).map_err(|e| WatchError::Decode {
            path: node.to_string(),
            reason: e.to_string(),
        })?;

        // Instance id falls back to the node name
        let id = if instance.id.is_empty() {
            node.to_string()
        } else {
            instance.id
        };
        let metadata = instance.payload.unwrap_or_default().metadata;

        let endpoint = Endpoint::new(id, instance.address, instance.port).with_metadata(metadata);
        Ok((ServiceKey::application(service), endpoint))
    }
}
