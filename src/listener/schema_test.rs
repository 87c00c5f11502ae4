use super::*;
use crate::Error;
use crate::RegistryConfig;
use crate::ServiceKey;
use crate::WatchError;

fn encoded(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

#[test]
fn test_interface_paths() {
    let config = RegistryConfig::default();
    assert_eq!(InterfaceSchema::root_path(&config), "/dubbo");
    assert_eq!(
        InterfaceSchema::service_path("/dubbo", "com.foo.Bar"),
        "/dubbo/com.foo.Bar/providers"
    );
    assert_eq!(
        InterfaceSchema::listener_key("com.foo.Bar"),
        ServiceKey::listener_key(RegisteredType::Interface, "com.foo.Bar")
    );
}

#[test]
fn test_interface_decodes_provider_url() {
    let node = encoded("dubbo://10.0.0.1:20880/com.foo.Bar?group=g1&version=1.0.0&weight=100");
    let (key, endpoint) = InterfaceSchema::decode_instance("com.foo.Bar", &node, None).unwrap();

    assert_eq!(
        key,
        ServiceKey::interface("com.foo.Bar", Some("g1".into()), Some("1.0.0".into()))
    );
    assert_eq!(endpoint.id, "10.0.0.1:20880");
    assert_eq!(endpoint.address, "10.0.0.1");
    assert_eq!(endpoint.port, 20880);
    assert_eq!(endpoint.metadata["weight"], "100");
    assert_eq!(endpoint.metadata["protocol"], "dubbo");
}

#[test]
fn test_interface_without_group_or_version() {
    let node = encoded("tri://10.0.0.2:50051/com.foo.Bar?side=provider");
    let (key, endpoint) = InterfaceSchema::decode_instance("com.foo.Bar", &node, None).unwrap();

    assert_eq!(key, ServiceKey::interface("com.foo.Bar", None, None));
    assert_eq!(endpoint.metadata["protocol"], "tri");
}

#[test]
fn test_interface_rejects_garbage_and_missing_port() {
    let bad = ["not a url".to_string(), encoded("dubbo://10.0.0.1/com.foo.Bar")];
    for node in &bad {
        let err = InterfaceSchema::decode_instance("com.foo.Bar", node, None).unwrap_err();
        assert!(matches!(err, Error::Watch(WatchError::Decode { .. })), "{}", node);
    }
}

#[test]
fn test_reserved_interface_root_children_are_not_services() {
    for reserved in ["config", "metadata", "mapping"] {
        assert!(!InterfaceSchema::is_service(reserved));
        assert!(ApplicationSchema::is_service(reserved));
    }
    assert!(InterfaceSchema::is_service("com.foo.Bar"));
}

#[test]
fn test_application_paths() {
    let config = RegistryConfig::default();
    assert_eq!(ApplicationSchema::root_path(&config), "/services");
    assert_eq!(ApplicationSchema::service_path("/services", "shop"), "/services/shop");
}

#[test]
fn test_application_decodes_instance_json() {
    let data = br#"{
        "name": "shop",
        "id": "10.0.0.3:20880",
        "address": "10.0.0.3",
        "port": 20880,
        "payload": {"@class": "ignored", "metadata": {"dubbo.metadata.revision": "abc"}}
    }"#;
    let (key, endpoint) = ApplicationSchema::decode_instance("shop", "10.0.0.3:20880", Some(data)).unwrap();

    assert_eq!(key, ServiceKey::application("shop"));
    assert_eq!(endpoint.id, "10.0.0.3:20880");
    assert_eq!(endpoint.port, 20880);
    assert_eq!(endpoint.metadata["dubbo.metadata.revision"], "abc");
}

#[test]
fn test_application_id_falls_back_to_node_name() {
    let data = br#"{"address": "10.0.0.4", "port": 8080}"#;
    let (_, endpoint) = ApplicationSchema::decode_instance("shop", "inst1", Some(data)).unwrap();
    assert_eq!(endpoint.id, "inst1");
    assert!(endpoint.metadata.is_empty());
}

#[test]
fn test_application_rejects_missing_or_bad_payload() {
    assert!(ApplicationSchema::decode_instance("shop", "inst1", None).is_err());
    assert!(ApplicationSchema::decode_instance("shop", "inst1", Some(b"{")).is_err());
    assert!(ApplicationSchema::decode_instance("shop", "inst1", Some(br#"{"address":"x","port":99999}"#)).is_err());
}
