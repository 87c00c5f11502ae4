use std::sync::Arc;

use super::*;

fn added(
    key: &ServiceKey,
    id: &str,
) -> DiscoveryDelta {
    DiscoveryDelta::Added {
        key: key.clone(),
        endpoint: Endpoint::new(id, "10.0.0.1", 20880),
    }
}

fn removed(
    key: &ServiceKey,
    id: &str,
) -> DiscoveryDelta {
    DiscoveryDelta::Removed {
        key: key.clone(),
        endpoint_id: id.to_string(),
    }
}

#[test]
fn test_add_then_remove_drops_empty_key() {
    let table = ServiceTable::new();
    let key = ServiceKey::application("serviceA");

    assert!(table.apply(added(&key, "inst1")));
    assert_eq!(table.instances(&key).len(), 1);

    assert!(table.apply(removed(&key, "inst1")));
    assert!(!table.contains(&key));
    assert!(table.is_empty());
}

#[test]
fn test_duplicate_add_and_unknown_remove_are_noops() {
    let table = ServiceTable::new();
    let key = ServiceKey::application("serviceA");

    assert!(table.apply(added(&key, "inst1")));
    assert!(!table.apply(added(&key, "inst1")));
    assert!(!table.apply(removed(&key, "inst9")));
    assert!(!table.apply(removed(&ServiceKey::application("other"), "inst1")));
    assert_eq!(table.instances(&key).len(), 1);
}

#[test]
fn test_added_with_same_id_replaces_payload() {
    let table = ServiceTable::new();
    let key = ServiceKey::application("serviceA");
    table.apply(added(&key, "inst1"));

    let moved = Endpoint::new("inst1", "10.0.0.2", 20881);
    assert!(table.apply(DiscoveryDelta::Added {
        key: key.clone(),
        endpoint: moved.clone(),
    }));
    assert_eq!(table.instances(&key), vec![moved]);
}

#[test]
fn test_purge_removes_all_groups_and_versions_of_one_scope() {
    let table = ServiceTable::new();
    let v1 = ServiceKey::interface("com.foo.Bar", Some("g1".into()), Some("1.0".into()));
    let v2 = ServiceKey::interface("com.foo.Bar", None, Some("2.0".into()));
    let other = ServiceKey::interface("com.foo.Baz", None, None);
    let same_name_app = ServiceKey::application("com.foo.Bar");

    table.apply(added(&v1, "a"));
    table.apply(added(&v2, "b"));
    table.apply(added(&v2, "c"));
    table.apply(added(&other, "d"));
    table.apply(added(&same_name_app, "e"));

    assert_eq!(table.purge(RegisteredType::Interface, "com.foo.Bar"), 3);
    assert_eq!(table.services(), {
        let mut keys = vec![other, same_name_app];
        keys.sort();
        keys
    });
}

#[test]
fn test_snapshot_and_services_of() {
    let table = ServiceTable::new();
    let app = ServiceKey::application("serviceA");
    let intf = ServiceKey::interface("com.foo.Bar", None, None);
    table.apply(added(&app, "inst2"));
    table.apply(added(&app, "inst1"));
    table.apply(added(&intf, "10.0.0.1:20880"));

    let snapshot = table.snapshot();
    assert_eq!(snapshot[&app], vec!["inst1", "inst2"]);
    assert_eq!(table.services_of(RegisteredType::Application), vec![app]);
    assert_eq!(table.len(), 2);
}

#[tokio::test]
async fn test_feed_only_carries_effective_changes() {
    let table = ServiceTable::new();
    let mut feed = table.subscribe();
    let key = ServiceKey::application("serviceA");

    table.apply(added(&key, "inst1"));
    table.apply(added(&key, "inst1"));
    table.apply(removed(&key, "inst1"));

    assert_eq!(feed.recv().await.unwrap(), added(&key, "inst1"));
    assert_eq!(feed.recv().await.unwrap(), removed(&key, "inst1"));
    assert!(feed.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_on_distinct_keys() {
    let table = Arc::new(ServiceTable::new());
    let mut handles = Vec::new();
    for writer in 0..4 {
        let table = table.clone();
        handles.push(tokio::spawn(async move {
            let key = ServiceKey::application(format!("app-{}", writer));
            for i in 0..100 {
                table.apply(added(&key, &format!("inst{}", i)));
            }
            for i in 0..50 {
                table.apply(removed(&key, &format!("inst{}", i)));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(table.len(), 4);
    for writer in 0..4 {
        let key = ServiceKey::application(format!("app-{}", writer));
        assert_eq!(table.instances(&key).len(), 50);
    }
}
