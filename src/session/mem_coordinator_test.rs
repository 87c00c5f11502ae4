use std::time::Duration;

use tokio::time::timeout;

use super::*;
use crate::constants::SESSION_EVENT_BUFFER;
use crate::ConnectionError;
use crate::Error;
use crate::SessionError;

const ADDR: &str = "127.0.0.1:2181";

async fn connected() -> (MemCoordinator, SessionEventStream) {
    let coordinator = MemCoordinator::new(vec![ADDR.to_string()]);
    let (_client, events) = coordinator
        .connect("test", &[ADDR.to_string()], Duration::from_secs(1))
        .await
        .expect("connect should succeed");
    (coordinator, events)
}

fn names(children: &[ChildNode]) -> Vec<&str> {
    children.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn test_connect_rejects_unknown_addresses() {
    let coordinator = MemCoordinator::new(vec![ADDR.to_string()]);
    let result = coordinator
        .connect("test", &["10.255.255.1:2181".to_string()], Duration::from_secs(1))
        .await;

    assert!(matches!(
        result,
        Err(Error::Connection(ConnectionError::Unreachable { .. }))
    ));
}

#[tokio::test]
async fn test_create_builds_parents_and_lists_direct_children_only() {
    let (zk, _events) = connected().await;
    zk.create("/services/app-a/inst1", "x").unwrap();
    zk.create("/services/app-b", "").unwrap();
    zk.create("/services-other/app-c", "").unwrap();

    let children = zk.children("/services").await.unwrap();
    assert_eq!(names(&children), vec!["app-a", "app-b"]);

    let root = zk.children("/").await.unwrap();
    assert_eq!(names(&root), vec!["services", "services-other"]);
}

#[tokio::test]
async fn test_missing_node_lists_empty() {
    let (zk, _events) = connected().await;
    assert!(zk.children("/dubbo").await.unwrap().is_empty());
    assert_eq!(zk.get_data("/dubbo").await.unwrap(), None);
}

#[tokio::test]
async fn test_watch_fires_once_on_child_creation() {
    let (zk, _events) = connected().await;
    zk.create("/services", "").unwrap();

    let (children, watch) = zk.watch_children("/services").await.unwrap();
    assert!(children.is_empty());

    zk.create("/services/app-a", "").unwrap();
    let event = timeout(Duration::from_millis(100), watch).await.unwrap().unwrap();
    assert_eq!(event.kind, NodeEventKind::ChildrenChanged);
    assert_eq!(event.path, "/services");

    // one-shot: nothing is armed anymore
    assert_eq!(zk.active_watch_count("/services"), 0);
}

#[tokio::test]
async fn test_watch_on_missing_node_fires_on_creation() {
    let (zk, _events) = connected().await;
    let (_, watch) = zk.watch_children("/dubbo").await.unwrap();

    zk.create("/dubbo/com.foo.Bar/providers", "").unwrap();
    let event = timeout(Duration::from_millis(100), watch).await.unwrap().unwrap();
    assert_eq!(event.kind, NodeEventKind::Created);
}

#[tokio::test]
async fn test_child_data_change_fires_and_bumps_version() {
    let (zk, _events) = connected().await;
    zk.create("/services/app-a/inst1", "v0").unwrap();

    let (children, watch) = zk.watch_children("/services/app-a").await.unwrap();
    assert_eq!(names(&children), vec!["inst1"]);
    assert_eq!(children[0].version, 0);
    let created = children[0].created;

    zk.set_data("/services/app-a/inst1", "v1").unwrap();
    let event = timeout(Duration::from_millis(100), watch).await.unwrap().unwrap();
    assert_eq!(event.kind, NodeEventKind::DataChanged);

    let children = zk.children("/services/app-a").await.unwrap();
    assert_eq!(children, vec![ChildNode::new("inst1", created, 1)]);
    assert_eq!(
        zk.get_data("/services/app-a/inst1").await.unwrap(),
        Some(Bytes::from("v1"))
    );
}

#[tokio::test]
async fn test_recreated_node_gets_a_new_creation_stamp() {
    let (zk, _events) = connected().await;
    zk.create("/services/app-a/inst1", "v0").unwrap();
    let before = zk.children("/services/app-a").await.unwrap().remove(0);

    zk.delete("/services/app-a/inst1").unwrap();
    zk.create("/services/app-a/inst1", "v0").unwrap();
    let after = zk.children("/services/app-a").await.unwrap().remove(0);

    assert_eq!(after.name, before.name);
    assert_eq!(after.version, before.version);
    assert!(after.created > before.created);
    assert!(!after.same_revision(before.created, before.version));
}

#[tokio::test]
async fn test_delete_is_recursive_and_spares_siblings_with_common_prefix() {
    let (zk, _events) = connected().await;
    zk.create("/services/app/inst1", "").unwrap();
    zk.create("/services/app-b/inst1", "").unwrap();

    let (_, watch) = zk.watch_children("/services/app").await.unwrap();
    zk.delete("/services/app").unwrap();

    let event = timeout(Duration::from_millis(100), watch).await.unwrap().unwrap();
    assert_eq!(event.kind, NodeEventKind::ChildrenChanged);
    assert!(!zk.exists("/services/app"));
    assert!(!zk.exists("/services/app/inst1"));
    assert!(zk.exists("/services/app-b/inst1"));
}

#[tokio::test]
async fn test_disconnect_drops_watches_and_fails_calls() {
    let (zk, mut events) = connected().await;
    zk.create("/services", "").unwrap();
    let (_, watch) = zk.watch_children("/services").await.unwrap();

    zk.disconnect();
    assert_eq!(events.recv().await, Some(SessionEvent::Disconnected));
    assert!(watch.await.is_err(), "watch should be lost");

    let err = zk.children("/services").await.unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::ConnectionLoss)));

    // writes by other clients still land, silently
    zk.create("/services/app-a", "").unwrap();

    zk.reconnect();
    assert_eq!(events.recv().await, Some(SessionEvent::Connected));
    let children = zk.children("/services").await.unwrap();
    assert_eq!(names(&children), vec!["app-a"]);
}

#[tokio::test]
async fn test_expire_emits_expired() {
    let (zk, mut events) = connected().await;
    zk.expire();
    assert_eq!(events.recv().await, Some(SessionEvent::Expired));
    assert!(!zk.is_connected());
}

#[tokio::test]
async fn test_event_flood_keeps_every_event_in_order() {
    let (zk, mut events) = connected().await;
    let flaps = SESSION_EVENT_BUFFER * 2;
    for _ in 0..flaps {
        zk.disconnect();
        zk.reconnect();
    }

    let mut received = Vec::new();
    while received.len() < flaps * 2 {
        let event = timeout(Duration::from_millis(500), events.recv()).await.unwrap().unwrap();
        received.push(event);
    }
    assert!(received
        .chunks(2)
        .all(|pair| pair == [SessionEvent::Disconnected, SessionEvent::Connected]));
    assert_eq!(received.last(), Some(&SessionEvent::Connected));
}

#[tokio::test]
async fn test_close_rejects_further_calls() {
    let (zk, _events) = connected().await;
    zk.close().await;
    let err = zk.children("/").await.unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::Closed)));
}

#[tokio::test]
async fn test_active_watch_count_ignores_dropped_receivers() {
    let (zk, _events) = connected().await;
    let (_, watch1) = zk.watch_children("/dubbo").await.unwrap();
    let (_, _watch2) = zk.watch_children("/dubbo").await.unwrap();
    assert_eq!(zk.active_watch_count("/dubbo"), 2);

    drop(watch1);
    assert_eq!(zk.active_watch_count("/dubbo"), 1);
}

#[test]
fn test_join_path() {
    assert_eq!(join_path("/", "dubbo"), "/dubbo");
    assert_eq!(join_path("/dubbo", "com.foo.Bar"), "/dubbo/com.foo.Bar");
    assert_eq!(join_path("/dubbo/", "x"), "/dubbo/x");
}
