//! Coordination-service session contract.
//!
//! The registry never talks to the coordination service directly. It consumes:
//! - [`SessionConnector`] - opens a session against an address list
//! - [`SessionClient`] - hierarchical read and one-shot watch primitives
//! - a raw [`SessionEvent`] stream, turned into [`SessionStatus`] by [`SessionMonitor`]
//!
//! [`MemCoordinator`] implements both traits in-process and is what the test
//! suites and embedded deployments run against.
//!
//! # Watch semantics
//!
//! `watch_children(path)` returns the current children of `path` together with a
//! one-shot [`NodeWatch`]. The watch fires once when:
//! - a direct child is created or deleted
//! - a direct child's data changes
//! - `path` itself is created (a missing node lists as empty) or deleted
//!
//! A watch whose sender is dropped without firing was lost (disconnect, expiry,
//! close) and the caller must resynchronise.

mod mem_coordinator;
mod monitor;

pub use mem_coordinator::*;
pub use monitor::*;

#[cfg(test)]
mod mem_coordinator_test;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::Result;

/// Health notifications about the session itself, distinct from data changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Expired,
}

/// Raw session events as produced by a connector
pub type SessionEventStream = mpsc::Receiver<SessionEvent>;

/// Child entry as returned by a listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildNode {
    pub name: String,
    /// Creation stamp, distinct for every incarnation of a node (czxid)
    pub created: u64,
    /// Data version, bumped on every write to the child and reset by a recreate
    pub version: u64,
}

impl ChildNode {
    pub fn new(
        name: impl Into<String>,
        created: u64,
        version: u64,
    ) -> Self {
        Self {
            name: name.into(),
            created,
            version,
        }
    }

    /// Same incarnation and same data version
    pub fn same_revision(
        &self,
        created: u64,
        version: u64,
    ) -> bool {
        self.created == created && self.version == version
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    /// Watched node appeared
    Created,
    /// A direct child was created or deleted
    ChildrenChanged,
    /// A direct child's data changed
    DataChanged,
    /// Watched node was deleted
    Deleted,
}

/// Payload of a fired watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub path: String,
    pub kind: NodeEventKind,
}

/// One-shot watch; `Err(RecvError)` means the watch was lost
pub type NodeWatch = oneshot::Receiver<NodeEvent>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionClient: Send + Sync + 'static {
    /// Direct children of `path`, empty if the node does not exist
    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<ChildNode>>;

    /// Direct children of `path` plus a one-shot watch armed atomically with the read
    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<(Vec<ChildNode>, NodeWatch)>;

    /// Data of `path`, `None` if the node does not exist
    async fn get_data(
        &self,
        path: &str,
    ) -> Result<Option<Bytes>>;

    /// Ends the session. Pending watches are dropped.
    async fn close(&self);
}

#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Opens a session against the first reachable address.
    ///
    /// Implementations should honour `timeout`, but callers must not rely on it.
    async fn connect(
        &self,
        name: &str,
        addresses: &[String],
        timeout: Duration,
    ) -> Result<(Arc<dyn SessionClient>, SessionEventStream)>;
}

/// Joins a node path with a child name
pub(crate) fn join_path(
    parent: &str,
    child: &str,
) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), child)
    }
}
