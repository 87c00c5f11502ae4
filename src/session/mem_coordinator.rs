//! In-process coordination service.
//!
//! A hierarchical node store with one-shot child watches and injectable
//! session faults. Writes through the admin API (`create`, `set_data`,
//! `delete`) model other clients of the coordination service, so they keep
//! working while this session is disconnected - they just fire nothing.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;

use super::join_path;
use super::ChildNode;
use super::NodeEvent;
use super::NodeEventKind;
use super::NodeWatch;
use super::SessionClient;
use super::SessionConnector;
use super::SessionEvent;
use super::SessionEventStream;
use crate::constants::SESSION_EVENT_BUFFER;
use crate::ConnectionError;
use crate::Error;
use crate::Result;
use crate::SessionError;

#[derive(Debug)]
struct MemNode {
    data: Bytes,
    created: u64,
    version: u64,
}

#[derive(Debug, Default)]
struct MemState {
    nodes: BTreeMap<String, MemNode>,
    watches: HashMap<String, Vec<oneshot::Sender<NodeEvent>>>,
    sessions: Vec<mpsc::UnboundedSender<SessionEvent>>,
    /// Last creation stamp handed out
    created_seq: u64,
    connected: bool,
    closed: bool,
}

impl MemState {
    fn fire(
        &mut self,
        path: &str,
        kind: NodeEventKind,
    ) {
        if let Some(watchers) = self.watches.remove(path) {
            trace!(path, ?kind, watchers = watchers.len(), "firing watches");
            for tx in watchers {
                let _ = tx.send(NodeEvent {
                    path: path.to_string(),
                    kind,
                });
            }
        }
    }

    fn broadcast(
        &mut self,
        event: SessionEvent,
    ) {
        self.sessions.retain(|tx| tx.send(event).is_ok());
    }

    fn next_created(&mut self) -> u64 {
        self.created_seq += 1;
        self.created_seq
    }

    fn check_session(&self) -> Result<()> {
        if self.closed {
            return Err(SessionError::Closed.into());
        }
        if !self.connected {
            return Err(SessionError::ConnectionLoss.into());
        }
        Ok(())
    }

    fn children_of(
        &self,
        path: &str,
    ) -> Vec<ChildNode> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter(|(p, _)| !p[prefix.len()..].contains('/'))
            .map(|(p, node)| ChildNode::new(&p[prefix.len()..], node.created, node.version))
            .collect()
    }
}

/// In-memory hierarchical store implementing [`SessionClient`] and [`SessionConnector`]
#[derive(Debug, Clone)]
pub struct MemCoordinator {
    endpoints: Arc<Vec<String>>,
    state: Arc<Mutex<MemState>>,
}

impl MemCoordinator {
    /// `endpoints` are the addresses this coordinator answers on
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
            state: Arc::new(Mutex::new(MemState::default())),
        }
    }

    /// Creates `path` (and missing parents) with `data`; overwrites data if it exists.
    pub fn create(
        &self,
        path: &str,
        data: impl Into<Bytes>,
    ) -> Result<()> {
        let path = normalize(path)?;
        if path == "/" {
            return Ok(());
        }
        let data = data.into();
        let mut state = self.state.lock();

        if state.nodes.contains_key(&path) {
            drop(state);
            return self.set_data(&path, data);
        }

        let mut current = String::new();
        let segments: Vec<&str> = path[1..].split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            let parent = if current.is_empty() { "/".to_string() } else { current.clone() };
            current = join_path(&parent, segment);
            if state.nodes.contains_key(&current) {
                continue;
            }
            let node_data = if i + 1 == segments.len() { data.clone() } else { Bytes::new() };
            let created = state.next_created();
            state.nodes.insert(
                current.clone(),
                MemNode {
                    data: node_data,
                    created,
                    version: 0,
                },
            );
            debug!(path = %current, created, "node created");
            state.fire(&current, NodeEventKind::Created);
            state.fire(&parent, NodeEventKind::ChildrenChanged);
        }
        Ok(())
    }

    /// Replaces the data of an existing node
    pub fn set_data(
        &self,
        path: &str,
        data: impl Into<Bytes>,
    ) -> Result<()> {
        let path = normalize(path)?;
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(&path)
            .ok_or_else(|| Error::Fatal(format!("node {} does not exist", path)))?;
        node.data = data.into();
        node.version += 1;
        debug!(path = %path, version = node.version, "node data changed");
        let parent = parent_of(&path);
        state.fire(&parent, NodeEventKind::DataChanged);
        Ok(())
    }

    /// Deletes `path` and its subtree. Missing nodes are ignored.
    pub fn delete(
        &self,
        path: &str,
    ) -> Result<()> {
        let path = normalize(path)?;
        let mut state = self.state.lock();
        let prefix = format!("{}/", path);
        let mut doomed: Vec<String> = state
            .nodes
            .range(path.clone()..)
            .filter(|(p, _)| **p == path || p.starts_with(&prefix))
            .map(|(p, _)| p.clone())
            .collect();
        // deepest first
        doomed.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));

        for node in doomed {
            state.nodes.remove(&node);
            debug!(path = %node, "node deleted");
            state.fire(&node, NodeEventKind::Deleted);
            state.fire(&parent_of(&node), NodeEventKind::ChildrenChanged);
        }
        Ok(())
    }

    pub fn exists(
        &self,
        path: &str,
    ) -> bool {
        normalize(path)
            .map(|p| self.state.lock().nodes.contains_key(&p))
            .unwrap_or(false)
    }

    /// Drops the connection: pending watches are lost and nothing fires until reconnect.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.watches.clear();
        state.broadcast(SessionEvent::Disconnected);
    }

    pub fn reconnect(&self) {
        let mut state = self.state.lock();
        state.connected = true;
        state.broadcast(SessionEvent::Connected);
    }

    /// Expires the session; a following [`reconnect`](Self::reconnect) starts a fresh one.
    pub fn expire(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.watches.clear();
        state.broadcast(SessionEvent::Expired);
    }

    pub fn is_connected(&self) -> bool {
        let state = self.state.lock();
        state.connected && !state.closed
    }

    /// Watches on `path` whose receiver is still alive
    pub fn active_watch_count(
        &self,
        path: &str,
    ) -> usize {
        self.state
            .lock()
            .watches
            .get(path)
            .map(|w| w.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionClient for MemCoordinator {
    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<ChildNode>> {
        let path = normalize(path)?;
        let state = self.state.lock();
        state.check_session()?;
        Ok(state.children_of(&path))
    }

    async fn watch_children(
        &self,
        path: &str,
    ) -> Result<(Vec<ChildNode>, NodeWatch)> {
        let path = normalize(path)?;
        let mut state = self.state.lock();
        state.check_session()?;
        let children = state.children_of(&path);
        let (tx, rx) = oneshot::channel();
        let watchers = state.watches.entry(path).or_default();
        watchers.retain(|w| !w.is_closed());
        watchers.push(tx);
        Ok((children, rx))
    }

    async fn get_data(
        &self,
        path: &str,
    ) -> Result<Option<Bytes>> {
        let path = normalize(path)?;
        let state = self.state.lock();
        state.check_session()?;
        Ok(state.nodes.get(&path).map(|n| n.data.clone()))
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.connected = false;
        state.watches.clear();
        state.sessions.clear();
        debug!("mem coordinator session closed");
    }
}

#[async_trait]
impl SessionConnector for MemCoordinator {
    async fn connect(
        &self,
        name: &str,
        addresses: &[String],
        timeout: Duration,
    ) -> Result<(Arc<dyn SessionClient>, SessionEventStream)> {
        if addresses.is_empty() {
            return Err(ConnectionError::NoAddress.into());
        }
        if !addresses.iter().any(|a| self.endpoints.contains(a)) {
            return Err(ConnectionError::Unreachable {
                addresses: addresses.to_vec(),
                reason: "no endpoint answered".to_string(),
            }
            .into());
        }

        let (tx, rx) = mpsc::channel(SESSION_EVENT_BUFFER);
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        // Unbounded queue drained into the bounded stream; events are delayed, never dropped
        tokio::spawn(async move {
            while let Some(event) = queue_rx.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        {
            let mut state = self.state.lock();
            state.closed = false;
            state.connected = true;
            state.sessions.push(queue_tx);
        }
        debug!(client = name, ?addresses, ?timeout, "mem coordinator session opened");
        Ok((Arc::new(self.clone()), rx))
    }
}

fn normalize(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(Error::Fatal(format!("node path must be absolute: {:?}", path)));
    }
    if path == "/" {
        return Ok(path.to_string());
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.contains("//") {
        return Err(Error::Fatal(format!("malformed node path: {:?}", path)));
    }
    Ok(trimmed.to_string())
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}
