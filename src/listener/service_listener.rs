use std::collections::HashMap;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

use super::Listener;
use super::ListenerState;
use super::ScopeSchema;
use super::WatchContext;
use super::WatchTarget;
use super::WatchTask;
use super::WriteGate;
use crate::session::join_path;
use crate::ChildNode;
use crate::DiscoveryDelta;
use crate::RegisteredType;
use crate::Result;
use crate::ServiceKey;
use crate::ServiceTable;
use crate::SessionClient;

/// Watches the instance directory of one service and mirrors it into the table
pub struct ServiceListener<S: ScopeSchema> {
    task: Arc<WatchTask>,
    target: Arc<InstanceTarget<S>>,
    ctx: WatchContext,
}

/// What was applied for one instance node
#[derive(Debug, Clone)]
struct Seen {
    created: u64,
    version: u64,
    key: ServiceKey,
    endpoint_id: String,
}

struct InstanceTarget<S> {
    service: String,
    path: String,
    client: Arc<dyn SessionClient>,
    table: Arc<ServiceTable>,
    /// node name -> last applied instance
    seen: Mutex<HashMap<String, Seen>>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: ScopeSchema> ServiceListener<S> {
    pub(crate) fn new(
        root: &str,
        service: &str,
        ctx: WatchContext,
    ) -> Self {
        let path = S::service_path(root, service);
        let target = InstanceTarget {
            service: service.to_string(),
            path: path.clone(),
            client: ctx.client.clone(),
            table: ctx.table.clone(),
            seen: Mutex::new(HashMap::new()),
            _schema: PhantomData,
        };
        Self {
            task: Arc::new(WatchTask::new(path, S::REGISTERED_TYPE, ctx.close_grace)),
            target: Arc::new(target),
            ctx,
        }
    }

    pub fn service(&self) -> &str {
        &self.target.service
    }

    pub fn path(&self) -> &str {
        &self.target.path
    }
}

#[async_trait]
impl<S: ScopeSchema> Listener for ServiceListener<S> {
    fn registered_type(&self) -> RegisteredType {
        S::REGISTERED_TYPE
    }

    fn state(&self) -> ListenerState {
        self.task.state()
    }

    fn watch_and_handle(&self) -> Result<()> {
        self.task.start(self.target.clone(), self.ctx.clone())
    }

    fn cancel(&self) {
        self.task.cancel();
    }

    async fn close(&self) {
        self.task.close().await;
    }
}

#[async_trait]
impl<S: ScopeSchema> WatchTarget for InstanceTarget<S> {
    fn path(&self) -> &str {
        &self.path
    }

    async fn sync(
        &self,
        children: Vec<ChildNode>,
        resync: bool,
        gate: &WriteGate,
    ) -> Result<()> {
        let previous = self.seen.lock().clone();
        let mut next: HashMap<String, Seen> = HashMap::with_capacity(children.len());
        let mut added = Vec::new();

        for child in children {
            // After a resync every node is read again
            if let Some(seen) = previous.get(&child.name).filter(|_| !resync) {
                if child.same_revision(seen.created, seen.version) {
                    next.insert(child.name, seen.clone());
                    continue;
                }
            }

            let node_path = join_path(&self.path, &child.name);
            let data = if S::NEEDS_DATA {
                match self.client.get_data(&node_path).await? {
                    Some(data) => Some(data),
                    // Deleted between listing and read
                    None => continue,
                }
            } else {
                None
            };

            match S::decode_instance(&self.service, &child.name, data.as_deref()) {
                Ok((key, endpoint)) => {
                    next.insert(
                        child.name,
                        Seen {
                            created: child.created,
                            version: child.version,
                            key: key.clone(),
                            endpoint_id: endpoint.id.clone(),
                        },
                    );
                    added.push(DiscoveryDelta::Added { key, endpoint });
                }
                Err(e) => warn!(path = %node_path, "skipping instance: {}", e),
            }
        }

        let live: HashSet<(&ServiceKey, &str)> = next.values().map(|s| (&s.key, s.endpoint_id.as_str())).collect();
        let removed: Vec<DiscoveryDelta> = previous
            .iter()
            .filter(|(name, old)| {
                let replaced = next
                    .get(*name)
                    .is_some_and(|new| new.key != old.key || new.endpoint_id != old.endpoint_id);
                (!next.contains_key(*name) || replaced) && !live.contains(&(&old.key, old.endpoint_id.as_str()))
            })
            .map(|(_, old)| DiscoveryDelta::Removed {
                key: old.key.clone(),
                endpoint_id: old.endpoint_id.clone(),
            })
            .collect();
        drop(live);

        let (removed_count, added_count) = (removed.len(), added.len());
        let applied = gate.write(|| {
            for delta in removed.into_iter().chain(added) {
                self.table.apply(delta);
            }
            *self.seen.lock() = next;
        });

        match applied {
            Some(()) => debug!(
                path = %self.path,
                service = %self.service,
                added = added_count,
                removed = removed_count,
                "instances synced"
            ),
            None => debug!(path = %self.path, "listener cancelled, listing dropped"),
        }
        Ok(())
    }
}
