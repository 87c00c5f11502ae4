use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;

use super::Listener;
use super::ListenerState;
use super::ScopeSchema;
use super::ServiceListener;
use super::WatchContext;
use super::WatchTarget;
use super::WatchTask;
use super::WriteGate;
use crate::ChildNode;
use crate::RegisteredType;
use crate::Result;
use crate::ServiceKey;
use crate::SvcListenerRegistry;

/// Watches a scope root and keeps one [`ServiceListener`] per service under it
///
/// Per-service listeners are recorded in the base registry, which stays the
/// single source of truth for which services are being watched.
pub struct ScopeListener<S: ScopeSchema> {
    task: Arc<WatchTask>,
    target: Arc<ServicesTarget<S>>,
    ctx: WatchContext,
}

struct ServicesTarget<S> {
    root: String,
    ctx: WatchContext,
    svc_listeners: Arc<dyn SvcListenerRegistry>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: ScopeSchema> ScopeListener<S> {
    pub(crate) fn new(
        root: impl Into<String>,
        ctx: WatchContext,
        svc_listeners: Arc<dyn SvcListenerRegistry>,
    ) -> Self {
        let root = root.into();
        let target = ServicesTarget {
            root: root.clone(),
            ctx: ctx.clone(),
            svc_listeners,
            _schema: PhantomData,
        };
        Self {
            task: Arc::new(WatchTask::new(root, S::REGISTERED_TYPE, ctx.close_grace)),
            target: Arc::new(target),
            ctx,
        }
    }

    pub fn root(&self) -> &str {
        &self.target.root
    }
}

#[async_trait]
impl<S: ScopeSchema> Listener for ScopeListener<S> {
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

impl<S: ScopeSchema> ServicesTarget<S> {
    /// Services of this scope that currently have a listener
    fn watched(&self) -> BTreeSet<ServiceKey> {
        self.svc_listeners
            .get_all_svc_listener()
            .into_keys()
            .filter(|k| k.registered_type == S::REGISTERED_TYPE)
            .collect()
    }
}

#[async_trait]
impl<S: ScopeSchema> WatchTarget for ServicesTarget<S> {
    fn path(&self) -> &str {
        &self.root
    }

    async fn sync(
        &self,
        children: Vec<ChildNode>,
        _resync: bool,
        gate: &WriteGate,
    ) -> Result<()> {
        let current: BTreeSet<ServiceKey> = children
            .iter()
            .filter(|c| S::is_service(&c.name))
            .map(|c| S::listener_key(&c.name))
            .collect();
        let watched = self.watched();

        for key in current.difference(&watched) {
            let listener: Arc<dyn Listener> = Arc::new(ServiceListener::<S>::new(&self.root, &key.name, self.ctx.clone()));
            let started = gate.write(|| {
                if self.svc_listeners.set_svc_listener(key.clone(), listener.clone()) {
                    listener.watch_and_handle()
                } else {
                    Ok(())
                }
            });
            match started {
                Some(result) => {
                    result?;
                    info!(service = %key, "service listener added");
                }
                None => return Ok(()),
            }
        }

        for key in watched.difference(&current) {
            let Some(removed) = gate.write(|| self.svc_listeners.remove_svc_listener(key)) else {
                return Ok(());
            };
            if let Some(listener) = removed {
                listener.close().await;
                let purged = gate.write(|| self.ctx.table.purge(S::REGISTERED_TYPE, &key.name));
                info!(service = %key, purged = ?purged, "service listener removed");
            }
        }

        debug!(root = %self.root, services = current.len(), "services synced");
        Ok(())
    }
}
