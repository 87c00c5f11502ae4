use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::BaseRegistry;
use super::Registry;
use super::SvcListenerRegistry;
use crate::constants::REGISTRY_CLIENT_NAME;
use crate::ApplicationSchema;
use crate::ConnectionError;
use crate::Error;
use crate::InterfaceSchema;
use crate::Listener;
use crate::ListenerState;
use crate::RegisteredType;
use crate::RegistryConfig;
use crate::RegistryError;
use crate::Result;
use crate::ScopeListener;
use crate::ScopeSchema;
use crate::ServiceTable;
use crate::SessionClient;
use crate::SessionConnector;
use crate::SessionMonitor;
use crate::SessionStatus;
use crate::WatchContext;

/// Registry backed by a watch-capable coordination service
///
/// Holds the only owning handle to the session client: listeners borrow it
/// through their watch context, and only [`shutdown`](Self::shutdown) closes it.
pub struct CoordinatorRegistry {
    config: RegistryConfig,
    client: Arc<dyn SessionClient>,
    monitor: SessionMonitor,
    table: Arc<ServiceTable>,
    svc_listeners: Arc<BaseRegistry>,
    listeners: Mutex<HashMap<RegisteredType, Arc<dyn Listener>>>,
}

impl CoordinatorRegistry {
    /// Connects, creates one listener per scope and starts them.
    ///
    /// Returns once the watch loops are spawned, not once they are in sync.
    pub async fn new(
        config: RegistryConfig,
        connector: &dyn SessionConnector,
    ) -> Result<Self> {
        Self::with_service_table(config, connector, Arc::new(ServiceTable::new())).await
    }

    /// Like [`new`](Self::new), writing into a table owned by the caller
    pub async fn with_service_table(
        config: RegistryConfig,
        connector: &dyn SessionConnector,
        table: Arc<ServiceTable>,
    ) -> Result<Self> {
        let registry = Self::connect_session(config, connector, table).await?;
        registry.init_listeners()?;
        Ok(registry)
    }

    /// Opens the session; no listener exists yet
    pub(crate) async fn connect_session(
        config: RegistryConfig,
        connector: &dyn SessionConnector,
        table: Arc<ServiceTable>,
    ) -> Result<Self> {
        config.validate()?;
        let session_timeout = config.session_timeout()?;
        let addresses = config.addresses();

        let connected = timeout(
            session_timeout,
            connector.connect(REGISTRY_CLIENT_NAME, &addresses, session_timeout),
        )
        .await;
        let (client, events) = match connected {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                error!(?addresses, "connect failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                error!(?addresses, ?session_timeout, "connect timed out");
                return Err(ConnectionError::Timeout {
                    addresses,
                    timeout: session_timeout,
                }
                .into());
            }
        };
        info!(?addresses, "registry session established");

        let monitor = SessionMonitor::register_handler(REGISTRY_CLIENT_NAME, events);
        Ok(Self {
            config,
            client,
            monitor,
            table,
            svc_listeners: Arc::new(BaseRegistry::new()),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    fn init_listeners(&self) -> Result<()> {
        let interface = self.scope_listener::<InterfaceSchema>();
        let application = self.scope_listener::<ApplicationSchema>();

        let mut listeners = self.listeners.lock();
        for listener in [interface, application] {
            listener.watch_and_handle()?;
            listeners.insert(listener.registered_type(), listener);
        }
        Ok(())
    }

    fn scope_listener<S: ScopeSchema>(&self) -> Arc<dyn Listener> {
        let ctx = WatchContext {
            client: self.client.clone(),
            session: self.monitor.subscribe(),
            table: self.table.clone(),
            retry: self.config.watch_retry,
            close_grace: self.config.close_grace(),
        };
        let svc_listeners: Arc<dyn SvcListenerRegistry> = self.svc_listeners.clone();
        Arc::new(ScopeListener::<S>::new(S::root_path(&self.config), ctx, svc_listeners))
    }

    fn listener(
        &self,
        registered_type: RegisteredType,
    ) -> Result<Arc<dyn Listener>> {
        self.listeners
            .lock()
            .get(&registered_type)
            .cloned()
            .ok_or_else(|| RegistryError::ListenerNotInitialized(registered_type).into())
    }

    /// Shared session client, for collaborators that write registrations
    pub fn client(&self) -> Arc<dyn SessionClient> {
        self.client.clone()
    }

    pub fn service_table(&self) -> Arc<ServiceTable> {
        self.table.clone()
    }

    pub fn svc_listeners(&self) -> Arc<BaseRegistry> {
        self.svc_listeners.clone()
    }

    pub fn session_status(&self) -> SessionStatus {
        self.monitor.status()
    }

    /// `None` once the scope listener was unsubscribed
    pub fn listener_state(
        &self,
        registered_type: RegisteredType,
    ) -> Option<ListenerState> {
        self.listeners.lock().get(&registered_type).map(|l| l.state())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Unsubscribes, then stops the session monitor and closes the client.
    ///
    /// The client is closed even if the unsubscribe was partial.
    pub async fn shutdown(&self) -> Result<()> {
        let unsubscribed = self.do_unsubscribe().await;
        self.monitor.stop().await;
        self.client.close().await;
        info!("registry shut down");
        unsubscribed
    }
}

#[async_trait]
impl Registry for CoordinatorRegistry {
    async fn do_subscribe(&self) -> Result<()> {
        let failures: Vec<Error> = RegisteredType::ALL
            .into_iter()
            .filter_map(|registered_type| {
                self.listener(registered_type)
                    .and_then(|listener| listener.watch_and_handle())
                    .map_err(|e| {
                        error!(%registered_type, "subscribe failed: {}", e);
                        e
                    })
                    .err()
            })
            .collect();

        if failures.is_empty() {
            debug!("subscribed");
            Ok(())
        } else {
            Err(Error::Incomplete {
                operation: "subscribe",
                failures,
            })
        }
    }

    async fn do_unsubscribe(&self) -> Result<()> {
        let mut failures = Vec::new();

        for registered_type in RegisteredType::ALL {
            let listener = self.listeners.lock().remove(&registered_type);
            match listener {
                Some(listener) => listener.close().await,
                None => {
                    error!(%registered_type, "no listener to close");
                    failures.push(RegistryError::ListenerNotInitialized(registered_type).into());
                }
            }
        }

        // Every entry is removed (and cancelled) before any close is awaited
        let drained: Vec<Arc<dyn Listener>> = self
            .svc_listeners
            .get_all_svc_listener()
            .into_keys()
            .filter_map(|key| self.svc_listeners.remove_svc_listener(&key))
            .collect();
        join_all(drained.iter().map(|listener| listener.close())).await;
        info!(drained = drained.len(), failed = failures.len(), "unsubscribed");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Incomplete {
                operation: "unsubscribe",
                failures,
            })
        }
    }
}

impl Drop for CoordinatorRegistry {
    fn drop(&mut self) {
        for listener in self.listeners.get_mut().values() {
            listener.cancel();
        }
        for listener in self.svc_listeners.get_all_svc_listener().values() {
            listener.cancel();
        }
    }
}
