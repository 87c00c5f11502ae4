//! Watch loop shared by every listener.
//!
//! A [`WatchTask`] owns the lifecycle (state cell, write gate, cancellation
//! token, task handle); a [`WatchTarget`] supplies the subtree path and what to
//! do with each full listing. The loop itself never decodes anything.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ListenerEvent;
use super::ListenerState;
use crate::constants::CONN_DELAY;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::ChildNode;
use crate::RegisteredType;
use crate::RegistryError;
use crate::Result;
use crate::ServiceTable;
use crate::SessionClient;
use crate::SessionState;
use crate::SessionStatus;

/// Shared by a listener's writes and its cancellation.
///
/// Writers hold the read side for the duration of one mutation; `close()` takes
/// the write side, so once it returns no mutation is in flight and none will start.
#[derive(Debug)]
pub(crate) struct WriteGate {
    open: RwLock<bool>,
}

impl WriteGate {
    pub(crate) fn new() -> Self {
        Self {
            open: RwLock::new(true),
        }
    }

    /// Runs `f` if the gate is still open
    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        let open = self.open.read();
        if *open {
            Some(f())
        } else {
            None
        }
    }

    pub(crate) fn close(&self) {
        *self.open.write() = false;
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        *self.open.read()
    }
}

/// Everything a watch loop needs from the orchestrator
#[derive(Clone)]
pub(crate) struct WatchContext {
    pub(crate) client: Arc<dyn SessionClient>,
    pub(crate) session: watch::Receiver<SessionStatus>,
    pub(crate) table: Arc<ServiceTable>,
    pub(crate) retry: BackoffPolicy,
    pub(crate) close_grace: Duration,
}

/// What a watch loop watches and how it applies a listing
#[async_trait]
pub(crate) trait WatchTarget: Send + Sync + 'static {
    fn path(&self) -> &str;

    /// Reconciles the local view with a full listing of `path()`.
    ///
    /// `resync` is set on the first pass after start or after notifications may
    /// have been missed; nothing cached from earlier passes may be trusted then.
    /// Every mutation must go through `gate`.
    async fn sync(
        &self,
        children: Vec<ChildNode>,
        resync: bool,
        gate: &WriteGate,
    ) -> Result<()>;
}

#[derive(Debug)]
pub(crate) struct WatchTask {
    path: String,
    registered_type: RegisteredType,
    state: Mutex<ListenerState>,
    gate: WriteGate,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    close_grace: Duration,
}

impl WatchTask {
    pub(crate) fn new(
        path: impl Into<String>,
        registered_type: RegisteredType,
        close_grace: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            registered_type,
            state: Mutex::new(ListenerState::Created),
            gate: WriteGate::new(),
            token: CancellationToken::new(),
            handle: Mutex::new(None),
            close_grace,
        }
    }

    pub(crate) fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// Applies `event`; false if the state machine rejected it
    fn transition(
        &self,
        event: ListenerEvent,
    ) -> bool {
        let mut state = self.state.lock();
        match state.on(event) {
            Ok(next) => {
                if next != *state {
                    trace!(path = %self.path, from = %*state, to = %next, "listener transition");
                }
                *state = next;
                true
            }
            Err(e) => {
                debug!(path = %self.path, "{}", e);
                false
            }
        }
    }

    /// Spawns the watch loop unless one is already live.
    ///
    /// A loop that died unexpectedly is replaced and starts by resynchronising.
    pub(crate) fn start(
        self: &Arc<Self>,
        target: Arc<dyn WatchTarget>,
        ctx: WatchContext,
    ) -> Result<()> {
        let mut handle = self.handle.lock();

        {
            let mut state = self.state.lock();
            match *state {
                ListenerState::Closed => {
                    return Err(RegistryError::ListenerClosed(self.registered_type).into());
                }
                ListenerState::Created => *state = ListenerState::Resyncing,
                _ => {
                    if handle.as_ref().is_some_and(|h| !h.is_finished()) {
                        trace!(path = %self.path, "watch loop already running");
                        return Ok(());
                    }
                    warn!(path = %self.path, "watch loop exited unexpectedly, restarting");
                    *state = ListenerState::Resyncing;
                }
            }
        }

        let task = self.clone();
        *handle = Some(tokio::spawn(async move { task.run(target, ctx).await }));
        info!(path = %self.path, registered_type = %self.registered_type, "listener started");
        Ok(())
    }

    /// Closes the gate and signals the loop; returns without waiting.
    pub(crate) fn cancel(&self) {
        self.transition(ListenerEvent::Close);
        self.gate.close();
        self.token.cancel();
    }

    /// Cancels, then waits up to the grace period for the loop to exit
    pub(crate) async fn close(&self) {
        self.cancel();
        let handle = self.handle.lock().take();
        let Some(mut handle) = handle else {
            return;
        };

        match timeout(self.close_grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => error!(path = %self.path, "watch loop failed: {:?}", e),
            Err(_) => {
                warn!(
                    path = %self.path,
                    "watch loop ignored cancellation for {:?}, aborting",
                    self.close_grace
                );
                handle.abort();
                let _ = handle.await;
            }
        }
        info!(path = %self.path, registered_type = %self.registered_type, "listener closed");
    }

    async fn run(
        self: Arc<Self>,
        target: Arc<dyn WatchTarget>,
        ctx: WatchContext,
    ) {
        let mut session = ctx.session.clone();
        let token = self.token.clone();
        let path = target.path().to_string();

        'resync: loop {
            let epoch = tokio::select! {
                biased;
                _ = token.cancelled() => break 'resync,
                connected = wait_connected(&mut session) => match connected {
                    Some(epoch) => epoch,
                    None => {
                        debug!(path = %path, "session closed, parking watch loop");
                        token.cancelled().await;
                        break 'resync;
                    }
                },
            };

            let arm = || {
                let client = ctx.client.clone();
                let path = path.clone();
                async move { client.watch_children(&path).await }
            };
            let armed = tokio::select! {
                biased;
                _ = token.cancelled() => break 'resync,
                armed = task_with_timeout_and_exponential_backoff(&path, arm, ctx.retry) => armed,
            };
            let (children, mut node_watch) = match armed {
                Ok(armed) => armed,
                Err(e) => {
                    error!(path = %path, epoch, "cannot arm watch: {}", e);
                    self.transition(ListenerEvent::WatchLost);
                    if !cool_down(&token, &mut session).await {
                        break 'resync;
                    }
                    continue;
                }
            };

            let resync = self.state() == ListenerState::Resyncing;
            let synced = tokio::select! {
                biased;
                _ = token.cancelled() => break 'resync,
                synced = target.sync(children, resync, &self.gate) => synced,
            };
            if let Err(e) = synced {
                warn!(path = %path, epoch, "cannot apply listing: {}", e);
                self.transition(ListenerEvent::WatchLost);
                if !cool_down(&token, &mut session).await {
                    break 'resync;
                }
                continue;
            }

            if resync {
                if !self.transition(ListenerEvent::Resynced) {
                    break 'resync;
                }
                debug!(path = %path, epoch, "listener in sync");
            }

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break 'resync,
                    changed = session.changed() => {
                        let status = *session.borrow_and_update();
                        if changed.is_err() || !status.is_connected() || status.epoch != epoch {
                            debug!(path = %path, state = ?status.state, epoch = status.epoch, "session lost, resyncing");
                            if !self.transition(ListenerEvent::SessionLost) {
                                break 'resync;
                            }
                            continue 'resync;
                        }
                    }
                    fired = &mut node_watch => match fired {
                        Ok(event) => {
                            trace!(path = %path, kind = ?event.kind, "watch fired");
                            if !self.transition(ListenerEvent::WatchFired) {
                                break 'resync;
                            }
                            continue 'resync;
                        }
                        Err(_) => {
                            debug!(path = %path, "watch lost, resyncing");
                            if !self.transition(ListenerEvent::WatchLost) {
                                break 'resync;
                            }
                            continue 'resync;
                        }
                    },
                }
            }
        }
        debug!(path = %path, "watch loop stopped");
    }
}

/// Waits for a connected session; `None` once the session is closed for good
async fn wait_connected(session: &mut watch::Receiver<SessionStatus>) -> Option<u64> {
    let status = session
        .wait_for(|s| s.is_connected() || s.state == SessionState::Closed)
        .await
        .map(|s| *s)
        .ok()?;
    status.is_connected().then_some(status.epoch)
}

/// Waits for the next session change or `CONN_DELAY`; false if cancelled
async fn cool_down(
    token: &CancellationToken,
    session: &mut watch::Receiver<SessionStatus>,
) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = session.changed() => true,
        _ = sleep(CONN_DELAY) => true,
    }
}
