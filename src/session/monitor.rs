use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::SessionEvent;
use super::SessionEventStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected,
    Expired,
    /// Event stream ended or the monitor was stopped
    Closed,
}

/// Latest session state plus a connection epoch
///
/// `epoch` grows by one on every transition into `Connected`, so an observer
/// that missed a fast disconnect/reconnect still sees that it must resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub epoch: u64,
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Folds one raw event into the status
    pub(crate) fn apply(
        self,
        event: SessionEvent,
    ) -> Self {
        match event {
            SessionEvent::Connected if self.state == SessionState::Connected => self,
            SessionEvent::Connected => SessionStatus {
                state: SessionState::Connected,
                epoch: self.epoch + 1,
            },
            SessionEvent::Disconnected => SessionStatus {
                state: SessionState::Disconnected,
                ..self
            },
            SessionEvent::Expired => SessionStatus {
                state: SessionState::Expired,
                ..self
            },
        }
    }
}

/// Consumes a connector's raw event stream and publishes [`SessionStatus`]
///
/// Registered once per session by the orchestrator; listeners only ever see
/// the `watch` side.
#[derive(Debug)]
pub struct SessionMonitor {
    status_rx: watch::Receiver<SessionStatus>,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SessionMonitor {
    /// Spawns the handler task. The session is assumed connected on entry.
    pub fn register_handler(
        name: &str,
        mut events: SessionEventStream,
    ) -> Self {
        let initial = SessionStatus {
            state: SessionState::Connected,
            epoch: 1,
        };
        let (status_tx, status_rx) = watch::channel(initial);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let name = name.to_string();

        let handle = tokio::spawn(async move {
            debug!(client = %name, "session handler started");
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            let previous = *status_tx.borrow();
                            let next = previous.apply(event);
                            match event {
                                SessionEvent::Connected => info!(client = %name, epoch = next.epoch, "session connected"),
                                SessionEvent::Disconnected => warn!(client = %name, "session disconnected"),
                                SessionEvent::Expired => warn!(client = %name, "session expired"),
                            }
                            if next != previous {
                                status_tx.send_replace(next);
                            }
                        }
                        None => {
                            warn!(client = %name, "session event stream ended");
                            break;
                        }
                    }
                }
            }
            status_tx.send_modify(|s| s.state = SessionState::Closed);
            debug!(client = %name, "session handler stopped");
        });

        Self {
            status_rx,
            token,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_rx.borrow()
    }

    /// Stops the handler task; observers see `Closed`. Safe to call twice.
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("session handler task failed: {:?}", e);
            }
        }
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
