//! Listener lifecycle state machine.
//!
//! ```text
//!            Start             Resynced
//! Created ---------> Resyncing ---------> Watching --+
//!                        ^                   |  ^    | WatchFired
//!                        +-------------------+  +----+
//!                      SessionLost | WatchLost
//!
//! any state --Close--> Closed (terminal)
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    /// Constructed, watch loop never started
    Created,
    /// Watch armed on the subtree, local view in sync
    Watching,
    /// Waiting for the session or re-reading the full subtree
    Resyncing,
    /// Terminal
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    /// Watch loop spawned
    Start,
    /// Full listing applied and watch armed
    Resynced,
    /// One-shot watch fired and was re-armed
    WatchFired,
    /// Session disconnected, expired or flapped
    SessionLost,
    /// Watch dropped without firing, or (re)arming it failed
    WatchLost,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid listener transition: {event:?} in state {from}")]
pub struct InvalidTransition {
    pub from: ListenerState,
    pub event: ListenerEvent,
}

impl ListenerState {
    pub fn on(
        self,
        event: ListenerEvent,
    ) -> std::result::Result<ListenerState, InvalidTransition> {
        use ListenerEvent::*;
        use ListenerState::*;

        match (self, event) {
            (_, Close) => Ok(Closed),
            (Created, Start) => Ok(Resyncing),
            (Resyncing, Resynced) => Ok(Watching),
            (Watching, WatchFired) => Ok(Watching),
            (Watching | Resyncing, SessionLost | WatchLost) => Ok(Resyncing),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self == ListenerState::Closed
    }

    /// Watch loop is live (watching or resynchronising)
    pub fn is_running(&self) -> bool {
        matches!(self, ListenerState::Watching | ListenerState::Resyncing)
    }
}

impl fmt::Display for ListenerState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ListenerState::Created => "created",
            ListenerState::Watching => "watching",
            ListenerState::Resyncing => "resyncing",
            ListenerState::Closed => "closed",
        };
        f.write_str(name)
    }
}
