//! Connection state tracking
//!
//! # Connection States
//!
//! - **Disconnected**: initial state, and the state after every session ends
//! - **Connecting**: `connect()` is opening the transport
//! - **Open**: a session is live and its dispatcher is running
//! - **Closing**: `close()` is tearing the session down
//!
//! # State Transitions
//!
//! ```text
//! Disconnected → Connecting → Open → Closing → Disconnected
//!                     ↓         ↓
//!               Disconnected  Disconnected (transport lost)
//! ```
//!
//! There is no reconnecting state: after a loss the application calls
//! `connect()` again. Transitions are published on a `watch` channel so
//! callers can await changes.

use async_web3_core::{Error, Result};
use std::fmt;
use tokio::sync::watch;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    /// Numeric value reported on the state gauge
    pub fn as_i64(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::Closing => 3,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Owner of the state; transitions are checked and atomic
pub struct ConnectionManager {
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { state }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver observing every transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Disconnected -> Connecting, or `Error::AlreadyConnected`
    pub fn begin_connect(&self) -> Result<()> {
        if self.transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
            Ok(())
        } else {
            Err(Error::AlreadyConnected)
        }
    }

    /// Connecting -> Open; false if the state moved on meanwhile
    pub fn opened(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Open)
    }

    /// Open -> Closing; false when there is nothing to close
    pub fn begin_close(&self) -> bool {
        self.transition(ConnectionState::Open, ConnectionState::Closing)
    }

    /// Any state -> Disconnected
    pub fn disconnected(&self) {
        self.state.send_if_modified(|state| {
            let changed = *state != ConnectionState::Disconnected;
            *state = ConnectionState::Disconnected;
            changed
        });
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
