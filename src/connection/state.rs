//! Coarse connection state.
//!
//! # States
//! ```text
//! CONNECTING → ACTIVE ⇄ PAUSED
//!                ↓  ↑
//!            RECONNECTING
//!                ↓
//!             CLOSING → CLOSED
//!
//! NOT_APPLICABLE: connectionless mode, pinned for the process lifetime
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// The transport client's self-reported connection state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    NotApplicable = 0,
    Connecting = 1,
    Active = 2,
    Paused = 3,
    Reconnecting = 4,
    Closing = 5,
    Closed = 6,
}

impl ConnectionState {
    /// States the connection is expected to recover from on its own.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting | ConnectionState::Paused
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::NotApplicable => "NOT_APPLICABLE",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Active => "ACTIVE",
            ConnectionState::Paused => "PAUSED",
            ConnectionState::Reconnecting => "RECONNECTING",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
        }
    }
}

impl From<u8> for ConnectionState {
    fn from(val: u8) -> Self {
        match val {
            0 => ConnectionState::NotApplicable,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Active,
            3 => ConnectionState::Paused,
            4 => ConnectionState::Reconnecting,
            5 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
