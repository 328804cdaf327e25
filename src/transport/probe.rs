//! Tri-state reads of transport-owned connection fields.
//!
//! The transport client owns its connection object and may tear parts of it
//! down at any time (reconnects, socket teardown). Every field the engine reads
//! therefore comes back as a [`Probe`]: the value, an explicit absence, or a
//! failure to read it at all.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// Result of reading a single field from a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The field exists and was read.
    Present(T),
    /// The field does not exist on this connection (or is not populated yet).
    Absent,
    /// The field exists but reading it failed.
    Unreadable(ProbeError),
}

impl<T> Probe<T> {
    /// Create an unreadable probe for `field`.
    pub fn unreadable(field: &'static str, reason: impl Into<String>) -> Self {
        Probe::Unreadable(ProbeError::new(field, reason))
    }

    /// Returns the value if present.
    pub fn present(self) -> Option<T> {
        match self {
            Probe::Present(value) => Some(value),
            Probe::Absent | Probe::Unreadable(_) => None,
        }
    }

    /// Treat unreadable as an error, keeping absence as `None`.
    pub fn into_result(self) -> Result<Option<T>, ProbeError> {
        match self {
            Probe::Present(value) => Ok(Some(value)),
            Probe::Absent => Ok(None),
            Probe::Unreadable(err) => Err(err),
        }
    }

    /// Run a read that may panic inside third-party code, turning a panic
    /// into an unreadable probe for `field`.
    pub fn guarded(field: &'static str, read: impl FnOnce() -> Probe<T>) -> Self {
        panic::catch_unwind(AssertUnwindSafe(read))
            .unwrap_or_else(|payload| Probe::unreadable(field, panic_reason(payload.as_ref())))
    }
}

impl<T> From<Option<T>> for Probe<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Probe::Present(value),
            None => Probe::Absent,
        }
    }
}

/// Failure to read a connection field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot read `{field}`: {reason}")]
pub struct ProbeError {
    /// Field that failed to read.
    pub field: &'static str,
    /// Transport-provided description.
    pub reason: String,
}

impl ProbeError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Message carried by a panic payload.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "connection accessor panicked".to_string()
    }
}

/// Low-level socket state, using the WebSocket `readyState` numbering.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl TransportReadyState {
    /// Decode a raw ready-state value. Unknown values yield `None`.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Connecting),
            1 => Some(Self::Open),
            2 => Some(Self::Closing),
            3 => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for TransportReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_decodes_known_values() {
        assert_eq!(TransportReadyState::from_raw(1), Some(TransportReadyState::Open));
        assert_eq!(TransportReadyState::from_raw(3).map(|s| s.name()), Some("CLOSED"));
        assert_eq!(TransportReadyState::from_raw(9), None);
    }

    #[test]
    fn unreadable_probe_surfaces_as_error() {
        let probe: Probe<u8> = Probe::unreadable("ready_state", "socket dropped");
        let err = probe.into_result().unwrap_err();
        assert_eq!(err.field, "ready_state");
        assert!(err.to_string().contains("socket dropped"));

        let absent: Probe<u8> = None.into();
        assert_eq!(absent.into_result(), Ok(None));
    }

    #[test]
    fn guarded_read_turns_panic_into_unreadable() {
        let probe: Probe<u8> = Probe::guarded("state", || panic!("accessor gone"));
        let err = probe.into_result().unwrap_err();
        assert_eq!(err.field, "state");
        assert!(err.reason.contains("accessor gone"));

        assert_eq!(Probe::guarded("state", || Probe::Present(1u8)), Probe::Present(1));
    }
}
