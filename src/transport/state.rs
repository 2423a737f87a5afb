//! Connection lifecycle state.
//!
//! ```text
//! Connecting ─► Connected ◄─► Idle (heartbeat sent)
//!      │            │            │
//!      └────────────┴────────────┴──► Closed (terminal)
//! ```
//!
//! A connection that is absent from the registry is "disconnected"; that
//! state has no handle and so no representation here.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Stream is being established.
    Connecting = 0,
    /// Stream is up and has seen recent outbound traffic.
    Connected = 1,
    /// Write-idle window elapsed and a heartbeat was sent.
    Idle = 2,
    /// Terminal. The handle must not be reused.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Idle,
            _ => ConnectionState::Closed,
        }
    }

    /// Whether requests may be written in this state.
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Idle)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Idle => "idle",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lock-free holder of a [`ConnectionState`] where `Closed` is absorbing.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// Create a cell in the given state.
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state.
    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` unless the cell is already closed.
    ///
    /// Returns `false` if the cell was closed and nothing changed.
    pub fn set(&self, next: ConnectionState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ConnectionState::Closed as u8).then_some(next as u8)
            })
            .is_ok()
    }

    /// Close the cell. Returns `true` only for the caller that closed it.
    pub fn close(&self) -> bool {
        self.0.swap(ConnectionState::Closed as u8, Ordering::AcqRel)
            != ConnectionState::Closed as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let cell = StateCell::new(ConnectionState::Connecting);
        assert!(!cell.get().is_active());

        assert!(cell.set(ConnectionState::Connected));
        assert!(cell.get().is_active());

        assert!(cell.set(ConnectionState::Idle));
        assert_eq!(cell.get(), ConnectionState::Idle);
        assert!(cell.get().is_active());

        assert!(cell.set(ConnectionState::Connected));
        assert_eq!(cell.get(), ConnectionState::Connected);
    }

    #[test]
    fn test_closed_is_terminal() {
        let cell = StateCell::new(ConnectionState::Connected);
        assert!(cell.close());
        assert!(!cell.close());

        assert!(!cell.set(ConnectionState::Connected));
        assert_eq!(cell.get(), ConnectionState::Closed);
        assert!(!cell.get().is_active());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Idle.to_string(), "idle");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
