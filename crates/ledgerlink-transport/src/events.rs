//! Connection-level notifications

use ledgerlink_core::LedgerError;

/// Something that happened on the connection rather than to one request
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Malformed frame, unhandled operation, orphan response or lost link
    Error(LedgerError),
    /// Heartbeat reply from the node
    Pong,
    /// The connection shut down; emitted once
    Closed,
}

impl ConnectionEvent {
    /// The error carried by an `Error` event
    pub fn as_error(&self) -> Option<&LedgerError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}
