//! Unified error type for ledgerlink
//!
//! Request-scoped failures reach the caller through the future returned by
//! `send`; connection-scoped failures (malformed frames, orphan responses) are
//! published on the connection event channel. Both use the same enum so a
//! subscriber can match on either without conversion.

use serde_json::Value;

/// Which negative response the peer sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// `REQNACK`: the node refused the request before processing it.
    Nack,
    /// `REJECT`: the node processed the request and refused it.
    Reject,
}

impl std::fmt::Display for RejectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nack => f.write_str("REQNACK"),
            Self::Reject => f.write_str("REJECT"),
        }
    }
}

/// Unified error type for all ledgerlink operations
///
/// The type is `Clone` because a single connection attempt is shared between
/// every caller waiting on it, and each of them receives the same failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or unhandled inbound frame
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of what could not be parsed or handled
        message: String,
    },

    /// The peer answered with REQNACK or REJECT
    #[error("Remote {kind}: {reason}")]
    RemoteReject {
        /// Which negative response arrived
        kind: RejectKind,
        /// Reason string supplied by the peer
        reason: String,
        /// The full frame as received
        frame: Value,
    },

    /// No terminal response arrived before the deadline
    #[error("Timeout: request {request_id} got no reply within {timeout_ms}ms")]
    Timeout {
        /// Request that expired
        request_id: u64,
        /// Configured deadline, measured from send time
        timeout_ms: u64,
    },

    /// The connection was closed while the request was pending, or used after close
    #[error("Closed")]
    Closed,

    /// Key material or signing failure
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the cryptographic failure
        message: String,
    },

    /// A response referenced a request id that is not pending
    #[error("Orphan response: request id not found: {request_id:?}")]
    OrphanResponse {
        /// Recovered request id, if the frame carried one
        request_id: Option<u64>,
        /// The full frame as received
        frame: Value,
    },

    /// A request with the same id is still in flight
    #[error("Duplicate request id {request_id} is already pending")]
    DuplicateRequest {
        /// Conflicting request id
        request_id: u64,
    },

    /// Invalid payload or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the invalid input
        message: String,
    },

    /// The link could not be opened or was lost
    #[error("Network error: {message}")]
    Network {
        /// Description of the network failure
        message: String,
    },

    /// Encoding or decoding failed outside of inbound frame parsing
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
    },
}

impl LedgerError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a remote reject error from a peer frame
    pub fn remote_reject(kind: RejectKind, reason: impl Into<String>, frame: Value) -> Self {
        Self::RemoteReject {
            kind,
            reason: reason.into(),
            frame,
        }
    }

    /// Create a timeout error
    pub fn timeout(request_id: u64, timeout_ms: u64) -> Self {
        Self::Timeout {
            request_id,
            timeout_ms,
        }
    }

    /// Create a closed error
    pub fn closed() -> Self {
        Self::Closed
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create an orphan response error
    pub fn orphan(request_id: Option<u64>, frame: Value) -> Self {
        Self::OrphanResponse { request_id, frame }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Raw frame attached to peer-originated errors
    pub fn frame(&self) -> Option<&Value> {
        match self {
            Self::RemoteReject { frame, .. } | Self::OrphanResponse { frame, .. } => Some(frame),
            _ => None,
        }
    }

    /// Whether the error came from a response that has no waiting caller
    pub fn is_orphan(&self) -> bool {
        matches!(self, Self::OrphanResponse { .. })
    }
}

/// Standard Result type for ledgerlink operations
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid(format!("config: {err}"))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for LedgerError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        Self::crypto(err.to_string())
    }
}

impl From<bs58::decode::Error> for LedgerError {
    fn from(err: bs58::decode::Error) -> Self {
        Self::crypto(format!("base58: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_reject_carries_reason_and_frame() {
        let frame = json!({"op": "REJECT", "reqId": 7, "reason": "not enough signatures"});
        let err = LedgerError::remote_reject(RejectKind::Reject, "not enough signatures", frame.clone());

        assert_eq!(err.to_string(), "Remote REJECT: not enough signatures");
        assert_eq!(err.frame(), Some(&frame));
        assert!(!err.is_orphan());
    }

    #[test]
    fn orphan_is_flagged() {
        let err = LedgerError::orphan(Some(9), json!({"op": "REPLY"}));
        assert!(err.is_orphan());
        assert!(err.to_string().contains("Some(9)"));
    }
}
