//! Wire frames exchanged with a ledger node
//!
//! Inbound traffic is either the two-byte heartbeat reply or a JSON object
//! tagged by `op`. Parsing never touches the pending table; it only classifies.

use ledgerlink_core::request::parse_request_id;
use ledgerlink_core::{LedgerError, RejectKind, Result};
use serde_json::Value;

/// Heartbeat request written by the client
pub const PING: &[u8] = b"pi";

/// Heartbeat reply written by the node
pub const PONG: &[u8] = b"po";

/// Where a reply's request id was found.
///
/// Write replies carry a transaction-shaped result whose metadata holds the
/// id; read replies put it directly on the result. Older peers put it on the
/// frame itself. The paths are tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyIdSource {
    /// `result.txn.metadata.reqId`
    TxnMetadata,
    /// `result.reqId`
    Result,
    /// top-level `reqId`
    TopLevel,
}

impl ReplyIdSource {
    const ORDER: [Self; 3] = [Self::TxnMetadata, Self::Result, Self::TopLevel];

    fn pointer(self) -> &'static str {
        match self {
            Self::TxnMetadata => "/result/txn/metadata/reqId",
            Self::Result => "/result/reqId",
            Self::TopLevel => "/reqId",
        }
    }

    /// Recover the request id from a REPLY frame
    pub fn recover(frame: &Value) -> Option<(u64, Self)> {
        Self::ORDER.into_iter().find_map(|source| {
            frame
                .pointer(source.pointer())
                .and_then(parse_request_id)
                .map(|id| (id, source))
        })
    }
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `po`
    Heartbeat,
    /// `REQACK`: the node queued the request
    Acknowledge {
        /// Acknowledged request, if the frame named one
        request_id: Option<u64>,
    },
    /// `REQNACK` or `REJECT`
    Negative {
        /// Which negative response
        kind: RejectKind,
        /// Rejected request, if the frame named one
        request_id: Option<u64>,
        /// Reason supplied by the node
        reason: String,
        /// The frame as received
        raw: Value,
    },
    /// `REPLY`: terminal answer to a request
    Reply {
        /// Recovered request id and the path it came from
        request_id: Option<(u64, ReplyIdSource)>,
        /// The frame as received
        raw: Value,
    },
    /// Any other `op`
    Unrecognized {
        /// The `op` value, if it was a string
        op: Option<String>,
        /// The frame as received
        raw: Value,
    },
}

impl InboundFrame {
    /// Classify raw bytes from the link.
    ///
    /// Fails with [`LedgerError::Protocol`] for anything that is neither the
    /// heartbeat token nor a UTF-8 JSON object.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes == PONG {
            return Ok(Self::Heartbeat);
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| LedgerError::protocol(format!("frame is not UTF-8: {e}")))?;
        let raw: Value = serde_json::from_str(text)
            .map_err(|e| LedgerError::protocol(format!("frame is not JSON: {e}")))?;
        if !raw.is_object() {
            return Err(LedgerError::protocol("frame is not a JSON object"));
        }

        let op = raw.get("op").and_then(Value::as_str).map(str::to_string);
        let top_level_id = raw.get("reqId").and_then(parse_request_id);

        let frame = match op.as_deref() {
            Some("REQACK") => Self::Acknowledge {
                request_id: top_level_id,
            },
            Some("REQNACK") => Self::negative(RejectKind::Nack, top_level_id, raw),
            Some("REJECT") => Self::negative(RejectKind::Reject, top_level_id, raw),
            Some("REPLY") => Self::Reply {
                request_id: ReplyIdSource::recover(&raw),
                raw,
            },
            _ => Self::Unrecognized { op, raw },
        };
        Ok(frame)
    }

    fn negative(kind: RejectKind, request_id: Option<u64>, raw: Value) -> Self {
        let reason = match raw.get("reason") {
            Some(Value::String(reason)) => reason.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self::Negative {
            kind,
            request_id,
            reason,
            raw,
        }
    }
}
