//! Inbound frame dispatch
//!
//! Routes each frame to the pending table or, when no caller is waiting for
//! it, turns it into a connection-level event. A late or unsolicited response
//! never fails the link; it degrades to a diagnostic.

use ledgerlink_core::LedgerError;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::correlator::PendingTable;
use crate::events::ConnectionEvent;
use crate::frame::InboundFrame;

/// Handle one raw inbound frame.
///
/// Returns the connection-level event to publish, if any.
pub fn dispatch(table: &mut PendingTable, bytes: &[u8], now: Instant) -> Option<ConnectionEvent> {
    let frame = match InboundFrame::parse(bytes) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(error = %err, len = bytes.len(), "dropping malformed frame");
            return Some(ConnectionEvent::Error(err));
        }
    };

    match frame {
        InboundFrame::Heartbeat => Some(ConnectionEvent::Pong),

        InboundFrame::Acknowledge { request_id } => {
            // Acks are best effort; unknown ids are not worth a notification
            if let Some(request_id) = request_id {
                let known = table.acknowledge(request_id, now);
                debug!(request_id, known, "request acknowledged");
            }
            None
        }

        InboundFrame::Negative {
            kind,
            request_id,
            reason,
            raw,
        } => {
            let err = LedgerError::remote_reject(kind, reason, raw.clone());
            let outcome = match request_id {
                Some(request_id) => table.reject(request_id, err),
                None => Err(err),
            };
            match outcome {
                Ok(()) => {
                    debug!(request_id, %kind, "request rejected by node");
                    None
                }
                Err(err) => {
                    warn!(request_id, %kind, error = %err, "negative response for unknown request");
                    Some(ConnectionEvent::Error(LedgerError::orphan(request_id, raw)))
                }
            }
        }

        InboundFrame::Reply { request_id, raw } => match request_id {
            Some((request_id, source)) => {
                if table.resolve(request_id, raw.clone()) {
                    debug!(request_id, ?source, "request resolved");
                    None
                } else {
                    warn!(request_id, ?source, "reply for unknown request");
                    Some(ConnectionEvent::Error(LedgerError::orphan(Some(request_id), raw)))
                }
            }
            None => {
                warn!("reply without a request id");
                Some(ConnectionEvent::Error(LedgerError::orphan(None, raw)))
            }
        },

        InboundFrame::Unrecognized { op, .. } => {
            let op = op.unwrap_or_else(|| "<missing>".to_string());
            warn!(%op, "operation not handled");
            Some(ConnectionEvent::Error(LedgerError::protocol(format!(
                "operation not handled: {op}"
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlink_core::{RejectKind, Result};
    use serde_json::{json, Value};
    use tokio::sync::oneshot;

    fn frame(value: Value) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    fn register(table: &mut PendingTable, id: u64) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        table.register(id, tx, Instant::now());
        rx
    }

    #[tokio::test]
    async fn reply_resolves_then_duplicate_is_orphaned() {
        let mut table = PendingTable::new();
        let rx = register(&mut table, 7);
        let reply = json!({"op": "REPLY", "result": {"reqId": 7, "value": 42}});

        assert!(dispatch(&mut table, &frame(reply.clone()), Instant::now()).is_none());
        assert_eq!(rx.await.unwrap().unwrap(), reply);

        let event = dispatch(&mut table, &frame(reply), Instant::now()).unwrap();
        assert!(matches!(
            event.as_error(),
            Some(LedgerError::OrphanResponse { request_id: Some(7), .. })
        ));
    }

    #[tokio::test]
    async fn reject_carries_reason_to_the_caller() {
        let mut table = PendingTable::new();
        let rx = register(&mut table, 7);
        let reject = json!({"op": "REJECT", "reqId": 7, "reason": "not enough signatures"});

        assert!(dispatch(&mut table, &frame(reject), Instant::now()).is_none());
        match rx.await.unwrap() {
            Err(LedgerError::RemoteReject { kind, reason, .. }) => {
                assert_eq!(kind, RejectKind::Reject);
                assert_eq!(reason, "not enough signatures");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn nack_for_unknown_request_is_a_connection_error() {
        let mut table = PendingTable::new();
        let nack = json!({"op": "REQNACK", "reqId": 5, "reason": "late"});

        let event = dispatch(&mut table, &frame(nack), Instant::now()).unwrap();
        assert!(event.as_error().is_some_and(LedgerError::is_orphan));
    }

    #[test]
    fn ack_updates_entry_and_unknown_ack_is_silent() {
        let mut table = PendingTable::new();
        let _rx = register(&mut table, 1);

        assert!(dispatch(&mut table, &frame(json!({"op": "REQACK", "reqId": 1})), Instant::now()).is_none());
        assert!(table.get(1).unwrap().ack_at.is_some());

        assert!(dispatch(&mut table, &frame(json!({"op": "REQACK", "reqId": 99})), Instant::now()).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn pong_malformed_and_unknown_ops_become_events() {
        let mut table = PendingTable::new();
        let _rx = register(&mut table, 1);

        assert!(matches!(
            dispatch(&mut table, b"po", Instant::now()),
            Some(ConnectionEvent::Pong)
        ));
        assert!(matches!(
            dispatch(&mut table, b"{broken", Instant::now()).as_ref().and_then(ConnectionEvent::as_error),
            Some(LedgerError::Protocol { .. })
        ));
        let unhandled = dispatch(&mut table, &frame(json!({"op": "BATCH"})), Instant::now()).unwrap();
        assert!(unhandled.as_error().unwrap().to_string().contains("operation not handled: BATCH"));

        assert_eq!(table.len(), 1);
    }
}
