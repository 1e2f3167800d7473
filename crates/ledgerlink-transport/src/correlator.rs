//! Request correlation
//!
//! The pending table maps request ids to the continuation of the caller that
//! sent them. It is owned by the connection driver task and mutated only
//! there, so it needs no locking. Every entry leaves the table exactly once:
//! through a reply, a negative response, the timeout sweep, or connection
//! close. Whichever comes first wins; later events find no entry.

use ledgerlink_core::{LedgerError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Continuation that settles one request
pub type ReplySender = oneshot::Sender<Result<Value>>;

/// Hands out request ids for one connection: 1, 2, 3, ... never reused
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU64,
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdAllocator {
    /// Start a fresh sequence at 1
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Next id in the sequence
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// One in-flight request
#[derive(Debug)]
pub struct PendingRequest {
    /// Correlation id
    pub request_id: u64,
    /// When the frame was handed to the link; the deadline counts from here
    pub sent_at: Instant,
    /// When the node acknowledged the request, if it has
    pub ack_at: Option<Instant>,
    reply: ReplySender,
}

impl PendingRequest {
    fn settle(self, outcome: Result<Value>) {
        if self.reply.send(outcome).is_err() {
            debug!(request_id = self.request_id, "caller dropped before settlement");
        }
    }
}

/// In-flight requests keyed by request id
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<u64, PendingRequest>,
}

impl PendingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sent request.
    ///
    /// If `request_id` is already pending the new caller is failed with
    /// [`LedgerError::DuplicateRequest`] and the existing entry is kept.
    /// Returns whether the entry was registered.
    pub fn register(&mut self, request_id: u64, reply: ReplySender, now: Instant) -> bool {
        if self.entries.contains_key(&request_id) {
            let _ = reply.send(Err(LedgerError::DuplicateRequest { request_id }));
            return false;
        }
        self.entries.insert(
            request_id,
            PendingRequest {
                request_id,
                sent_at: now,
                ack_at: None,
                reply,
            },
        );
        true
    }

    /// Record an acknowledgement. Does not move the deadline.
    pub fn acknowledge(&mut self, request_id: u64, now: Instant) -> bool {
        match self.entries.get_mut(&request_id) {
            Some(entry) => {
                entry.ack_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Resolve and remove a request with its reply frame
    pub fn resolve(&mut self, request_id: u64, reply: Value) -> bool {
        match self.entries.remove(&request_id) {
            Some(entry) => {
                entry.settle(Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Reject and remove a request.
    ///
    /// When the id is unknown the error is handed back so it can be reported
    /// at connection level.
    pub fn reject(&mut self, request_id: u64, error: LedgerError) -> std::result::Result<(), LedgerError> {
        match self.entries.remove(&request_id) {
            Some(entry) => {
                entry.settle(Err(error));
                Ok(())
            }
            None => Err(error),
        }
    }

    /// Fail every request older than `timeout`, acknowledged or not.
    /// Returns the expired ids in ascending order.
    pub fn evict_expired(&mut self, now: Instant, timeout: Duration) -> Vec<u64> {
        let mut expired: Vec<u64> = self
            .entries
            .values()
            .filter(|entry| now.saturating_duration_since(entry.sent_at) > timeout)
            .map(|entry| entry.request_id)
            .collect();
        expired.sort_unstable();

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        for request_id in &expired {
            if let Some(entry) = self.entries.remove(request_id) {
                entry.settle(Err(LedgerError::timeout(*request_id, timeout_ms)));
            }
        }
        expired
    }

    /// Fail every pending request with `Closed` and empty the table
    pub fn close_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.settle(Err(LedgerError::closed()));
        }
        count
    }

    /// Look up a pending request
    pub fn get(&self, request_id: u64) -> Option<&PendingRequest> {
        self.entries.get(&request_id)
    }

    /// Whether `request_id` is pending
    pub fn contains(&self, request_id: u64) -> bool {
        self.entries.contains_key(&request_id)
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
