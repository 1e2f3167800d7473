//! In-memory transport
//!
//! Connects a client to a [`MemoryPeer`] held by the caller, which plays the
//! node: it reads the frames the client writes and injects replies.

use async_trait::async_trait;
use ledgerlink_core::{ClientKeyPair, ConnectionParams, LedgerError, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::transport::{Link, Transport};

/// In-memory transport for testing and local communication
#[derive(Clone)]
pub struct MemoryTransport {
    link: Arc<Mutex<Option<Link>>>,
    opens: Arc<AtomicUsize>,
    open_delay: Duration,
    server_key: Arc<Mutex<Option<[u8; 32]>>>,
}

/// Node side of a [`MemoryTransport`]
#[derive(Debug)]
pub struct MemoryPeer {
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    to_client: mpsc::UnboundedSender<Vec<u8>>,
}

impl MemoryTransport {
    /// Create a transport and the peer it will connect to
    pub fn new() -> (Self, MemoryPeer) {
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let transport = Self {
            link: Arc::new(Mutex::new(Some(Link {
                outbound: client_tx,
                inbound: client_rx,
            }))),
            opens: Arc::new(AtomicUsize::new(0)),
            open_delay: Duration::ZERO,
            server_key: Arc::new(Mutex::new(None)),
        };
        (
            transport,
            MemoryPeer {
                from_client,
                to_client,
            },
        )
    }

    /// A transport whose node can never be reached
    pub fn unreachable() -> Self {
        Self {
            link: Arc::new(Mutex::new(None)),
            opens: Arc::new(AtomicUsize::new(0)),
            open_delay: Duration::ZERO,
            server_key: Arc::new(Mutex::new(None)),
        }
    }

    /// Delay link establishment, to observe callers queueing behind it
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// How many times `open` has been called
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Server key presented by the last `open`
    pub fn last_server_key(&self) -> Option<[u8; 32]> {
        *self.server_key.lock()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, params: &ConnectionParams, _keys: &ClientKeyPair) -> Result<Link> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.server_key.lock() = Some(params.server_auth_key);

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        self.link.lock().take().ok_or_else(|| {
            LedgerError::network(format!("memory peer at {} is not reachable", params.endpoint()))
        })
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}

impl MemoryPeer {
    /// Next raw frame written by the client, or `None` once the client hung up
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_client.recv().await
    }

    /// Next frame written by the client, decoded as JSON
    pub async fn recv_json(&mut self) -> Result<Value> {
        let bytes = self.recv().await.ok_or_else(LedgerError::closed)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Inject a raw frame towards the client
    pub fn send_raw(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.to_client
            .send(bytes.into())
            .map_err(|_| LedgerError::closed())
    }

    /// Inject a JSON frame towards the client
    pub fn send_json(&self, value: &Value) -> Result<()> {
        self.send_raw(serde_json::to_vec(value)?)
    }

    /// Hang up, as a node dropping the connection would
    pub fn disconnect(self) {
        drop(self);
    }
}
