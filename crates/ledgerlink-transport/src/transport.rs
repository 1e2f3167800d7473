//! Core transport trait definitions

use async_trait::async_trait;
use ledgerlink_core::{ClientKeyPair, ConnectionParams, Result};
use tokio::sync::mpsc;

/// An open duplex link to one node, carrying whole frames.
///
/// Dropping `outbound` tells the transport to shut the link down. The
/// transport drops its side of `inbound` when the peer goes away.
#[derive(Debug)]
pub struct Link {
    /// Frames to write to the node
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
    /// Frames read from the node
    pub inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Opens authenticated, encrypted links to a ledger node
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a link to the node described by `params`, presenting `keys`
    async fn open(&self, params: &ConnectionParams, keys: &ClientKeyPair) -> Result<Link>;

    /// Get transport type identifier
    fn transport_type(&self) -> &'static str;
}
