//! ledgerlink transport: one multiplexed connection to a ledger node
//!
//! Many callers share a single link. Each request carries a client-assigned
//! `reqId`; replies are matched back to the caller that sent them.
//!
//! - **Transport**: opens the authenticated link ([`MemoryTransport`] in
//!   process, `CurveZmqTransport` with the `zmq` feature)
//! - **Frames**: classification of inbound traffic by `op`
//! - **Correlator**: the pending table and request id allocation
//! - **Dispatcher**: routes each frame to its caller or to a connection event
//! - **Connection**: the handle, its driver task and the timeout sweep
//!
//! ```rust,ignore
//! use ledgerlink_core::{LedgerConfig, OutgoingRequest, SigningOptions};
//! use ledgerlink_transport::{LedgerConnection, MemoryTransport};
//!
//! let (transport, mut node) = MemoryTransport::new();
//! let connection = LedgerConnection::connect(&LedgerConfig::for_testing(), transport)?;
//! let request = OutgoingRequest::new().with_field("operation", serde_json::json!({"type": "105"}));
//! let reply = connection.send(request, &SigningOptions::none()).await?;
//! ```

pub mod connection;
pub mod correlator;
#[cfg(feature = "zmq")]
pub mod curve;
pub mod dispatcher;
pub mod events;
pub mod frame;
pub mod memory;
pub mod transport;

pub use connection::LedgerConnection;
pub use correlator::{PendingTable, RequestIdAllocator};
pub use events::ConnectionEvent;
pub use frame::{InboundFrame, ReplyIdSource};
pub use memory::{MemoryPeer, MemoryTransport};
pub use transport::{Link, Transport};
#[cfg(feature = "zmq")]
pub use curve::CurveZmqTransport;
