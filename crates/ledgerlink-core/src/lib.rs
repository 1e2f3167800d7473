//! ledgerlink core: signing and connection parameters for ledger clients
//!
//! This crate holds everything a ledger client needs before it touches the
//! network:
//!
//! - **Canonical serialization**: the deterministic text form requests are signed over
//! - **Signing**: Ed25519 detached signatures, single or accumulated per identity
//! - **Bootstrap**: genesis node transactions and the Ed25519 → Curve25519 key transform
//! - **Configuration**: timeouts, sweep period and node selection
//!
//! The transport, correlation and dispatch layers live in `ledgerlink-transport`.

pub mod bootstrap;
pub mod canonical;
pub mod config;
pub mod error;
pub mod keys;
pub mod request;
pub mod signing;

pub use bootstrap::{ed25519_to_curve25519, BootstrapDescriptor, ConnectionParams};
pub use canonical::serialize_for_signing;
pub use config::{ClientSettings, LedgerConfig};
pub use error::{LedgerError, RejectKind, Result};
pub use keys::ClientKeyPair;
pub use request::OutgoingRequest;
pub use signing::{
    attach_signature, attach_single_signature, verify, verify_signatures, DetachedSignature,
    LedgerSigner, SigningOptions,
};
