//! Client configuration
//!
//! A connection is configured either from a genesis transaction or from an
//! explicit host, port and server key. Configuration can be built in code or
//! read from TOML; both routes go through [`LedgerConfig::resolve`], which
//! validates and derives the immutable [`ConnectionParams`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::bootstrap::{BootstrapDescriptor, ConnectionParams};
use crate::error::{LedgerError, Result};
use crate::signing::decode_base58;

/// Default per-request deadline, measured from send time
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default period of the timeout sweep
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Client-side behaviour that is not part of the node address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Deadline after which a pending request fails with a timeout
    pub timeout: Duration,
    /// How often pending requests are checked against the deadline
    pub sweep_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}

/// User-facing configuration for one ledger connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Sweep period in milliseconds
    pub sweep_interval_ms: u64,
    /// Genesis node transaction(s); one JSON object per line
    pub genesis_txn: Option<String>,
    /// Node alias to pick when `genesis_txn` lists several nodes
    pub node_alias: Option<String>,
    /// Explicit node host
    pub host: Option<String>,
    /// Explicit node port
    pub port: Option<u16>,
    /// Explicit Curve25519 server key, base58 or 64 hex characters
    pub server_key: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            genesis_txn: None,
            node_alias: None,
            host: None,
            port: None,
            server_key: None,
        }
    }
}

impl LedgerConfig {
    /// Configuration that derives the node from a genesis transaction
    pub fn from_genesis(genesis_txn: impl Into<String>) -> Self {
        Self {
            genesis_txn: Some(genesis_txn.into()),
            ..Default::default()
        }
    }

    /// Configuration with an explicit node address and raw server key
    pub fn explicit(host: impl Into<String>, port: u16, server_key: [u8; 32]) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            server_key: Some(hex::encode(server_key)),
            ..Default::default()
        }
    }

    /// Short deadlines for tests
    pub fn for_testing() -> Self {
        Self {
            timeout_ms: 100,
            sweep_interval_ms: 50,
            host: Some("127.0.0.1".to_string()),
            port: Some(9702),
            server_key: Some(hex::encode([9u8; 32])),
            ..Default::default()
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the sweep period
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Read configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(LedgerError::invalid("timeout_ms must be greater than 0"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(LedgerError::invalid("sweep_interval_ms must be greater than 0"));
        }

        let explicit = self.host.is_some() || self.port.is_some() || self.server_key.is_some();
        match (&self.genesis_txn, explicit) {
            (Some(_), true) => Err(LedgerError::invalid(
                "genesis_txn and host/port/server_key are mutually exclusive",
            )),
            (None, false) => Err(LedgerError::invalid(
                "either genesis_txn or host/port/server_key is required",
            )),
            (None, true) if self.host.is_none() || self.port.is_none() || self.server_key.is_none() => {
                Err(LedgerError::invalid(
                    "host, port and server_key must all be set together",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Client settings carried by this configuration
    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            timeout: Duration::from_millis(self.timeout_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }

    /// Validate and derive the immutable connection parameters
    pub fn resolve(&self) -> Result<(ConnectionParams, ClientSettings)> {
        self.validate()?;

        let params = match (&self.genesis_txn, &self.host, self.port, &self.server_key) {
            (Some(genesis), ..) => {
                BootstrapDescriptor::select(genesis, self.node_alias.as_deref())?.connection_params()?
            }
            (None, Some(host), Some(port), Some(server_key)) => ConnectionParams {
                host: host.clone(),
                port,
                server_auth_key: decode_server_key(server_key)?,
            },
            _ => return Err(LedgerError::invalid("incomplete connection configuration")),
        };

        Ok((params, self.settings()))
    }
}

/// Decode a 32-byte server key given as 64 hex characters or base58
pub fn decode_server_key(text: &str) -> Result<[u8; 32]> {
    let bytes = if text.len() == 64 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        hex::decode(text).map_err(|e| LedgerError::invalid(format!("server_key: {e}")))?
    } else {
        decode_base58(text)?
    };
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| LedgerError::invalid(format!("server_key must be 32 bytes, got {}", bytes.len())))
}
