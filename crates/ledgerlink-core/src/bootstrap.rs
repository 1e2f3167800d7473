//! Bootstrap descriptors (genesis node transactions)
//!
//! A genesis file lists one node transaction per line. Each names the node's
//! client-facing address and its Ed25519 ledger identity key (`txn.data.dest`).
//! The node's CURVE transport key is that identity key mapped onto
//! Curve25519, so a client can authenticate the node before any request.

use curve25519_dalek::edwards::CompressedEdwardsY;
use serde_json::Value;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::signing::decode_base58;

/// Connection endpoint and server key for one ledger node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Client-facing host of the node
    pub host: String,
    /// Client-facing port of the node
    pub port: u16,
    /// Curve25519 key the node authenticates its transport with
    pub server_auth_key: [u8; 32],
}

impl ConnectionParams {
    /// ZeroMQ-style TCP endpoint string
    pub fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    /// Hex form of the server key, for logs
    pub fn server_key_hex(&self) -> String {
        hex::encode(self.server_auth_key)
    }
}

/// A parsed node transaction from a genesis file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapDescriptor {
    /// Node alias, when present
    pub alias: Option<String>,
    /// Base58 Ed25519 identity key of the node
    pub dest: String,
    /// Client-facing IP or host name
    pub client_ip: String,
    /// Client-facing port
    pub client_port: u16,
}

impl BootstrapDescriptor {
    /// Parse a single genesis transaction from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| LedgerError::invalid(format!("genesis transaction is not JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Parse a single genesis transaction
    pub fn from_value(value: &Value) -> Result<Self> {
        let data = value
            .pointer("/txn/data")
            .ok_or_else(|| LedgerError::invalid("genesis transaction has no txn.data"))?;

        let dest = data
            .get("dest")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::invalid("genesis transaction has no txn.data.dest"))?
            .to_string();

        let node = data
            .get("data")
            .ok_or_else(|| LedgerError::invalid("genesis transaction has no txn.data.data"))?;

        let client_ip = node
            .get("client_ip")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::invalid("genesis transaction has no client_ip"))?
            .to_string();

        let client_port = node
            .get("client_port")
            .and_then(parse_port)
            .ok_or_else(|| LedgerError::invalid("genesis transaction has no valid client_port"))?;

        let alias = node.get("alias").and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            alias,
            dest,
            client_ip,
            client_port,
        })
    }

    /// Parse every node transaction of a genesis file (one JSON object per line)
    pub fn parse_genesis(contents: &str) -> Result<Vec<Self>> {
        let nodes = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::from_json)
            .collect::<Result<Vec<_>>>()?;
        if nodes.is_empty() {
            return Err(LedgerError::invalid("genesis file has no node transactions"));
        }
        Ok(nodes)
    }

    /// Pick a node from a genesis file by alias, or the first one when `alias` is `None`
    pub fn select(contents: &str, alias: Option<&str>) -> Result<Self> {
        let mut nodes = Self::parse_genesis(contents)?;
        match alias {
            None => Ok(nodes.swap_remove(0)),
            Some(wanted) => nodes
                .into_iter()
                .find(|node| node.alias.as_deref() == Some(wanted))
                .ok_or_else(|| LedgerError::invalid(format!("no genesis node with alias {wanted}"))),
        }
    }

    /// Derive connection parameters for this node
    pub fn connection_params(&self) -> Result<ConnectionParams> {
        let identity_key = decode_base58(&self.dest)?;
        let server_auth_key = ed25519_to_curve25519(&identity_key)?;
        debug!(
            alias = self.alias.as_deref().unwrap_or("-"),
            host = %self.client_ip,
            port = self.client_port,
            "derived connection parameters from bootstrap descriptor"
        );
        Ok(ConnectionParams {
            host: self.client_ip.clone(),
            port: self.client_port,
            server_auth_key,
        })
    }
}

/// Map an Ed25519 public key onto its Curve25519 (Montgomery) form
pub fn ed25519_to_curve25519(public_key: &[u8]) -> Result<[u8; 32]> {
    let bytes: [u8; 32] = public_key.try_into().map_err(|_| {
        LedgerError::crypto(format!(
            "ed25519 public key must be 32 bytes, got {}",
            public_key.len()
        ))
    })?;
    let point = CompressedEdwardsY(bytes)
        .decompress()
        .ok_or_else(|| LedgerError::crypto("ed25519 public key is not a valid curve point"))?;
    Ok(point.to_montgomery().to_bytes())
}

fn parse_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|port| u16::try_from(port).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE1: &str = r#"{"reqSignature":{},"txn":{"data":{"data":{"alias":"Node1","client_ip":"127.0.0.1","client_port":9702,"node_ip":"127.0.0.1","node_port":9701,"services":["VALIDATOR"]},"dest":"Gw6pDLhcBcoQesN72qfotTgFa7cbuqZpkX3Xo6pLhPhv"},"metadata":{"from":"Th7MpTaRZVRYnPiabds81Y"},"type":"0"},"txnMetadata":{"seqNo":1,"txnId":"fea82e10e894419fe2bea7d96296a6d46f50f93f9eeda954ec461b2ed2950b62"},"ver":"1"}"#;
    const NODE2: &str = r#"{"txn":{"data":{"data":{"alias":"Node2","client_ip":"10.0.0.2","client_port":"9704"},"dest":"8ECVSk179mjsjKRLWiQtssMLgp6EPhWXtaYyStWPSGAb"},"type":"0"}}"#;

    #[test]
    fn derives_params_from_descriptor() {
        let params = BootstrapDescriptor::from_json(NODE1)
            .unwrap()
            .connection_params()
            .unwrap();

        assert_eq!(params.host, "127.0.0.1");
        assert_eq!(params.port, 9702);
        assert_eq!(params.endpoint(), "tcp://127.0.0.1:9702");
        assert_eq!(
            params.server_key_hex(),
            "f5a2927d4eb8e23cdd0167c2e786613993590dab50e6d68bc3821df3b8c34f1f"
        );
    }

    #[test]
    fn genesis_file_selects_by_alias() {
        let genesis = format!("{NODE1}\n\n{NODE2}\n");

        let nodes = BootstrapDescriptor::parse_genesis(&genesis).unwrap();
        assert_eq!(nodes.len(), 2);

        let node2 = BootstrapDescriptor::select(&genesis, Some("Node2")).unwrap();
        assert_eq!(node2.client_port, 9704);
        assert_eq!(node2.client_ip, "10.0.0.2");

        let first = BootstrapDescriptor::select(&genesis, None).unwrap();
        assert_eq!(first.alias.as_deref(), Some("Node1"));

        assert!(BootstrapDescriptor::select(&genesis, Some("Node9")).is_err());
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = BootstrapDescriptor::from_json(r#"{"txn":{"data":{"dest":"abc"}}}"#).unwrap_err();
        assert!(matches!(err, LedgerError::Invalid { .. }));
        assert!(BootstrapDescriptor::parse_genesis("\n  \n").is_err());
    }

    #[test]
    fn short_identity_keys_are_rejected() {
        assert!(matches!(
            ed25519_to_curve25519(&[1u8; 16]),
            Err(LedgerError::Crypto { .. })
        ));
    }
}
