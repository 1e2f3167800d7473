//! Outgoing request payloads
//!
//! A request is an arbitrary JSON object with a reserved `reqId` field and
//! optional signature fields. Every builder method consumes or borrows the
//! request and returns a new value, so a payload held by one caller is never
//! changed behind its back by signing or id assignment elsewhere.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical;
use crate::error::{LedgerError, Result};

/// Wire field carrying the request id
pub const REQUEST_ID_FIELD: &str = "reqId";

/// Wire field carrying a single signature
pub const SIGNATURE_FIELD: &str = "signature";

/// Wire field carrying the identity → signature map
pub const SIGNATURES_FIELD: &str = "signatures";

/// A request payload ready to be signed and framed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutgoingRequest(Map<String, Value>);

impl OutgoingRequest {
    /// Create an empty request
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(LedgerError::invalid(format!(
                "request payload must be a JSON object, got {other}"
            ))),
        }
    }

    /// Parse a request from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Return a copy with `key` set to `value`
    pub fn with_field(&self, key: impl Into<String>, value: Value) -> Self {
        let mut fields = self.0.clone();
        fields.insert(key.into(), value);
        Self(fields)
    }

    /// Read a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The caller-visible request id.
    ///
    /// Missing, `null` and `0` all mean "not assigned yet". Anything else must
    /// be a positive integer or a string holding one.
    pub fn request_id(&self) -> Result<Option<u64>> {
        match self.0.get(REQUEST_ID_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match parse_request_id(value) {
                Some(0) => Ok(None),
                Some(id) => Ok(Some(id)),
                None => Err(LedgerError::invalid(format!(
                    "{REQUEST_ID_FIELD} must be a positive integer, got {value}"
                ))),
            },
        }
    }

    /// Return a copy carrying `id` as its request id
    pub fn with_request_id(&self, id: u64) -> Self {
        self.with_field(REQUEST_ID_FIELD, Value::from(id))
    }

    /// Return a copy with the single `signature` field set
    pub fn with_signature(&self, encoded: impl Into<String>) -> Self {
        self.with_field(SIGNATURE_FIELD, Value::String(encoded.into()))
    }

    /// Return a copy with `signatures[identity]` set, keeping other entries
    pub fn with_signatures_entry(&self, identity: impl Into<String>, encoded: impl Into<String>) -> Self {
        let mut signatures = match self.0.get(SIGNATURES_FIELD) {
            Some(Value::Object(existing)) => existing.clone(),
            _ => Map::new(),
        };
        signatures.insert(identity.into(), Value::String(encoded.into()));
        self.with_field(SIGNATURES_FIELD, Value::Object(signatures))
    }

    /// Single signature, if present
    pub fn signature(&self) -> Option<&str> {
        self.0.get(SIGNATURE_FIELD).and_then(Value::as_str)
    }

    /// Signature recorded for `identity`, if present
    pub fn signature_for(&self, identity: &str) -> Option<&str> {
        self.0
            .get(SIGNATURES_FIELD)
            .and_then(|signatures| signatures.get(identity))
            .and_then(Value::as_str)
    }

    /// Identities that have signed into the `signatures` map
    pub fn signers(&self) -> Vec<&str> {
        match self.0.get(SIGNATURES_FIELD) {
            Some(Value::Object(signatures)) => signatures.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Bytes that signatures over this request cover
    pub fn signing_input(&self) -> Vec<u8> {
        canonical::render_request(&self.0).into_bytes()
    }

    /// Encode as a JSON frame
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// Borrow the underlying object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a plain JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for OutgoingRequest {
    type Error = LedgerError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<OutgoingRequest> for Value {
    fn from(request: OutgoingRequest) -> Self {
        request.into_value()
    }
}

/// Read a request id from a JSON number or numeric string
pub fn parse_request_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
