//! Canonical rendering of request payloads for signing
//!
//! The ledger verifies signatures over a flat text rendering of the request:
//! object keys sorted and written as `key:value` joined by `|`, arrays joined
//! by `,`, scalars as plain text. Top-level `signature` and `signatures` are
//! never part of the rendering, so signatures can be added in any order and by
//! any number of signers without invalidating each other.
//!
//! Policy for empty values: a key present with `null`, `[]` or `{}` renders as
//! `key:` (kept, empty). An absent key renders nothing.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, Result};

/// Top-level fields that carry signatures and are excluded from signing input
pub const SIGNATURE_FIELDS: [&str; 2] = ["signature", "signatures"];

/// Operation type code for attribute writes
pub const ATTRIB_TYPE: &str = "100";

/// Operation type code for attribute reads
pub const GET_ATTR_TYPE: &str = "104";

/// Keys whose string values are hashed before rendering in attribute operations
const HASHED_ATTRIBUTE_KEYS: [&str; 3] = ["raw", "hash", "enc"];

/// Render `payload` into the exact bytes that get signed.
///
/// Fails with [`LedgerError::Invalid`] when the payload is not a JSON object.
pub fn serialize_for_signing(payload: &Value) -> Result<Vec<u8>> {
    let object = payload
        .as_object()
        .ok_or_else(|| LedgerError::invalid("request payload must be a JSON object"))?;
    Ok(render_request(object).into_bytes())
}

/// Render a request object, dropping the top-level signature fields.
pub fn render_request(object: &Map<String, Value>) -> String {
    let hash_attributes = is_attribute_operation(object);
    let mut out = String::new();
    render_object(object, true, hash_attributes, &mut out);
    out
}

fn is_attribute_operation(object: &Map<String, Value>) -> bool {
    let op_type = object
        .get("operation")
        .and_then(|operation| operation.get("type"))
        .map(scalar_text);
    matches!(op_type.as_deref(), Some(ATTRIB_TYPE) | Some(GET_ATTR_TYPE))
}

fn render_object(
    object: &Map<String, Value>,
    top_level: bool,
    hash_attributes: bool,
    out: &mut String,
) {
    // serde_json may preserve insertion order depending on features, so sort here
    let mut keys: Vec<&String> = object
        .keys()
        .filter(|key| !(top_level && SIGNATURE_FIELDS.contains(&key.as_str())))
        .collect();
    keys.sort();

    for (index, key) in keys.into_iter().enumerate() {
        if index > 0 {
            out.push('|');
        }
        out.push_str(key);
        out.push(':');

        let value = &object[key.as_str()];
        match value {
            Value::String(text)
                if hash_attributes && HASHED_ATTRIBUTE_KEYS.contains(&key.as_str()) =>
            {
                out.push_str(&hex::encode(Sha256::digest(text.as_bytes())));
            }
            _ => render_value(value, hash_attributes, out),
        }
    }
}

fn render_value(value: &Value, hash_attributes: bool, out: &mut String) {
    match value {
        Value::Object(object) => render_object(object, false, hash_attributes, out),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                render_value(item, hash_attributes, out);
            }
        }
        scalar => out.push_str(&scalar_text(scalar)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        // Containers are handled by render_value; only reached from is_attribute_operation
        other => other.to_string(),
    }
}
