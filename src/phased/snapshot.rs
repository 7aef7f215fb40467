//! Context snapshots: the variables a deferred fragment carries to its second pass.

use tracing::warn;

use super::codec::{SnapshotFormat, decode_payload, encode_payload};
use super::error::SerializationError;
use crate::template::{Context, Layer, Map, Value};

/// Snapshot key holding the CSRF token captured on the first pass.
pub const CSRF_KEY: &str = "csrf_token";

/// Stored for [`CSRF_KEY`] when the first pass had no token.
pub const NOT_PROVIDED: &str = crate::template::builtins::CSRF_NOT_PROVIDED;

/// Flattens `context` innermost-first, keeping only portable values.
pub fn flatten(context: &Context) -> Map {
    context.flatten(true)
}

/// Encodes a layered context as a snapshot comment in `format`.
///
/// Runtime-only values are left out. A bare mapping is refused with
/// [`SerializationError::NotAContext`].
pub fn encode(layer: &Layer, format: &SnapshotFormat) -> Result<String, SerializationError> {
    match layer {
        Layer::Layered(context) => encode_map(&flatten(context), format),
        Layer::Mapping(_) => Err(SerializationError::NotAContext),
    }
}

/// Encodes an already-flat mapping; every value must be portable.
pub fn encode_map(map: &Map, format: &SnapshotFormat) -> Result<String, SerializationError> {
    let mut json = serde_json::Map::new();
    for (name, value) in map {
        let portable = value
            .to_portable()
            .ok_or_else(|| SerializationError::NotPortable(name.clone()))?;
        json.insert(name.clone(), portable);
    }
    encode_payload(&json, format)
}

/// Decodes a bare payload into a mapping.
pub fn decode_map(payload: &str) -> Result<Map, SerializationError> {
    let json: serde_json::Map<String, serde_json::Value> = decode_payload(payload)?;
    Ok(json.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}

/// Finds the rightmost snapshot in `text` and decodes it.
///
/// Absent or unreadable snapshots yield `None`.
pub fn decode(text: &str, format: &SnapshotFormat) -> Option<Map> {
    let payload = format.find(text)?;
    match decode_map(payload) {
        Ok(map) => Some(map),
        Err(err) => {
            warn!(error = %err, "ignoring unreadable context snapshot");
            None
        }
    }
}

/// The render context's CSRF token as a plain string, or [`NOT_PROVIDED`].
pub fn backup_csrf_token(context: &Context) -> Value {
    match context.resolve(CSRF_KEY) {
        Some(Value::Null) | None => Value::String(NOT_PROVIDED.to_owned()),
        Some(token) => Value::String(token.to_string()),
    }
}
