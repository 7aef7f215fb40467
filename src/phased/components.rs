//! Component sets: the tag libraries a fragment needs on its second pass.

use std::collections::BTreeSet;

use tracing::warn;

use super::LIBRARY_ID;
use super::codec::{SnapshotFormat, decode_payload, encode_payload};
use super::error::SerializationError;
use crate::template::Parser;

/// Libraries in scope in `parser` that the second pass would not load on its own.
pub fn collect(parser: &Parser<'_>) -> BTreeSet<String> {
    let mut deny = parser.engine().builtin_ids();
    deny.insert(LIBRARY_ID.to_owned());

    parser
        .active_libraries()
        .into_iter()
        .filter(|id| !deny.contains(id))
        .collect()
}

pub fn encode(components: &BTreeSet<String>) -> Result<String, SerializationError> {
    encode_payload(components, &SnapshotFormat::COMPONENTS)
}

pub fn decode_set(payload: &str) -> Result<BTreeSet<String>, SerializationError> {
    decode_payload(payload)
}

/// Finds the rightmost component set in `text`. Absent or unreadable sets yield `None`.
pub fn decode(text: &str) -> Option<BTreeSet<String>> {
    let payload = SnapshotFormat::COMPONENTS.find(text)?;
    match decode_set(payload) {
        Ok(set) => Some(set),
        Err(err) => {
            warn!(error = %err, "ignoring unreadable component set");
            None
        }
    }
}
