use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes as lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of a value's JSON encoding.
///
/// Field order comes from the struct definitions and maps are `BTreeMap`s,
/// so equal values always hash equally.
pub fn json_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(content_hash(&serde_json::to_vec(value)?))
}
