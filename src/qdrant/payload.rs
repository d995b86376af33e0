//! Helpers for constructing and hashing Qdrant payloads.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(
    chunk_id: &str,
    text: &str,
    source: &str,
    start_index: usize,
    timestamp_rfc3339: &str,
    chunk_hash: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("chunk_id".into(), Value::String(chunk_id.to_string()));
    payload.insert("source".into(), Value::String(source.to_string()));
    payload.insert("start_index".into(), Value::from(start_index));
    payload.insert(
        "timestamp".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    payload.insert("chunk_hash".into(), Value::String(chunk_hash.to_string()));
    payload.insert("text".into(), Value::String(text.to_string()));
    Value::Object(payload)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct an identifier suitable for Qdrant points.
pub(crate) fn generate_chunk_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        let h2 = compute_chunk_hash("Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_chunk_hash("Hello world!"));
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn payload_records_source_and_offset() {
        let id = generate_chunk_id();
        let now = "2025-01-01T00:00:00Z";
        let payload = build_payload(&id, "sample", "alice.md", 1200, now, "abc123");
        assert_eq!(payload["chunk_id"], id);
        assert_eq!(payload["source"], "alice.md");
        assert_eq!(payload["start_index"], 1200);
        assert_eq!(payload["timestamp"], now);
        assert_eq!(payload["text"], "sample");
        assert_eq!(payload["chunk_hash"], "abc123");
    }
}
