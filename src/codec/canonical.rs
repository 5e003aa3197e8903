//! Canonical encoding and content hashing.
//!
//! spec.md §4.2/§9: the definitions hash must be deterministic for a given
//! set of table contents regardless of registration order (P2). `serde_json`
//! does not sort map keys on its own, so we re-serialize through
//! `serde_json::Value`, whose `Map` is backed by a `BTreeMap` when the
//! `preserve_order` feature is off (it is, here), sorting keys as a side
//! effect of the round-trip.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serialize `value` to its canonical (sorted-key) JSON byte representation.
///
/// This is used only as hashing input, never as the wire encoding for
/// envelopes - ordinary request/reply traffic uses whatever key order
/// `serde_json` produces natively, since envelope semantics don't depend on
/// byte-for-byte determinism.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    let as_value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    serde_json::to_vec(&as_value).unwrap_or_default()
}

/// SHA-256 content hash over `value`'s canonical encoding, hex-encoded.
pub fn canonical_hash<T: Serialize>(value: &T) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(value));
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}
