//! Wire codec: round-trip serialization of request/reply envelopes and the
//! definition table (spec.md §4.2).
//!
//! Any codec satisfying [`Codec`] is acceptable. The crate ships
//! [`JsonCodec`] as the default - deterministic, self-describing, and
//! already the common denominator across the pack's AMQP consumers/
//! producers. [`CborCodec`] is provided for deployments that want a more
//! compact binary wire format; both round-trip the same Rust types, so
//! switching is a one-line change at both ends of a deployment.

pub mod canonical;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure to encode or decode a value through a [`Codec`].
#[derive(Debug, Error)]
#[error("codec error: {0}")]
pub struct CodecError(pub String);

/// A wire codec used for both request/reply envelopes and the definition
/// table (spec.md §4.2: "one codec instance is used for both").
///
/// The two required methods are deliberately untyped (`serde_json::Value`
/// in, bytes out) so the trait stays object-safe - the dispatcher, server,
/// and client all hold their codec behind `Arc<dyn Codec>`/`&dyn Codec`
/// rather than being generic over a concrete codec type. [`Codec::encode`]/
/// [`Codec::decode`] provide the ergonomic typed surface on top, for callers
/// that hold a concrete codec directly; the identical pair is available
/// through a trait object via the `impl dyn Codec` block below.
pub trait Codec: Send + Sync {
    /// Encode an already-structured value to bytes.
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into a structured value.
    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    /// Encode `value` to bytes, via an intermediate `serde_json::Value`.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        Self: Sized,
    {
        let value = serde_json::to_value(value).map_err(|e| CodecError(e.to_string()))?;
        self.encode_value(&value)
    }

    /// Decode bytes into a `T`, via an intermediate `serde_json::Value`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        Self: Sized,
    {
        let value = self.decode_value(bytes)?;
        serde_json::from_value(value).map_err(|e| CodecError(e.to_string()))
    }
}

impl dyn Codec {
    /// As [`Codec::encode`], callable through a trait object.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let value = serde_json::to_value(value).map_err(|e| CodecError(e.to_string()))?;
        self.encode_value(&value)
    }

    /// As [`Codec::decode`], callable through a trait object.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let value = self.decode_value(bytes)?;
        serde_json::from_value(value).map_err(|e| CodecError(e.to_string()))
    }
}

/// JSON codec over `serde_json`. The default, and the only codec required
/// to satisfy P3 (round-trip) for the envelope types in
/// [`crate::envelope`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError(e.to_string()))
    }
}

/// CBOR codec over `serde_cbor`, for deployments preferring a compact binary
/// wire format over human-readable JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_cbor::to_vec(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_cbor::from_slice(bytes).map_err(|e| CodecError(e.to_string()))
    }
}
