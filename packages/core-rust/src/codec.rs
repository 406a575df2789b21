//! Payload wire codec.
//!
//! Incoming payload bytes are decoded into a structural `serde_json::Value`
//! before schema validation, and outgoing leaf values are encoded back with the
//! same format so a routed result can be consumed by the next callable without
//! translation. JSON is the reference encoding; `MsgPack` uses
//! `rmp_serde::to_vec_named()` so struct fields keep their names on the wire.

use serde::Serialize;
use serde_json::Value;

/// Errors produced while decoding or encoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed MsgPack payload: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
    #[error("MsgPack encoding failed: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
}

/// Byte-level encoding of payloads flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// UTF-8 JSON text.
    #[default]
    Json,
    /// `MessagePack` with named map keys.
    MsgPack,
}

impl WireFormat {
    /// Decode payload bytes into a structural value.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the bytes are not valid for this format.
    pub fn decode(self, bytes: &[u8]) -> Result<Value, CodecError> {
        match self {
            Self::Json => Ok(serde_json::from_slice(bytes)?),
            Self::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }

    /// Encode a serializable value into payload bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the value cannot be represented in this format
    /// (e.g. a map with non-string keys for JSON).
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Json => Ok(serde_json::to_vec(value)?),
            Self::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
