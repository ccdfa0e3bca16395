//! JSON text-frame codec for the relay protocol.
//!
//! Outbound envelopes are written as compact JSON objects. Inbound frames
//! must be JSON objects; every field inside is optional.

use crate::envelope::{InboundEnvelope, OutboundEnvelope};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The frame was not a JSON object or a field had the wrong type.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// A binary frame did not contain UTF-8 text.
    #[error("frame is not valid UTF-8")]
    NotUtf8,
}

/// Encodes an [`OutboundEnvelope`] as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the envelope cannot be serialized.
pub fn encode(envelope: &OutboundEnvelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes an [`InboundEnvelope`] as a JSON text frame.
///
/// Used by relays and test fixtures that speak the server side.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the envelope cannot be serialized.
pub fn encode_inbound(envelope: &InboundEnvelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an [`InboundEnvelope`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Malformed` if the text is not a JSON object or a
/// known field is not a string.
pub fn decode(text: &str) -> Result<InboundEnvelope, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Decodes an [`InboundEnvelope`] from a binary frame holding UTF-8 JSON.
///
/// # Errors
///
/// Returns `CodecError::NotUtf8` for non-UTF-8 payloads, otherwise the
/// same errors as [`decode`].
pub fn decode_bytes(bytes: &[u8]) -> Result<InboundEnvelope, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)?;
    decode(text)
}

/// Decodes an [`OutboundEnvelope`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Malformed` if any of the three fields is missing.
pub fn decode_outbound(text: &str) -> Result<OutboundEnvelope, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))
}
