//! JSON text framing and sample payload encoding.

use crate::{ClientMessage, ServerMessage};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;
use unison_core::error::ProtocolError;
use unison_core::SAMPLE_WIDTH_BYTES;

type Result<T> = std::result::Result<T, ProtocolError>;

/// Parse a device's text frame.
///
/// Distinguishes unparseable text, a missing or unknown `type` tag, and a
/// known type whose fields do not fit.
pub fn decode_client(text: &str) -> Result<ClientMessage> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing type tag".to_string()))?;
    if !ClientMessage::TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

/// Serialize a coordinator message to a shareable text frame.
pub fn encode_server(message: &ServerMessage) -> Result<Arc<str>> {
    serde_json::to_string(message)
        .map(Arc::from)
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Parse a coordinator text frame.
pub fn decode_server(text: &str) -> Result<ServerMessage> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Serialize a device message to a text frame.
pub fn encode_client(message: &ClientMessage) -> Result<String> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Encode interleaved samples as base64 of their little-endian bytes.
pub fn encode_samples(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * SAMPLE_WIDTH_BYTES);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    STANDARD.encode(bytes)
}

/// Decode an `audio_chunk` payload back into samples.
pub fn decode_samples(data: &str) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
    if bytes.len() % SAMPLE_WIDTH_BYTES != 0 {
        return Err(ProtocolError::InvalidPayload(format!(
            "{} bytes is not a whole number of samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(SAMPLE_WIDTH_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
