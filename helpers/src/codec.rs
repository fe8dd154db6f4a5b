//! JSON encoding of protocol messages.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error when decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("deserialization failed: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Error when encoding a message.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Framing(#[from] crate::framing::FramingError),
}

/// Serialize a message into a payload (without framing).
pub fn encode<M: Serialize>(message: &M) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(message)?)
}

/// Serialize a message and wrap it in a frame.
pub fn encode_framed<M: Serialize>(message: &M) -> Result<Vec<u8>, EncodeError> {
    let payload = encode(message)?;
    Ok(crate::framing::frame_message(&payload)?)
}

/// Deserialize a message from a payload.
pub fn decode<M: DeserializeOwned>(payload: &[u8]) -> Result<M, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}
