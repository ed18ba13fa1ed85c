//! §6's "length-prefixed binary serialization (proto3-compatible)" as the
//! practical Rust equivalent: `bincode` payloads framed by
//! `tokio_util::codec::LengthDelimitedCodec`. Not wire-compatible with an
//! actual protobuf decoder — no cross-implementation compatibility is
//! required, only agreement among this implementation's own nodes.

use bytes::Bytes;
use rapid_core::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::LengthDelimitedCodec;

pub fn framing_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(16 * 1024 * 1024)
        .new_codec()
}

pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, TransportError> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| TransportError::Codec(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransportError> {
    bincode::deserialize(bytes).map_err(|e| TransportError::Codec(e.to_string()))
}
