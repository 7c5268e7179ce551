//! Frame struct and frame builders.
//!
//! A frame is the declared length (4 ASCII digits) plus that many bytes of
//! compact JSON. Uses `bytes::Bytes` so a broadcast payload is encoded once
//! and shared by every connection.
//!
//! # Example
//!
//! ```
//! use scene_remote::protocol::{build_frame, Frame};
//! use serde_json::json;
//!
//! let frame = Frame::from_json(&json!({"values": []})).unwrap().unwrap();
//! assert_eq!(frame.payload_len(), 13);
//! assert_eq!(&frame.header(), b"0013");
//!
//! let bytes = build_frame(br#"{"values":[]}"#).unwrap();
//! assert_eq!(&bytes[..], br#"0013{"values":[]}"#);
//! ```

use bytes::Bytes;

use super::wire_format::{encode_header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::codec::{JsonCodec, JsonObject};
use crate::error::{RemoteError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes; the declared length is always `payload.len()`.
    payload: Bytes,
}

impl Frame {
    /// Create a frame from already-encoded payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::PayloadTooLarge`] if the payload cannot be
    /// described by a 4-digit header.
    pub fn new(payload: Bytes) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(RemoteError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { payload })
    }

    /// Serialize `value` to compact JSON and wrap it in a frame.
    ///
    /// Returns `Ok(None)` when the encoding is empty: nothing is sent and a
    /// warning is logged, but this is not an error.
    pub fn from_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Option<Self>> {
        let encoded = JsonCodec::encode(value)?;
        if encoded.is_empty() {
            tracing::warn!("Frame writer asked to send 0 bytes, skipping");
            return Ok(None);
        }
        Self::new(Bytes::from(encoded)).map(Some)
    }

    /// The 4-byte ASCII length header for this frame.
    #[inline]
    pub fn header(&self) -> [u8; HEADER_SIZE] {
        // Length is validated on construction.
        encode_header(self.payload.len()).unwrap_or([b'0'; HEADER_SIZE])
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Get the payload length (the declared length).
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Total size on the wire (header + payload).
    #[inline]
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Parse the payload as a JSON object.
    pub fn to_message(&self) -> Result<JsonObject> {
        JsonCodec::decode_object(&self.payload)
    }
}

/// Build a complete frame (header + payload) as a single byte vector.
///
/// Unlike [`Frame::from_json`], an empty payload is encoded as a literal
/// `0000` header so callers can produce any byte sequence, including
/// invalid ones for testing peers.
pub fn build_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let header = encode_header(payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Serialize `value` to compact JSON and build a complete frame from it.
pub fn build_json_frame<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    build_frame(&JsonCodec::encode(value)?)
}
