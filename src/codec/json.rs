//! JSON codec using `serde_json`.
//!
//! Encoding always produces the compact form (no whitespace), which is what
//! the length header is computed from.

use serde_json::{Map, Value};

use crate::error::{RemoteError, Result};

/// A decoded inbound message: always a JSON object.
pub type JsonObject = Map<String, Value>;

/// JSON codec for frame payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to its most compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode payload bytes into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Protocol`] if the bytes are not valid JSON or
    /// the top-level value is not an object.
    pub fn decode_object(bytes: &[u8]) -> Result<JsonObject> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(RemoteError::Protocol(format!(
                "Payload is not a JSON object: {}",
                other
            ))),
            Err(e) => Err(RemoteError::Protocol(format!(
                "Malformed json ({}): {}",
                e,
                String::from_utf8_lossy(bytes)
            ))),
        }
    }
}
