//! Codec module - serialization/deserialization for frame payloads.
//!
//! Payloads are compact UTF-8 JSON. Inbound payloads must decode to a JSON
//! object; anything else is a protocol violation.
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.
//!
//! # Example
//!
//! ```
//! use scene_remote::codec::JsonCodec;
//! use serde_json::json;
//!
//! let encoded = JsonCodec::encode(&json!({"values": []})).unwrap();
//! assert_eq!(encoded, br#"{"values":[]}"#);
//!
//! let decoded = JsonCodec::decode_object(&encoded).unwrap();
//! assert!(decoded.contains_key("values"));
//! ```

mod json;

pub use json::{JsonCodec, JsonObject};
