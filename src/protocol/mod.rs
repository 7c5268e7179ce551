//! Protocol module - wire format, framing, and the message envelope.
//!
//! This module implements the length-prefixed JSON protocol:
//! - 4-byte ASCII decimal header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct for outbound messages
//! - `values` envelope carried inside every frame

mod envelope;
mod frame;
mod frame_buffer;
mod wire_format;

pub use envelope::{Envelope, ItemType, ValueItem};
pub use frame::{build_frame, build_json_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{decode_header, encode_header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
