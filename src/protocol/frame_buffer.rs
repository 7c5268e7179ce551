//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` to hold unconsumed bytes between reads.
//! Implements a resumable state machine:
//! - `WaitingForHeader`: need 4 header bytes (may arrive over several reads)
//! - `WaitingForPayload`: header parsed, need N payload bytes
//!
//! One call drains every complete frame in the supplied data, so a single
//! socket read that carries several concatenated frames yields several
//! messages, in arrival order.
//!
//! # Example
//!
//! ```
//! use scene_remote::protocol::{build_frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = build_frame(br#"{"values":[]}"#).unwrap();
//!
//! assert!(buffer.push(&bytes[..6]).unwrap().is_empty());
//! let messages = buffer.push(&bytes[6..]).unwrap();
//! assert_eq!(messages.len(), 1);
//! ```

use bytes::BytesMut;

use super::wire_format::{decode_header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::codec::{JsonCodec, JsonObject};
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 4 header bytes.
    WaitingForHeader,
    /// Header parsed, waiting for `remaining` payload bytes.
    WaitingForPayload { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create a new, empty frame buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD_SIZE),
            state: State::WaitingForHeader,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// # Errors
    ///
    /// Returns a protocol error on a malformed header or payload. Messages
    /// completed earlier in the same call are discarded; use
    /// [`push_into`](Self::push_into) to keep them.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<JsonObject>> {
        let mut messages = Vec::new();
        self.push_into(data, &mut messages)?;
        Ok(messages)
    }

    /// Push data and append every completed message to `out`.
    ///
    /// On error, `out` still holds the messages decoded before the bad
    /// frame. The buffer must not be used after an error; the connection
    /// it belongs to is expected to terminate.
    pub fn push_into(&mut self, data: &[u8], out: &mut Vec<JsonObject>) -> Result<()> {
        self.buffer.extend_from_slice(data);

        while let Some(message) = self.try_extract_one()? {
            out.push(message);
        }

        Ok(())
    }

    /// Try to extract a single message from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(message))` if a complete frame was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    fn try_extract_one(&mut self) -> Result<Option<JsonObject>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let payload_length = decode_header(&self.buffer[..HEADER_SIZE])?;
                    let _ = self.buffer.split_to(HEADER_SIZE);

                    self.state = State::WaitingForPayload {
                        remaining: payload_length,
                    };
                }

                State::WaitingForPayload { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(remaining);
                    self.state = State::WaitingForHeader;

                    return JsonCodec::decode_object(&payload).map(Some);
                }
            }
        }
    }

    /// Get the number of buffered bytes not yet consumed by a frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
