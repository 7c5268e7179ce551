//! Per-connection outbound queue with non-blocking vectored flushing.
//!
//! Frames are queued when a message is sent and written on the connection's
//! next poll tick. This keeps writes out of request dispatch and lets one
//! flush batch several frames into a single `writev`.
//!
//! # Architecture
//!
//! ```text
//! write_json ─┐
//! broadcast  ─┼─► WriteQueue (VecDeque<OutboundFrame>) ─► flush on idle ─► socket
//! snapshot   ─┘
//! ```
//!
//! A partial write leaves the unwritten tail in place; the next flush
//! resumes mid-header or mid-payload.

use std::collections::VecDeque;
use std::io::{self, IoSlice};

use bytes::Bytes;

use crate::error::{RemoteError, Result};
use crate::protocol::{Frame, HEADER_SIZE};
use crate::transport::Transport;

/// Default maximum pending frames before a peer is considered stalled.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the socket.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded header (4 ASCII digits).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes, shared between connections on broadcast.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl From<&Frame> for OutboundFrame {
    fn from(frame: &Frame) -> Self {
        Self {
            header: frame.header(),
            payload: frame.payload_bytes(),
        }
    }
}

/// What a flush achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Every queued byte reached the transport.
    Drained,
    /// The transport would block; the rest stays queued.
    Pending,
}

/// Ordered queue of frames awaiting the socket.
#[derive(Debug)]
pub struct WriteQueue {
    frames: VecDeque<OutboundFrame>,
    /// Bytes of the front frame already written.
    offset: usize,
    max_pending: usize,
}

impl WriteQueue {
    /// Create an empty queue holding at most `max_pending` frames.
    pub fn new(max_pending: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            offset: 0,
            max_pending,
        }
    }

    /// Append a frame.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Backpressure`] when the queue is full.
    pub fn push(&mut self, frame: OutboundFrame) -> Result<()> {
        if self.frames.len() >= self.max_pending {
            return Err(RemoteError::Backpressure(self.max_pending));
        }
        self.frames.push_back(frame);
        Ok(())
    }

    /// Number of frames not yet fully written.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if nothing is waiting to be written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Discard everything still queued.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.offset = 0;
    }

    /// Write as much as the transport accepts without blocking.
    ///
    /// # Errors
    ///
    /// Any transport error other than `WouldBlock`/`Interrupted`, or a
    /// write that accepts zero bytes, is returned; the caller terminates
    /// the connection.
    pub fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<FlushStatus> {
        while !self.frames.is_empty() {
            let result = {
                let slices =
                    build_remaining_slices(self.frames.iter().take(MAX_BATCH_SIZE), self.offset);
                transport.try_write_vectored(&slices)
            };

            match result {
                Ok(0) => {
                    return Err(RemoteError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write_vectored returned 0",
                    )));
                }
                Ok(written) => self.advance(written),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushStatus::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(FlushStatus::Drained)
    }

    /// Mark `written` bytes as sent, popping completed frames.
    fn advance(&mut self, written: usize) {
        self.offset += written;
        while let Some(front) = self.frames.front() {
            if self.offset < front.size() {
                break;
            }
            self.offset -= front.size();
            self.frames.pop_front();
        }
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_FRAMES)
    }
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices<'a>(
    batch: impl Iterator<Item = &'a OutboundFrame>,
    skip_bytes: usize,
) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(MAX_BATCH_SIZE * 2);
    let mut skipped = 0;

    for frame in batch {
        // Handle header
        let header_start = skipped;
        let header_end = skipped + HEADER_SIZE;

        if skip_bytes < header_end {
            let start_in_header = skip_bytes.saturating_sub(header_start);
            slices.push(IoSlice::new(&frame.header[start_in_header..]));
        }
        skipped = header_end;

        // Handle payload
        if !frame.payload.is_empty() {
            let payload_start = skipped;
            let payload_end = skipped + frame.payload.len();

            if skip_bytes < payload_end {
                let start_in_payload = skip_bytes.saturating_sub(payload_start);
                slices.push(IoSlice::new(&frame.payload[start_in_payload..]));
            }
            skipped = payload_end;
        }
    }

    slices
}
