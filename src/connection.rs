//! One accepted client connection.
//!
//! A connection owns its transport, the read-side [`FrameBuffer`], the
//! write-side [`WriteQueue`] and a liveness timer. It is driven entirely by
//! [`Connection::idle`], called once per server tick:
//!
//! ```text
//! Active ──terminate()──► Terminating ──idle()──► Closed
//!   │                                              ▲
//!   └──── keep-alive expiry / protocol error ──────┘
//!   └──── peer disconnect ─────────────────────────┘
//! ```
//!
//! Decoded messages are buffered until the owner drains them with
//! [`Connection::drain_received`]; outbound messages are queued and flushed
//! on the next tick.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::codec::JsonObject;
use crate::error::{RemoteError, Result};
use crate::protocol::{Frame, FrameBuffer};
use crate::transport::Transport;
use crate::writer::{FlushStatus, OutboundFrame, WriteQueue};

/// Size of the scratch buffer used for each non-blocking read.
const READ_CHUNK_SIZE: usize = 4096;

/// Server-assigned connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket bound, normal traffic.
    Active,
    /// Shutdown requested; closes on the next tick.
    Terminating,
    /// Transport released.
    Closed,
}

/// A client connection over any non-blocking [`Transport`].
pub struct Connection<T: Transport> {
    id: ConnectionId,
    /// `None` once closed; dropping the transport closes the socket.
    transport: Option<T>,
    frames: FrameBuffer,
    queue: WriteQueue,
    received: Vec<JsonObject>,
    read_buf: Box<[u8]>,
    last_activity: Instant,
    keep_alive: Duration,
    state: ConnectionState,
}

impl<T: Transport> Connection<T> {
    /// Wrap an accepted transport. The liveness timer starts now.
    pub fn new(id: ConnectionId, transport: T, keep_alive: Duration, max_pending_frames: usize) -> Self {
        Self {
            id,
            transport: Some(transport),
            frames: FrameBuffer::new(),
            queue: WriteQueue::new(max_pending_frames),
            received: Vec::new(),
            read_buf: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            last_activity: Instant::now(),
            keep_alive,
            state: ConnectionState::Active,
        }
    }

    /// Connection identity.
    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection still accepts traffic.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_frames(&self) -> usize {
        self.queue.len()
    }

    /// Run one poll tick. Never blocks.
    ///
    /// Returns `false` when the connection is no longer alive and should be
    /// removed by its owner.
    pub fn idle(&mut self) -> bool {
        match self.state {
            ConnectionState::Closed => return false,
            ConnectionState::Terminating => {
                self.close();
                return false;
            }
            ConnectionState::Active => {}
        }

        if self.last_activity.elapsed() > self.keep_alive {
            tracing::info!(
                "Connection {} idle for more than {:?}, terminating",
                self.id,
                self.keep_alive
            );
            self.terminate();
            self.close();
            return false;
        }

        match self.drain_reads() {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Connection {} closed by peer", self.id);
                self.close();
                return false;
            }
            Err(e) => {
                tracing::warn!("Connection {} read failed: {}", self.id, e);
                self.terminate();
                self.close();
                return false;
            }
        }

        if let Err(e) = self.flush() {
            tracing::warn!("Connection {} write failed: {}", self.id, e);
            self.terminate();
            self.close();
            return false;
        }

        true
    }

    /// Queue `value` for sending on the next tick.
    ///
    /// Returns `false` if the connection is not active or the message could
    /// not be framed. A message too large for the length header is dropped
    /// and the connection stays open; any other encoding failure terminates it.
    pub fn write_json<V: Serialize + ?Sized>(&mut self, value: &V) -> bool {
        if !self.is_active() {
            return false;
        }

        match Frame::from_json(value) {
            Ok(Some(frame)) => self.write_frame(OutboundFrame::from(&frame)),
            Ok(None) => true,
            Err(RemoteError::PayloadTooLarge(size)) => {
                tracing::warn!(
                    "Connection {} dropped a {} byte message over the frame limit",
                    self.id,
                    size
                );
                false
            }
            Err(e) => {
                tracing::warn!("Connection {} failed to encode message: {}", self.id, e);
                self.terminate();
                false
            }
        }
    }

    /// Queue an already-encoded frame.
    pub fn write_frame(&mut self, frame: OutboundFrame) -> bool {
        if !self.is_active() {
            return false;
        }

        if let Err(e) = self.queue.push(frame) {
            tracing::warn!("Connection {} is not draining: {}", self.id, e);
            self.terminate();
            return false;
        }
        true
    }

    /// Request shutdown. Idempotent.
    pub fn terminate(&mut self) {
        if self.state == ConnectionState::Active {
            tracing::debug!("Connection {} terminating", self.id);
            self.state = ConnectionState::Terminating;
        }
    }

    /// Take every message decoded since the last call, in arrival order.
    pub fn drain_received(&mut self) -> Vec<JsonObject> {
        std::mem::take(&mut self.received)
    }

    /// Read until the transport would block.
    ///
    /// Returns `Ok(false)` when the peer closed the stream.
    fn drain_reads(&mut self) -> Result<bool> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(false);
        };

        loop {
            match transport.try_read(&mut self.read_buf) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    let before = self.received.len();
                    let result = self.frames.push_into(&self.read_buf[..n], &mut self.received);
                    if self.received.len() > before {
                        self.last_activity = Instant::now();
                    }
                    result?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect(&e) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn flush(&mut self) -> Result<FlushStatus> {
        match self.transport.as_mut() {
            Some(transport) => self.queue.flush(transport),
            None => Err(RemoteError::ConnectionClosed),
        }
    }

    /// Best-effort flush, then release the transport.
    fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = self.queue.flush(&mut transport) {
                tracing::trace!("Connection {} dropped unsent frames: {}", self.id, e);
            }
        }
        self.queue.clear();
        self.state = ConnectionState::Closed;
        tracing::debug!("Connection {} closed", self.id);
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}
