//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::sync::{Arc, Mutex};

use super::Transport;

#[derive(Default)]
struct MockState {
    inbound: VecDeque<Vec<u8>>,
    peer_closed: bool,
    written: Vec<u8>,
    write_limit: Option<usize>,
    write_error: Option<io::ErrorKind>,
}

/// Cloneable handle; clones share the same scripted state.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue one chunk to be returned by a single `try_read`.
    pub(crate) fn feed(&self, chunk: &[u8]) {
        self.state.lock().unwrap().inbound.push_back(chunk.to_vec());
    }

    /// After queued chunks are consumed, report end of stream.
    pub(crate) fn close_peer(&self) {
        self.state.lock().unwrap().peer_closed = true;
    }

    /// Accept at most `limit` bytes per write call (0 blocks writes).
    pub(crate) fn limit_writes(&self, limit: Option<usize>) {
        self.state.lock().unwrap().write_limit = limit;
    }

    pub(crate) fn fail_writes(&self, kind: io::ErrorKind) {
        self.state.lock().unwrap().write_error = Some(kind);
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }
}

impl Transport for MockTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        match state.inbound.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    state.inbound.push_front(chunk.split_off(n));
                }
                Ok(n)
            }
            None if state.peer_closed => Ok(0),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn try_write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.write_error {
            return Err(kind.into());
        }

        let mut budget = state.write_limit.unwrap_or(usize::MAX);
        if budget == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let mut total = 0;
        for buf in bufs {
            let n = buf.len().min(budget);
            state.written.extend_from_slice(&buf[..n]);
            total += n;
            budget -= n;
            if budget == 0 {
                break;
            }
        }
        Ok(total)
    }
}
