//! Transport module - loopback TCP listener and non-blocking stream access.
//!
//! Provides:
//! - [`LoopbackListener`] - listener bound to `127.0.0.1` with zero-timeout accept
//! - [`Transport`] - the non-blocking read/write surface a connection drives

mod tcp;

#[cfg(test)]
pub(crate) mod mock;

pub use tcp::{LoopbackListener, Transport};
