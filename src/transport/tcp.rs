//! Loopback TCP listener and the non-blocking transport trait.
//!
//! Nothing here ever awaits readiness. Accept, read and write either make
//! progress immediately or report that they would block, so a poll tick
//! never stalls on a slow or silent peer.
//!
//! # Example
//!
//! ```no_run
//! use scene_remote::transport::LoopbackListener;
//!
//! # async fn run() -> scene_remote::Result<()> {
//! let listener = LoopbackListener::bind(2021).await?;
//! while let Some((stream, peer)) = listener.try_accept().await? {
//!     println!("accepted {}", peer);
//!     drop(stream);
//! }
//! # Ok(())
//! # }
//! ```

use std::io::{self, IoSlice};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;

/// Non-blocking byte transport driven by a connection's poll tick.
///
/// Both methods must return [`io::ErrorKind::WouldBlock`] instead of
/// waiting when no progress is possible.
pub trait Transport {
    /// Read whatever is available into `buf`. `Ok(0)` means the peer closed.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much of `bufs` as the transport accepts right now.
    fn try_write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;
}

impl Transport for TcpStream {
    #[inline]
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    #[inline]
    fn try_write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        TcpStream::try_write_vectored(self, bufs)
    }
}

/// TCP listener bound to the IPv4 loopback interface only.
pub struct LoopbackListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl LoopbackListener {
    /// Bind to `127.0.0.1:port`. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept one already-completed connection without waiting.
    ///
    /// Returns `Ok(None)` when no connection is pending.
    pub async fn try_accept(&self) -> Result<Option<(TcpStream, SocketAddr)>> {
        match tokio::time::timeout(Duration::ZERO, self.listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                stream.set_nodelay(true)?;
                Ok(Some((stream, peer)))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_elapsed) => Ok(None),
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
