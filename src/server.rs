//! Connection-set server driven by a fixed poll tick.
//!
//! Each [`Server::tick`]:
//! 1. accepts every connection that has completed on the loopback listener
//! 2. calls [`Connection::idle`] on each live connection, collecting decoded
//!    messages and marking dead connections for removal
//! 3. removes the marked connections
//!
//! and returns what happened as [`ServerEvent`]s, in order.
//!
//! # Example
//!
//! ```no_run
//! use scene_remote::config::ServerConfig;
//! use scene_remote::server::{Outbound, Server, ServerEvent};
//! use serde_json::json;
//!
//! # async fn run() -> scene_remote::Result<()> {
//! let mut server = Server::bind(ServerConfig::default()).await?;
//! loop {
//!     for event in server.tick().await {
//!         if let ServerEvent::ConnectionAdded(id) = event {
//!             server.send_json(id, &json!({"values": []}));
//!         }
//!     }
//!     tokio::time::sleep(server.config().tick_interval).await;
//! }
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use serde_json::Value;
use tokio::net::TcpStream;

use crate::codec::JsonObject;
use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::Result;
use crate::protocol::Frame;
use crate::transport::LoopbackListener;
use crate::writer::OutboundFrame;

/// Something that happened during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A client connected.
    ConnectionAdded(ConnectionId),
    /// A client sent a complete message.
    MessageReceived(ConnectionId, JsonObject),
    /// A client is gone and its connection destroyed.
    ConnectionRemoved(ConnectionId),
}

/// Sending side of the server, as seen by message handlers.
pub trait Outbound {
    /// Queue `value` for one connection. Returns `false` if it is gone.
    fn send_json(&mut self, id: ConnectionId, value: &Value) -> bool;

    /// Queue `value` for every live connection. Returns how many accepted it.
    fn broadcast_json(&mut self, value: &Value) -> usize;
}

/// Loopback server owning every client connection.
pub struct Server {
    /// `None` once stopped.
    listener: Option<LoopbackListener>,
    local_addr: SocketAddr,
    connections: HashMap<ConnectionId, Connection<TcpStream>>,
    /// Filled during the idle pass, emptied after it.
    pending_removal: HashSet<ConnectionId>,
    next_id: u64,
    config: ServerConfig,
}

impl Server {
    /// Start listening on `127.0.0.1:config.port`.
    ///
    /// A bind failure is logged and returned; there is no retry.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = match LoopbackListener::bind(config.port).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("Failed to listen on port {}: {}", config.port, e);
                return Err(e);
            }
        };
        let local_addr = listener.local_addr();
        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            listener: Some(listener),
            local_addr,
            connections: HashMap::new(),
            pending_removal: HashSet::new(),
            next_id: 1,
            config,
        })
    }

    /// Address the listener was bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Check if the server still accepts connections.
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Number of connections in the live set.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run one poll tick. Never waits on a socket.
    pub async fn tick(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        self.accept_pending(&mut events).await;

        for (id, connection) in self.connections.iter_mut() {
            let alive = connection.idle();
            events.extend(
                connection
                    .drain_received()
                    .into_iter()
                    .map(|message| ServerEvent::MessageReceived(*id, message)),
            );
            if !alive {
                self.pending_removal.insert(*id);
            }
        }

        for id in self.pending_removal.drain() {
            if self.connections.remove(&id).is_some() {
                tracing::debug!("Connection {} removed", id);
                events.push(ServerEvent::ConnectionRemoved(id));
            }
        }

        events
    }

    async fn accept_pending(&mut self, events: &mut Vec<ServerEvent>) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        loop {
            match listener.try_accept().await {
                Ok(Some((stream, peer))) => {
                    let id = ConnectionId(self.next_id);
                    self.next_id += 1;
                    tracing::debug!("Connection {} accepted from {}", id, peer);

                    let connection = Connection::new(
                        id,
                        stream,
                        self.config.keep_alive,
                        self.config.max_pending_frames,
                    );
                    self.connections.insert(id, connection);
                    events.push(ServerEvent::ConnectionAdded(id));
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Stop listening and ask every connection to terminate. Idempotent.
    ///
    /// Connections close and are removed on the following tick.
    pub fn stop(&mut self) {
        if self.listener.take().is_some() {
            tracing::info!("Server on {} stopping", self.local_addr);
        }
        for connection in self.connections.values_mut() {
            connection.terminate();
        }
    }
}

impl Outbound for Server {
    fn send_json(&mut self, id: ConnectionId, value: &Value) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => connection.write_json(value),
            None => {
                tracing::debug!("Dropping message for unknown connection {}", id);
                false
            }
        }
    }

    fn broadcast_json(&mut self, value: &Value) -> usize {
        let frame = match Frame::from_json(value) {
            Ok(Some(frame)) => OutboundFrame::from(&frame),
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!("Broadcast dropped: {}", e);
                return 0;
            }
        };

        self.connections
            .values_mut()
            .filter(|connection| connection.is_active())
            .map(|connection| connection.write_frame(frame.clone()))
            .filter(|accepted| *accepted)
            .count()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, FrameBuffer};
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            ..ServerConfig::default()
        }
    }

    /// Tick until `done` holds for the collected events, or give up.
    async fn tick_until(
        server: &mut Server,
        mut done: impl FnMut(&[ServerEvent]) -> bool,
    ) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(server.tick().await);
            if done(&events) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        events
    }

    async fn read_message(client: &mut TcpStream) -> JsonObject {
        let mut buffer = FrameBuffer::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0, "server closed connection");
            if let Some(message) = buffer.push(&chunk[..n]).unwrap().into_iter().next() {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn test_accept_and_receive() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();

        let events = tick_until(&mut server, |e| !e.is_empty()).await;
        assert!(matches!(events[0], ServerEvent::ConnectionAdded(_)));
        assert_eq!(server.connection_count(), 1);

        client
            .write_all(&build_frame(br#"{"values":[]}"#).unwrap())
            .await
            .unwrap();

        let events = tick_until(&mut server, |e| !e.is_empty()).await;
        match &events[0] {
            ServerEvent::MessageReceived(_, message) => assert_eq!(message["values"], json!([])),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_is_byte_identical() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let mut a = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut b = TcpStream::connect(server.local_addr()).await.unwrap();
        tick_until(&mut server, |e| e.len() >= 2).await;
        assert_eq!(server.connection_count(), 2);

        let value = json!({"values": [{"name": "streaming", "value": true, "type": "set"}]});
        assert_eq!(server.broadcast_json(&value), server.connection_count());
        server.tick().await;

        let expected = crate::protocol::build_json_frame(&value).unwrap();
        let mut got_a = vec![0u8; expected.len()];
        let mut got_b = vec![0u8; expected.len()];
        a.read_exact(&mut got_a).await.unwrap();
        b.read_exact(&mut got_b).await.unwrap();

        assert_eq!(got_a, expected);
        assert_eq!(got_b, expected);
    }

    #[tokio::test]
    async fn test_malformed_client_does_not_affect_others() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let mut bad = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut good = TcpStream::connect(server.local_addr()).await.unwrap();
        tick_until(&mut server, |e| e.len() >= 2).await;

        bad.write_all(b"xyz!{}").await.unwrap();
        let events = tick_until(&mut server, |e| {
            e.iter().any(|ev| matches!(ev, ServerEvent::ConnectionRemoved(_)))
        })
        .await;
        assert!(events
            .iter()
            .any(|ev| matches!(ev, ServerEvent::ConnectionRemoved(_))));
        assert_eq!(server.connection_count(), 1);

        server.broadcast_json(&json!({"still": "here"}));
        server.tick().await;
        let message = read_message(&mut good).await;
        assert_eq!(message["still"], "here");
    }

    #[tokio::test]
    async fn test_send_to_unknown_connection() {
        let mut server = Server::bind(test_config()).await.unwrap();
        assert!(!server.send_json(ConnectionId(99), &json!({})));
        assert_eq!(server.broadcast_json(&json!({})), 0);
    }

    #[tokio::test]
    async fn test_oversized_reply_keeps_connection() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        let events = tick_until(&mut server, |e| !e.is_empty()).await;
        let ServerEvent::ConnectionAdded(id) = events[0] else {
            panic!("unexpected event {:?}", events[0]);
        };

        let big = json!({"values": [{"name": "sceneList", "value": "x".repeat(10_000)}]});
        assert!(!server.send_json(id, &big));
        let events = server.tick().await;
        assert!(events.is_empty(), "unexpected events {:?}", events);
        assert_eq!(server.connection_count(), 1);

        assert!(server.send_json(id, &json!({"still": "here"})));
        server.tick().await;
        let message = read_message(&mut client).await;
        assert_eq!(message["still"], "here");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_clients() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        tick_until(&mut server, |e| !e.is_empty()).await;

        server.stop();
        server.stop();
        assert!(!server.is_listening());

        let events = server.tick().await;
        assert!(matches!(events[..], [ServerEvent::ConnectionRemoved(_)]));
        assert_eq!(server.connection_count(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }
}
