//! Service builder and tick loop.
//!
//! A [`Service`] is a [`Server`] plus a [`ProtocolAdapter`], driven together:
//! each tick polls the server, feeds what happened to the adapter, then
//! relays pending host events. Writes queued during a tick go out on the
//! next one.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use scene_remote::studio::{EventBus, MemoryStudio};
//! use scene_remote::Service;
//!
//! # async fn run() -> scene_remote::Result<()> {
//! let bus = EventBus::new();
//! let studio = MemoryStudio::new(bus.clone());
//!
//! let mut service = Service::builder()
//!     .port(2021)
//!     .keep_alive(Duration::from_secs(5))
//!     .build(studio.clone(), studio, &bus)
//!     .await?;
//!
//! service.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::adapter::ProtocolAdapter;
use crate::config::ServerConfig;
use crate::error::{RemoteError, Result};
use crate::server::{Server, ServerEvent};
use crate::studio::{EventBus, Statistics, Studio};

/// Builder for configuring and starting a [`Service`].
#[derive(Debug, Clone, Default)]
pub struct ServiceBuilder {
    config: ServerConfig,
}

impl ServiceBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the loopback port. 0 picks an ephemeral port.
    ///
    /// Default: 2021
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set how long a silent connection is kept.
    ///
    /// Default: 5 seconds
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// Set the poll tick interval used by [`Service::run`].
    ///
    /// Default: 30 ms
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    /// Set how many frames a connection may have queued before it is dropped.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.max_pending_frames = limit;
        self
    }

    /// Bind the server and subscribe the adapter to `bus`.
    pub async fn build(
        self,
        studio: impl Studio + 'static,
        stats: impl Statistics + 'static,
        bus: &EventBus,
    ) -> Result<Service> {
        validate(&self.config)?;
        let server = Server::bind(self.config).await?;
        let adapter = ProtocolAdapter::new(studio, stats, bus);
        Ok(Service { server, adapter })
    }
}

fn validate(config: &ServerConfig) -> Result<()> {
    if config.tick_interval.is_zero() {
        return Err(RemoteError::Config("tick interval must be non-zero".into()));
    }
    if config.keep_alive.is_zero() {
        return Err(RemoteError::Config("keep-alive must be non-zero".into()));
    }
    if config.max_pending_frames == 0 {
        return Err(RemoteError::Config("max pending frames must be non-zero".into()));
    }
    Ok(())
}

/// A running protocol service.
pub struct Service {
    server: Server,
    adapter: ProtocolAdapter,
}

impl Service {
    /// Create a new service builder.
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Number of connected clients.
    pub fn connection_count(&self) -> usize {
        self.server.connection_count()
    }

    /// The protocol adapter.
    pub fn adapter(&mut self) -> &mut ProtocolAdapter {
        &mut self.adapter
    }

    /// Run one tick and return the server events it handled.
    pub async fn tick(&mut self) -> Vec<ServerEvent> {
        let events = self.server.tick().await;
        for event in &events {
            self.adapter.handle_server_event(&mut self.server, event.clone());
        }
        let broadcasts = self.adapter.process_studio_events(&mut self.server);
        if broadcasts > 0 {
            tracing::trace!("Relayed {} item updates", broadcasts);
        }
        events
    }

    /// Tick until `shutdown` completes, then stop.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.server.config().tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        self.stop().await;
    }

    /// Stop listening and close every connection.
    pub async fn stop(&mut self) {
        self.server.stop();
        // Terminated connections close on the next idle pass.
        self.server.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::MemoryStudio;

    #[tokio::test]
    async fn test_builder_rejects_zero_limits() {
        let bus = EventBus::new();
        let studio = MemoryStudio::new(bus.clone());

        let result = Service::builder()
            .port(0)
            .max_pending_frames(0)
            .build(studio.clone(), studio, &bus)
            .await;
        assert!(matches!(result, Err(RemoteError::Config(_))));
    }

    #[tokio::test]
    async fn test_builder_binds_ephemeral_port() {
        let bus = EventBus::new();
        let studio = MemoryStudio::new(bus.clone());

        let mut service = Service::builder()
            .port(0)
            .build(studio.clone(), studio, &bus)
            .await
            .unwrap();
        assert_ne!(service.local_addr().port(), 0);
        assert!(service.tick().await.is_empty());
        assert_eq!(bus.subscriber_count(), 1);

        service.stop().await;
        drop(service);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
