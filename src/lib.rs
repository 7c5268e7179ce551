//! # scene-remote
//!
//! Loopback TCP protocol engine that keeps remote control clients in sync
//! with a broadcast-compositing host application.
//!
//! ## Architecture
//!
//! - **Wire format**: a 4-digit ASCII decimal length header followed by a
//!   UTF-8 JSON object, see [`protocol`]
//! - **Connections**: non-blocking, keep-alive tracked, with a write queue
//!   flushed once per tick, see [`connection`]
//! - **Server**: a single tick-driven loop owning every connection, see [`server`]
//! - **Adapter**: named items read and written through an accessor table,
//!   see [`adapter`]
//!
//! Every message is an envelope of named values:
//!
//! ```text
//! 0059{"values":[{"name":"streaming","type":"set","value":true}]}
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use scene_remote::studio::{EventBus, MemoryStudio, SceneItem};
//! use scene_remote::Service;
//!
//! #[tokio::main]
//! async fn main() -> scene_remote::Result<()> {
//!     let bus = EventBus::new();
//!     let studio = MemoryStudio::new(bus.clone());
//!     studio.add_scene("Intro", vec![SceneItem::new("Camera")]);
//!
//!     let mut service = Service::builder()
//!         .build(studio.clone(), studio, &bus)
//!         .await?;
//!
//!     service.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod studio;
pub mod transport;
pub mod writer;

mod service;

pub use adapter::ProtocolAdapter;
pub use config::ServerConfig;
pub use error::{RemoteError, Result};
pub use protocol::{Envelope, ItemType, ValueItem};
pub use server::{Outbound, Server, ServerEvent};
pub use service::{Service, ServiceBuilder};
