//! Memory Host - serve an in-memory compositing host to remote clients.
//!
//! This example demonstrates:
//! - Reading the listen port from a JSON settings file
//! - Building a [`Service`] with the fluent builder
//! - Feeding the host with live output figures while clients are connected
//!
//! # Running
//!
//! ```text
//! RUST_LOG=scene_remote=debug cargo run --example memory_host -- remote.json
//! ```
//!
//! Then connect and send a framed request, e.g. with a small script:
//!
//! ```text
//! 0059{"values":[{"name":"streaming","type":"set","value":true}]}
//! ```

use std::time::Duration;

use scene_remote::config::load_or_init;
use scene_remote::studio::{EventBus, MemoryStudio, OutputKind, SceneItem};
use scene_remote::Service;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "scene-remote.json".to_string());
    let port = load_or_init(&settings);

    let bus = EventBus::new();
    let studio = MemoryStudio::new(bus.clone());
    studio.add_scene(
        "Starting Soon",
        vec![SceneItem::new("Background"), SceneItem::new("Countdown")],
    );
    studio.add_scene(
        "Live",
        vec![
            SceneItem::new("Camera"),
            SceneItem::new("Microphone"),
            SceneItem::new("Overlay"),
        ],
    );

    let mut service = Service::builder()
        .port(port)
        .build(studio.clone(), studio.clone(), &bus)
        .await?;
    tracing::info!("Serving on {}", service.local_addr());

    // One second of video per second of wall time.
    let feeder = studio.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut seconds = 0u32;
        loop {
            ticker.tick().await;
            seconds += 1;
            feeder.record_frames(OutputKind::Streaming, 30);
            feeder.record_frames(OutputKind::Recording, 30);
            feeder.set_statistics(
                &format!("{:.1} %", 5.0 + f64::from(seconds % 10)),
                "512.0 MB",
                "120.5 GB",
            );
        }
    });

    service
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to wait for Ctrl-C: {}", e);
            }
        })
        .await;

    Ok(())
}
