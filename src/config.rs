//! Server configuration and the on-disk `port` setting.
//!
//! The host keeps a small JSON file such as `{"port": 2021}`. A missing,
//! unreadable or out-of-range value falls back to [`PORT_DEFAULT`].
//!
//! # Example
//!
//! ```no_run
//! use scene_remote::config::{load_or_init, ServerConfig};
//!
//! let port = load_or_init("remote.json");
//! let config = ServerConfig { port, ..ServerConfig::default() };
//! assert_eq!(config.keep_alive.as_millis(), 5000);
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::codec::JsonObject;
use crate::error::{RemoteError, Result};
use crate::writer::DEFAULT_MAX_PENDING_FRAMES;

/// Port used when the file has no usable value.
pub const PORT_DEFAULT: u16 = 2021;

/// Highest accepted port number.
pub const PORT_MAX: u16 = 65353;

/// Key holding the port in the config file.
pub const PORT_KEY: &str = "port";

/// Default keep-alive threshold.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_millis(5000);

/// Default poll tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(30);

/// Runtime settings for the server and its connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Loopback port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    /// Connections silent for longer than this are dropped.
    pub keep_alive: Duration,
    /// Interval between poll ticks.
    pub tick_interval: Duration,
    /// Frames a connection may have queued before it is dropped.
    pub max_pending_frames: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: PORT_DEFAULT,
            keep_alive: DEFAULT_KEEP_ALIVE,
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
        }
    }
}

/// Check a raw `port` value against `1..=PORT_MAX`.
///
/// Whole-number floats such as `2021.0` are accepted.
pub fn validate_port(value: &Value) -> Option<u16> {
    let port = match value.as_i64() {
        Some(port) => port,
        None => {
            let float = value.as_f64()?;
            if float.fract() != 0.0 || !float.is_finite() {
                return None;
            }
            float as i64
        }
    };
    if port <= 0 || port > i64::from(PORT_MAX) {
        return None;
    }
    u16::try_from(port).ok()
}

fn read_object(path: &Path) -> Result<JsonObject> {
    let text = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        _ => Err(RemoteError::Config(format!(
            "{} does not contain a JSON object",
            path.display()
        ))),
    }
}

/// Read the port from `path`, falling back to [`PORT_DEFAULT`].
pub fn load_port(path: impl AsRef<Path>) -> u16 {
    let path = path.as_ref();
    match read_object(path) {
        Ok(map) => map
            .get(PORT_KEY)
            .and_then(validate_port)
            .unwrap_or(PORT_DEFAULT),
        Err(e) => {
            tracing::debug!("Using default port, could not read {}: {}", path.display(), e);
            PORT_DEFAULT
        }
    }
}

/// Like [`load_port`], and writes the default back when the stored value
/// was missing or invalid. Other keys in the file are kept.
///
/// A failed write is logged; the default port is still returned.
pub fn load_or_init(path: impl AsRef<Path>) -> u16 {
    let path = path.as_ref();
    let mut map = read_object(path).unwrap_or_default();

    if let Some(port) = map.get(PORT_KEY).and_then(validate_port) {
        return port;
    }

    tracing::info!(
        "No valid port in {}, using {}",
        path.display(),
        PORT_DEFAULT
    );
    map.insert(PORT_KEY.to_string(), Value::from(PORT_DEFAULT));
    if let Err(e) = write_object(path, &map) {
        tracing::warn!("Failed to write {}: {}", path.display(), e);
    }
    PORT_DEFAULT
}

fn write_object(path: &Path, map: &JsonObject) -> Result<()> {
    let text = serde_json::to_string_pretty(map)?;
    fs::write(path, text)?;
    Ok(())
}
