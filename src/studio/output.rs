//! Output figures and their wire formatting.
//!
//! The [`OutputCache`] is owned by whoever serves output-derived items. It
//! is refreshed on every query: the entry is reused while the host keeps
//! reporting the same output id and rebuilt when the id changes.
//! Invalidation is explicit and happens when an output starts or stops.

use std::collections::HashMap;

use super::Studio;

/// Time shown when an output is absent or inactive.
pub const NO_TIME: &str = "00:00:00";

/// Placeholder for figures of an absent output.
pub const NO_OUTPUT: &str = "--";

/// Which output of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Streaming,
    Recording,
}

/// Figures reported by an output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStats {
    /// Host identifier of the output object.
    pub id: String,
    /// Whether the output is running.
    pub active: bool,
    pub total_frames: u64,
    pub dropped_frames: u64,
    /// 0.0 (none) to 1.0 (saturated).
    pub congestion: f64,
    /// Duration of one video frame in nanoseconds.
    pub frame_time_ns: u64,
    /// Video frame rate.
    pub fps: f64,
}

impl OutputStats {
    /// An idle output at the given frame rate.
    pub fn idle(id: impl Into<String>, fps: f64) -> Self {
        let frame_time_ns = if fps > 0.0 {
            (1_000_000_000.0 / fps).round() as u64
        } else {
            0
        };
        Self {
            id: id.into(),
            active: false,
            total_frames: 0,
            dropped_frames: 0,
            congestion: 0.0,
            frame_time_ns,
            fps,
        }
    }
}

/// `HH:MM:SS` elapsed output time, or [`NO_TIME`].
pub fn time_string(stats: Option<&OutputStats>) -> String {
    let Some(stats) = stats.filter(|s| s.active) else {
        return NO_TIME.to_string();
    };

    let total_seconds = stats.frame_time_ns.saturating_mul(stats.total_frames) / 1_000_000_000;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Congestion as a percentage with two decimals, e.g. `"12.50%"`.
pub fn congestion_string(stats: &OutputStats) -> String {
    format!("{:.2}%", stats.congestion * 100.0)
}

/// Frame rate with two decimals, e.g. `"29.97 fps"`.
pub fn fps_string(stats: &OutputStats) -> String {
    format!("{:.2} fps", stats.fps)
}

#[derive(Debug)]
struct CachedOutput {
    stats: OutputStats,
}

/// Per-kind cache of output figures.
#[derive(Debug, Default)]
pub struct OutputCache {
    entries: HashMap<OutputKind, CachedOutput>,
    rebuilds: u64,
}

impl OutputCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the host and update the entry for `kind`.
    ///
    /// Returns `None` (and drops the entry) when the host has no such output.
    pub fn refresh(&mut self, kind: OutputKind, studio: &dyn Studio) -> Option<&OutputStats> {
        let Some(latest) = studio.output(kind) else {
            self.entries.remove(&kind);
            return None;
        };

        let reuse = self
            .entries
            .get(&kind)
            .is_some_and(|cached| cached.stats.id == latest.id);

        if reuse {
            if let Some(cached) = self.entries.get_mut(&kind) {
                cached.stats = latest;
            }
        } else {
            tracing::debug!("Output cache rebuilt for {:?} ({})", kind, latest.id);
            self.rebuilds += 1;
            self.entries.insert(kind, CachedOutput { stats: latest });
        }

        self.entries.get(&kind).map(|cached| &cached.stats)
    }

    /// Last figures seen for `kind`, without querying the host.
    pub fn cached(&self, kind: OutputKind) -> Option<&OutputStats> {
        self.entries.get(&kind).map(|cached| &cached.stats)
    }

    /// Forget `kind`; the next refresh rebuilds it.
    pub fn invalidate(&mut self, kind: OutputKind) {
        self.entries.remove(&kind);
    }

    /// How many times an entry was built from scratch.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}
