//! The host application, as seen by the protocol engine.
//!
//! The engine never owns scenes, sources, outputs or transitions. It reads
//! and mutates them through [`Studio`], reads system figures through
//! [`Statistics`], and learns about changes from an [`EventBus`].
//!
//! Every enumeration returns a fresh, ordered snapshot on each call. The
//! position of a scene item in [`Studio::scene_items`] is its identity on
//! the wire (bitmask items address sources by index).

mod events;
mod memory;
mod output;

pub use events::{EventBus, EventCategory, SceneChange, StudioEvent, Subscription};
pub use memory::MemoryStudio;
pub use output::{
    congestion_string, fps_string, time_string, OutputCache, OutputKind, OutputStats,
    NO_OUTPUT, NO_TIME,
};

/// One source placed in a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneItem {
    /// Display name of the underlying source.
    pub name: String,
    /// Whether the item is shown.
    pub visible: bool,
    /// Whether the item is locked against editing.
    pub locked: bool,
}

impl SceneItem {
    /// A visible, unlocked item.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            locked: false,
        }
    }
}

/// Scene, output and transition state of the host application.
///
/// Mutators request a change; the host reports the effect later through
/// its [`EventBus`]. Unknown names are ignored by the host.
pub trait Studio: Send {
    /// Scene names in host order.
    fn scenes(&self) -> Vec<String>;

    /// Items of `scene` in host order; empty for an unknown scene.
    fn scene_items(&self, scene: &str) -> Vec<SceneItem>;

    /// Transition names in host order.
    fn transitions(&self) -> Vec<String>;

    /// Scene on program output.
    fn current_scene(&self) -> Option<String>;

    /// Scene in the preview pane (studio mode).
    fn preview_scene(&self) -> Option<String>;

    /// Active transition.
    fn current_transition(&self) -> Option<String>;

    /// Duration of the active transition in milliseconds.
    fn transition_duration(&self) -> u32;

    /// Whether studio (preview/program) mode is on.
    fn is_studio_mode(&self) -> bool;

    /// Whether the streaming output is running.
    fn is_streaming(&self) -> bool;

    /// Whether the recording output is running.
    fn is_recording(&self) -> bool;

    /// Current figures of an output, if the host has one.
    fn output(&self, kind: OutputKind) -> Option<OutputStats>;

    /// Enter or leave studio mode.
    fn set_studio_mode(&mut self, enabled: bool);

    /// Start or stop the streaming output.
    fn set_streaming(&mut self, enabled: bool);

    /// Start or stop the recording output.
    fn set_recording(&mut self, enabled: bool);

    /// Put the named scene on program.
    fn set_current_scene(&mut self, name: &str);

    /// Put the named scene on preview. Only meaningful in studio mode.
    fn set_preview_scene(&mut self, name: &str);

    /// Select the named transition.
    fn set_current_transition(&mut self, name: &str);

    /// Set the transition duration in milliseconds.
    fn set_transition_duration(&mut self, millis: u32);

    /// Show or hide the `index`-th item of `scene`.
    fn set_item_visible(&mut self, scene: &str, index: usize, visible: bool);

    /// Lock or unlock the `index`-th item of `scene`.
    fn set_item_locked(&mut self, scene: &str, index: usize, locked: bool);

    /// Run the active transition from preview to program.
    fn trigger_transition(&mut self);
}

/// Preformatted system figures.
pub trait Statistics: Send {
    /// CPU usage, e.g. `"12.5 %"`.
    fn cpu_usage(&self) -> String;

    /// Memory in use, e.g. `"512.0 MB"`.
    fn memory_usage(&self) -> String;

    /// Free space on the recording disk, e.g. `"120.5 GB"`.
    fn free_disk(&self) -> String;
}
