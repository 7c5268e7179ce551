//! Protocol adapter: named items over the host application.
//!
//! The adapter owns the accessor table and sits between the server's event
//! stream and the [`Studio`]:
//!
//! - a new connection receives a snapshot of every readable item
//! - `get` entries are answered to the sender only, labelled `"set"`
//! - `set` entries call the setter and produce no reply; the change comes
//!   back to every client (sender included) once the host reports it
//! - host events are turned into one broadcast message per affected item
//!
//! # Example
//!
//! ```
//! use scene_remote::adapter::{items, ProtocolAdapter};
//! use scene_remote::studio::{EventBus, MemoryStudio, SceneItem};
//!
//! let bus = EventBus::new();
//! let studio = MemoryStudio::new(bus.clone());
//! studio.add_scene("Intro", vec![SceneItem::new("Camera")]);
//!
//! let mut adapter = ProtocolAdapter::new(studio.clone(), studio, &bus);
//! let snapshot = adapter.snapshot();
//! assert_eq!(snapshot.len(), items::ALL.len());
//! assert_eq!(snapshot[0].name, items::CPU_USAGE);
//! ```

use serde::Serialize;
use serde_json::{json, Value};

use crate::codec::JsonObject;
use crate::connection::ConnectionId;
use crate::error::RemoteError;
use crate::handler::{AccessorRegistry, Mask, Millis, Switch};
use crate::protocol::{Envelope, ItemType, ValueItem};
use crate::server::{Outbound, ServerEvent};
use crate::studio::{
    congestion_string, fps_string, time_string, EventBus, EventCategory, OutputCache, OutputKind,
    OutputStats, SceneChange, SceneItem, Statistics, Studio, StudioEvent, Subscription, NO_OUTPUT,
};

/// Item names understood on the wire, in snapshot order.
pub mod items {
    pub const CPU_USAGE: &str = "cpuUsage";
    pub const MEMORY_USAGE: &str = "memoryUsage";
    pub const FREE_DISK: &str = "freeDisk";
    pub const RECORDING_TIME: &str = "recordingTime";
    pub const STREAMING_TIME: &str = "streamingTime";
    pub const TOTAL_FRAMES: &str = "totalFrames";
    pub const DROPPED_FRAMES: &str = "droppedFrames";
    pub const FPS: &str = "fps";
    pub const CONGESTION: &str = "congestion";
    pub const STUDIO_MODE: &str = "studioMode";
    pub const TRIGGER_TRANSITION: &str = "triggerTransition";
    pub const STREAMING: &str = "streaming";
    pub const RECORDING: &str = "recording";
    pub const SCENE_LIST: &str = "sceneList";
    pub const CURRENT_SCENE: &str = "currentScene";
    pub const PREVIEW_SCENE: &str = "previewScene";
    pub const SOURCE_LOCKS: &str = "sourceLocks";
    pub const SOURCE_VISIBLES: &str = "sourceVisibles";
    pub const TRANSITIONS_LIST: &str = "transitionsList";
    pub const CURRENT_TRANSITION: &str = "currentTransition";
    pub const TRANSITION_DURATION: &str = "transitionDuration";

    /// Every item, in the order new clients receive them.
    pub const ALL: [&str; 21] = [
        CPU_USAGE,
        MEMORY_USAGE,
        FREE_DISK,
        RECORDING_TIME,
        STREAMING_TIME,
        TOTAL_FRAMES,
        DROPPED_FRAMES,
        FPS,
        CONGESTION,
        STUDIO_MODE,
        TRIGGER_TRANSITION,
        STREAMING,
        RECORDING,
        SCENE_LIST,
        CURRENT_SCENE,
        PREVIEW_SCENE,
        SOURCE_LOCKS,
        SOURCE_VISIBLES,
        TRANSITIONS_LIST,
        CURRENT_TRANSITION,
        TRANSITION_DURATION,
    ];
}

use items::*;

/// Everything accessors read and mutate.
pub struct StudioContext {
    pub studio: Box<dyn Studio>,
    pub stats: Box<dyn Statistics>,
    pub outputs: OutputCache,
}

impl StudioContext {
    fn output_figure<F>(&mut self, kind: OutputKind, figure: F) -> Value
    where
        F: FnOnce(&OutputStats) -> Value,
    {
        match self.outputs.refresh(kind, self.studio.as_ref()) {
            Some(stats) => figure(stats),
            None => json!(NO_OUTPUT),
        }
    }

    fn output_time(&mut self, kind: OutputKind) -> String {
        time_string(self.outputs.refresh(kind, self.studio.as_ref()))
    }

    /// Scene whose items the bitmask items address.
    fn mask_scene(&self) -> Option<String> {
        self.studio.current_scene()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SceneSourceEntry {
    name: String,
    is_visible: bool,
    is_locked: bool,
    sort_index: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SceneEntry {
    name: String,
    sort_index: usize,
    is_current: bool,
    source_list: Vec<SceneSourceEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransitionEntry {
    name: String,
    sort_index: usize,
    is_current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
}

fn source_list(items: Vec<SceneItem>) -> Vec<SceneSourceEntry> {
    items
        .into_iter()
        .enumerate()
        .map(|(sort_index, item)| SceneSourceEntry {
            name: item.name,
            is_visible: item.visible,
            is_locked: item.locked,
            sort_index,
        })
        .collect()
}

fn scene_list(ctx: &mut StudioContext) -> Vec<SceneEntry> {
    let studio = ctx.studio.as_ref();
    // In studio mode the scene being edited is the preview.
    let highlighted = if studio.is_studio_mode() {
        studio.preview_scene()
    } else {
        studio.current_scene()
    };

    studio
        .scenes()
        .into_iter()
        .enumerate()
        .map(|(sort_index, name)| SceneEntry {
            is_current: highlighted.as_deref() == Some(name.as_str()),
            source_list: source_list(studio.scene_items(&name)),
            name,
            sort_index,
        })
        .collect()
}

fn transitions_list(ctx: &mut StudioContext) -> Vec<TransitionEntry> {
    let studio = ctx.studio.as_ref();
    let current = studio.current_transition();

    studio
        .transitions()
        .into_iter()
        .enumerate()
        .map(|(sort_index, name)| {
            let is_current = current.as_deref() == Some(name.as_str());
            TransitionEntry {
                duration: is_current.then(|| studio.transition_duration()),
                name,
                sort_index,
                is_current,
            }
        })
        .collect()
}

/// Mask of the current scene's items, or `""` without a current scene.
fn item_mask(ctx: &mut StudioContext, flag: fn(&SceneItem) -> bool) -> Value {
    match ctx.mask_scene() {
        Some(scene) => {
            let mask = Mask::from_flags(ctx.studio.scene_items(&scene).iter().map(flag));
            json!(mask.0)
        }
        None => json!(""),
    }
}

/// Apply `mask` to the current scene's items.
///
/// Bit `i` is the wanted state of the `i`-th item; items past bit 31 are
/// left alone. Only items whose state differs are touched.
fn apply_mask(
    ctx: &mut StudioContext,
    mask: Mask,
    flag: fn(&SceneItem) -> bool,
    apply: fn(&mut dyn Studio, &str, usize, bool),
) {
    let Some(scene) = ctx.mask_scene() else {
        tracing::debug!("No current scene, mask ignored");
        return;
    };

    let items = ctx.studio.scene_items(&scene);
    for (index, item) in items.iter().enumerate().take(Mask::BITS) {
        let wanted = mask.bit(index);
        if flag(item) != wanted {
            apply(ctx.studio.as_mut(), &scene, index, wanted);
        }
    }
}

fn set_scene_by_mode(ctx: &mut StudioContext, name: String) {
    if ctx.studio.is_studio_mode() {
        ctx.studio.set_preview_scene(&name);
    } else {
        ctx.studio.set_current_scene(&name);
    }
}

fn set_transition_by_name(ctx: &mut StudioContext, name: String) {
    if ctx.studio.transitions().iter().any(|t| *t == name) {
        ctx.studio.set_current_transition(&name);
    } else {
        tracing::warn!("Unknown transition '{}'", name);
    }
}

/// Build the accessor table for every item in [`items::ALL`].
pub fn build_registry() -> AccessorRegistry<StudioContext> {
    let mut registry = AccessorRegistry::new();

    registry.getter(CPU_USAGE, |ctx: &mut StudioContext| ctx.stats.cpu_usage());
    registry.getter(MEMORY_USAGE, |ctx: &mut StudioContext| ctx.stats.memory_usage());
    registry.getter(FREE_DISK, |ctx: &mut StudioContext| ctx.stats.free_disk());

    registry.getter(RECORDING_TIME, |ctx: &mut StudioContext| {
        ctx.output_time(OutputKind::Recording)
    });
    registry.getter(STREAMING_TIME, |ctx: &mut StudioContext| {
        ctx.output_time(OutputKind::Streaming)
    });
    registry.getter(TOTAL_FRAMES, |ctx: &mut StudioContext| {
        ctx.output_figure(OutputKind::Streaming, |s| json!(s.total_frames))
    });
    registry.getter(DROPPED_FRAMES, |ctx: &mut StudioContext| {
        ctx.output_figure(OutputKind::Streaming, |s| json!(s.dropped_frames))
    });
    registry.getter(FPS, |ctx: &mut StudioContext| {
        ctx.output_figure(OutputKind::Streaming, |s| json!(fps_string(s)))
    });
    registry.getter(CONGESTION, |ctx: &mut StudioContext| {
        ctx.output_figure(OutputKind::Streaming, |s| json!(congestion_string(s)))
    });

    registry
        .getter(STUDIO_MODE, |ctx: &mut StudioContext| ctx.studio.is_studio_mode())
        .setter(STUDIO_MODE, |ctx: &mut StudioContext, on: Switch| {
            ctx.studio.set_studio_mode(on.into())
        });

    // Reads as false so it is part of the snapshot; writing fires the action.
    registry
        .getter(TRIGGER_TRANSITION, |_: &mut StudioContext| false)
        .setter(TRIGGER_TRANSITION, |ctx: &mut StudioContext, _: Value| {
            if ctx.studio.is_studio_mode() {
                ctx.studio.trigger_transition();
            } else {
                tracing::debug!("triggerTransition ignored outside studio mode");
            }
        });

    registry
        .getter(STREAMING, |ctx: &mut StudioContext| ctx.studio.is_streaming())
        .setter(STREAMING, |ctx: &mut StudioContext, on: Switch| {
            ctx.studio.set_streaming(on.into())
        });
    registry
        .getter(RECORDING, |ctx: &mut StudioContext| ctx.studio.is_recording())
        .setter(RECORDING, |ctx: &mut StudioContext, on: Switch| {
            ctx.studio.set_recording(on.into())
        });

    registry
        .getter(SCENE_LIST, scene_list)
        .setter(SCENE_LIST, set_scene_by_mode);
    registry
        .getter(CURRENT_SCENE, |ctx: &mut StudioContext| {
            ctx.studio.current_scene().unwrap_or_default()
        })
        .setter(CURRENT_SCENE, |ctx: &mut StudioContext, name: String| {
            ctx.studio.set_current_scene(&name)
        });
    registry
        .getter(PREVIEW_SCENE, |ctx: &mut StudioContext| {
            ctx.studio.preview_scene().unwrap_or_default()
        })
        .setter(PREVIEW_SCENE, |ctx: &mut StudioContext, name: String| {
            ctx.studio.set_preview_scene(&name)
        });

    registry
        .getter(SOURCE_LOCKS, |ctx: &mut StudioContext| {
            item_mask(ctx, |item| item.locked)
        })
        .setter(SOURCE_LOCKS, |ctx: &mut StudioContext, mask: Mask| {
            apply_mask(ctx, mask, |item| item.locked, |studio, scene, index, on| {
                studio.set_item_locked(scene, index, on)
            })
        });
    registry
        .getter(SOURCE_VISIBLES, |ctx: &mut StudioContext| {
            item_mask(ctx, |item| item.visible)
        })
        .setter(SOURCE_VISIBLES, |ctx: &mut StudioContext, mask: Mask| {
            apply_mask(ctx, mask, |item| item.visible, |studio, scene, index, on| {
                studio.set_item_visible(scene, index, on)
            })
        });

    registry
        .getter(TRANSITIONS_LIST, transitions_list)
        .setter(TRANSITIONS_LIST, set_transition_by_name);
    registry
        .getter(CURRENT_TRANSITION, |ctx: &mut StudioContext| {
            ctx.studio.current_transition().unwrap_or_default()
        })
        .setter(CURRENT_TRANSITION, set_transition_by_name);
    registry
        .getter(TRANSITION_DURATION, |ctx: &mut StudioContext| {
            ctx.studio.transition_duration()
        })
        .setter(TRANSITION_DURATION, |ctx: &mut StudioContext, ms: Millis| {
            ctx.studio.set_transition_duration(ms.0)
        });

    registry
}

/// Items to rebroadcast after a host event. Empty means log only.
fn affected_items(event: &StudioEvent) -> &'static [&'static str] {
    match event {
        StudioEvent::StreamingStateChanged(_) => &[STREAMING],
        StudioEvent::RecordingStateChanged(_) => &[RECORDING],
        StudioEvent::StudioModeChanged(_) => &[STUDIO_MODE, SCENE_LIST, CURRENT_SCENE, PREVIEW_SCENE],
        StudioEvent::SceneChanged => &[SCENE_LIST, CURRENT_SCENE, SOURCE_VISIBLES, SOURCE_LOCKS],
        StudioEvent::PreviewSceneChanged => &[SCENE_LIST, CURRENT_SCENE, PREVIEW_SCENE],
        StudioEvent::SceneListChanged => &[SCENE_LIST],
        StudioEvent::TransitionChanged => &[TRANSITIONS_LIST, CURRENT_TRANSITION],
        StudioEvent::TransitionListChanged => &[TRANSITIONS_LIST],
        StudioEvent::TransitionStopped => &[TRIGGER_TRANSITION],
        StudioEvent::TransitionDurationChanged => &[TRANSITION_DURATION, TRANSITIONS_LIST],
        StudioEvent::Scene { change, .. } => match change {
            SceneChange::Destroyed
            | SceneChange::Activated(_)
            | SceneChange::Shown(_)
            | SceneChange::Enabled(_) => &[],
            SceneChange::Removed
            | SceneChange::Renamed { .. }
            | SceneChange::ItemAdded { .. }
            | SceneChange::ItemRemoved { .. }
            | SceneChange::ItemsReordered
            | SceneChange::ItemsRefreshed => &[SCENE_LIST],
            SceneChange::ItemVisibilityChanged { .. } => &[SCENE_LIST, SOURCE_VISIBLES],
            SceneChange::ItemLockChanged { .. } => &[SCENE_LIST, SOURCE_LOCKS],
        },
    }
}

/// Mediates between connected clients and the host application.
pub struct ProtocolAdapter {
    registry: AccessorRegistry<StudioContext>,
    ctx: StudioContext,
    events: Subscription,
    /// Scenes whose own events are relayed: program and preview.
    watched: Vec<String>,
}

impl ProtocolAdapter {
    /// Build the accessor table and subscribe to every event category.
    ///
    /// The subscription ends when the adapter is dropped.
    pub fn new(
        studio: impl Studio + 'static,
        stats: impl Statistics + 'static,
        bus: &EventBus,
    ) -> Self {
        let mut adapter = Self {
            registry: build_registry(),
            ctx: StudioContext {
                studio: Box::new(studio),
                stats: Box::new(stats),
                outputs: OutputCache::new(),
            },
            events: bus.subscribe(&EventCategory::ALL),
            watched: Vec::new(),
        };
        adapter.retarget_watch();
        adapter
    }

    /// The accessor table.
    pub fn registry(&self) -> &AccessorRegistry<StudioContext> {
        &self.registry
    }

    /// Scenes whose per-scene events are currently relayed.
    pub fn watched_scenes(&self) -> &[String] {
        &self.watched
    }

    /// Current value of every readable item, in registry order.
    pub fn snapshot(&mut self) -> Vec<ValueItem> {
        self.registry.snapshot(&mut self.ctx)
    }

    /// Current value of one item.
    pub fn current(&mut self, name: &str) -> crate::Result<ValueItem> {
        self.registry.current(name, &mut self.ctx)
    }

    /// React to one server notification.
    pub fn handle_server_event(&mut self, out: &mut dyn Outbound, event: ServerEvent) {
        match event {
            ServerEvent::ConnectionAdded(id) => self.connection_added(out, id),
            ServerEvent::MessageReceived(id, message) => self.message_received(out, id, &message),
            ServerEvent::ConnectionRemoved(id) => {
                tracing::debug!("Connection {} left", id);
            }
        }
    }

    fn connection_added(&mut self, out: &mut dyn Outbound, id: ConnectionId) {
        let snapshot = Envelope::new(self.snapshot());
        tracing::debug!("Sending {} items to connection {}", snapshot.values.len(), id);
        out.send_json(id, &snapshot.to_value());
    }

    fn message_received(&mut self, out: &mut dyn Outbound, id: ConnectionId, message: &JsonObject) {
        let replies = self.dispatch(&Envelope::from_message(message));
        if !replies.is_empty() {
            out.send_json(id, &Envelope::new(replies).to_value());
        }
    }

    /// Apply every entry of `envelope` in order.
    ///
    /// Returns the answers to its `get` entries. `set` entries produce no
    /// answer; unknown names and rejected values are logged and skipped.
    pub fn dispatch(&mut self, envelope: &Envelope) -> Vec<ValueItem> {
        let mut replies = Vec::new();

        for item in &envelope.values {
            match item.item_type {
                ItemType::Get => match self.registry.current(&item.name, &mut self.ctx) {
                    Ok(reply) => replies.push(reply),
                    Err(e) => log_dispatch_error("get", &e),
                },
                ItemType::Set => {
                    if let Err(e) = self.registry.set(&item.name, &mut self.ctx, &item.value) {
                        log_dispatch_error("set", &e);
                    }
                }
            }
        }

        replies
    }

    /// Drain host events and broadcast the items they affect.
    ///
    /// Returns how many messages were broadcast.
    pub fn process_studio_events(&mut self, out: &mut dyn Outbound) -> usize {
        let mut sent = 0;
        while let Some(event) = self.events.try_next() {
            sent += self.handle_studio_event(out, &event);
        }
        sent
    }

    fn handle_studio_event(&mut self, out: &mut dyn Outbound, event: &StudioEvent) -> usize {
        match event {
            StudioEvent::Scene { scene, change } => {
                if !self.watched.iter().any(|watched| watched == scene) {
                    tracing::trace!("Ignoring {:?} for unwatched scene '{}'", change, scene);
                    return 0;
                }
                tracing::debug!("Scene '{}': {:?}", scene, change);
            }
            StudioEvent::StreamingStateChanged(_) => {
                self.ctx.outputs.invalidate(OutputKind::Streaming);
            }
            StudioEvent::RecordingStateChanged(_) => {
                self.ctx.outputs.invalidate(OutputKind::Recording);
            }
            _ => tracing::debug!("Studio event {:?}", event),
        }

        if retargets_watch(event) {
            self.retarget_watch();
        }

        let mut sent = 0;
        for name in affected_items(event) {
            match self.registry.current(name, &mut self.ctx) {
                Ok(item) => {
                    out.broadcast_json(&Envelope::single(item).to_value());
                    sent += 1;
                }
                Err(e) => tracing::warn!("Could not refresh '{}': {}", name, e),
            }
        }
        sent
    }

    fn retarget_watch(&mut self) {
        let studio = self.ctx.studio.as_ref();
        let mut watched: Vec<String> = Vec::with_capacity(2);
        for scene in [studio.current_scene(), studio.preview_scene()].into_iter().flatten() {
            if !watched.contains(&scene) {
                watched.push(scene);
            }
        }
        if watched != self.watched {
            tracing::debug!("Watching scenes {:?}", watched);
            self.watched = watched;
        }
    }
}

fn retargets_watch(event: &StudioEvent) -> bool {
    matches!(
        event,
        StudioEvent::SceneChanged
            | StudioEvent::PreviewSceneChanged
            | StudioEvent::StudioModeChanged(_)
            | StudioEvent::SceneListChanged
            | StudioEvent::Scene {
                change: SceneChange::Renamed { .. } | SceneChange::Removed,
                ..
            }
    )
}

fn log_dispatch_error(kind: &str, error: &RemoteError) {
    match error {
        RemoteError::UnknownItem(name) => tracing::debug!("No {} accessor for '{}'", kind, name),
        other => tracing::warn!("Rejected {}: {}", kind, other),
    }
}
