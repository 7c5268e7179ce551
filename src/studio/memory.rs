//! In-memory host used by tests and the demo binary.
//!
//! Behaves like a small compositing application: it keeps scenes, items,
//! transitions and two outputs, and publishes the matching [`StudioEvent`]
//! after every change that actually alters state.
//!
//! # Example
//!
//! ```
//! use scene_remote::studio::{EventBus, EventCategory, MemoryStudio, SceneItem, Studio, StudioEvent};
//!
//! let bus = EventBus::new();
//! let mut studio = MemoryStudio::new(bus.clone());
//! studio.add_scene("Intro", vec![SceneItem::new("Camera")]);
//!
//! let mut events = bus.subscribe(&[EventCategory::Outputs]);
//! studio.set_streaming(true);
//!
//! assert!(studio.is_streaming());
//! assert_eq!(events.try_next(), Some(StudioEvent::StreamingStateChanged(true)));
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    EventBus, OutputKind, OutputStats, SceneChange, SceneItem, Statistics, Studio, StudioEvent,
};

const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Clone)]
struct MemoryScene {
    name: String,
    items: Vec<SceneItem>,
}

#[derive(Debug)]
struct MemoryState {
    scenes: Vec<MemoryScene>,
    current_scene: Option<String>,
    preview_scene: Option<String>,
    studio_mode: bool,
    transitions: Vec<String>,
    current_transition: Option<String>,
    transition_duration: u32,
    streaming_output: Option<OutputStats>,
    recording_output: Option<OutputStats>,
    cpu_usage: String,
    memory_usage: String,
    free_disk: String,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            scenes: Vec::new(),
            current_scene: None,
            preview_scene: None,
            studio_mode: false,
            transitions: vec!["Cut".to_string(), "Fade".to_string()],
            current_transition: Some("Fade".to_string()),
            transition_duration: 300,
            streaming_output: Some(OutputStats::idle("simple_stream", DEFAULT_FPS)),
            recording_output: Some(OutputStats::idle("simple_file_output", DEFAULT_FPS)),
            cpu_usage: "0.0 %".to_string(),
            memory_usage: "0.0 MB".to_string(),
            free_disk: "0.0 GB".to_string(),
        }
    }
}

impl MemoryState {
    fn scene(&self, name: &str) -> Option<&MemoryScene> {
        self.scenes.iter().find(|scene| scene.name == name)
    }

    fn scene_mut(&mut self, name: &str) -> Option<&mut MemoryScene> {
        self.scenes.iter_mut().find(|scene| scene.name == name)
    }

    fn has_scene(&self, name: &str) -> bool {
        self.scene(name).is_some()
    }

    fn output_mut(&mut self, kind: OutputKind) -> &mut Option<OutputStats> {
        match kind {
            OutputKind::Streaming => &mut self.streaming_output,
            OutputKind::Recording => &mut self.recording_output,
        }
    }

    fn output(&self, kind: OutputKind) -> Option<&OutputStats> {
        match kind {
            OutputKind::Streaming => self.streaming_output.as_ref(),
            OutputKind::Recording => self.recording_output.as_ref(),
        }
    }

    fn is_active(&self, kind: OutputKind) -> bool {
        self.output(kind).is_some_and(|output| output.active)
    }

    /// Start or stop an output. Returns whether its state changed.
    fn set_active(&mut self, kind: OutputKind, active: bool) -> bool {
        match self.output_mut(kind) {
            Some(output) if output.active != active => {
                output.active = active;
                if active {
                    output.total_frames = 0;
                    output.dropped_frames = 0;
                }
                true
            }
            _ => false,
        }
    }
}

/// Shared handle to an in-memory host. Clones see the same state.
#[derive(Clone)]
pub struct MemoryStudio {
    state: Arc<Mutex<MemoryState>>,
    bus: EventBus,
}

impl MemoryStudio {
    /// Empty host with two transitions (`Cut`, `Fade`) and idle outputs.
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, events: Vec<StudioEvent>) {
        for event in events {
            self.bus.publish(event);
        }
    }

    fn scene_event(scene: &str, change: SceneChange) -> StudioEvent {
        StudioEvent::Scene {
            scene: scene.to_string(),
            change,
        }
    }

    /// Append a scene. The first scene becomes the program scene.
    pub fn add_scene(&self, name: &str, items: Vec<SceneItem>) {
        let mut events = vec![StudioEvent::SceneListChanged];
        {
            let mut state = self.lock();
            if state.has_scene(name) {
                tracing::warn!("Scene '{}' already exists", name);
                return;
            }
            state.scenes.push(MemoryScene {
                name: name.to_string(),
                items,
            });
            if state.current_scene.is_none() {
                state.current_scene = Some(name.to_string());
                events.push(StudioEvent::SceneChanged);
            }
        }
        self.publish(events);
    }

    /// Remove a scene; program/preview fall back to the first remaining one.
    pub fn remove_scene(&self, name: &str) {
        let mut events = vec![Self::scene_event(name, SceneChange::Removed)];
        {
            let mut state = self.lock();
            let before = state.scenes.len();
            state.scenes.retain(|scene| scene.name != name);
            if state.scenes.len() == before {
                return;
            }
            let fallback = state.scenes.first().map(|scene| scene.name.clone());
            if state.current_scene.as_deref() == Some(name) {
                state.current_scene = fallback.clone();
                events.push(StudioEvent::SceneChanged);
            }
            if state.preview_scene.as_deref() == Some(name) {
                state.preview_scene = fallback;
                events.push(StudioEvent::PreviewSceneChanged);
            }
        }
        events.push(StudioEvent::SceneListChanged);
        self.publish(events);
    }

    /// Rename a scene, keeping its position.
    pub fn rename_scene(&self, old: &str, new: &str) {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(scene) = state.scene_mut(old) else {
                return;
            };
            scene.name = new.to_string();
            for pointer in [&mut state.current_scene, &mut state.preview_scene] {
                if pointer.as_deref() == Some(old) {
                    *pointer = Some(new.to_string());
                }
            }
        }
        self.publish(vec![Self::scene_event(
            old,
            SceneChange::Renamed {
                new_name: new.to_string(),
            },
        )]);
    }

    /// Append an item to a scene.
    pub fn add_item(&self, scene: &str, item: SceneItem) {
        let name = item.name.clone();
        {
            let mut state = self.lock();
            let Some(target) = state.scene_mut(scene) else {
                return;
            };
            target.items.push(item);
        }
        self.publish(vec![Self::scene_event(scene, SceneChange::ItemAdded { item: name })]);
    }

    /// Remove the `index`-th item of a scene.
    pub fn remove_item(&self, scene: &str, index: usize) {
        let removed = {
            let mut state = self.lock();
            match state.scene_mut(scene) {
                Some(target) if index < target.items.len() => target.items.remove(index),
                _ => return,
            }
        };
        self.publish(vec![Self::scene_event(
            scene,
            SceneChange::ItemRemoved { item: removed.name },
        )]);
    }

    /// Move an item to a new position.
    pub fn move_item(&self, scene: &str, from: usize, to: usize) {
        {
            let mut state = self.lock();
            let Some(target) = state.scene_mut(scene) else {
                return;
            };
            if from >= target.items.len() || to >= target.items.len() || from == to {
                return;
            }
            let item = target.items.remove(from);
            target.items.insert(to, item);
        }
        self.publish(vec![Self::scene_event(scene, SceneChange::ItemsReordered)]);
    }

    /// Register a transition.
    pub fn add_transition(&self, name: &str) {
        {
            let mut state = self.lock();
            if state.transitions.iter().any(|t| t == name) {
                return;
            }
            state.transitions.push(name.to_string());
        }
        self.publish(vec![StudioEvent::TransitionListChanged]);
    }

    /// Replace or remove an output.
    pub fn set_output(&self, kind: OutputKind, output: Option<OutputStats>) {
        *self.lock().output_mut(kind) = output;
    }

    /// Advance an active output by `frames` frames.
    pub fn record_frames(&self, kind: OutputKind, frames: u64) {
        if let Some(output) = self.lock().output_mut(kind) {
            output.total_frames += frames;
        }
    }

    /// Replace the reported system figures.
    pub fn set_statistics(&self, cpu: &str, memory: &str, disk: &str) {
        let mut state = self.lock();
        state.cpu_usage = cpu.to_string();
        state.memory_usage = memory.to_string();
        state.free_disk = disk.to_string();
    }

    fn set_item_flag(
        &self,
        scene: &str,
        index: usize,
        flag: bool,
        field: fn(&mut SceneItem) -> &mut bool,
        change: fn(String, bool) -> SceneChange,
    ) {
        let name = {
            let mut state = self.lock();
            let Some(item) = state
                .scene_mut(scene)
                .and_then(|target| target.items.get_mut(index))
            else {
                return;
            };
            let slot = field(item);
            if *slot == flag {
                return;
            }
            *slot = flag;
            item.name.clone()
        };
        self.publish(vec![Self::scene_event(scene, change(name, flag))]);
    }
}

impl Studio for MemoryStudio {
    fn scenes(&self) -> Vec<String> {
        self.lock().scenes.iter().map(|scene| scene.name.clone()).collect()
    }

    fn scene_items(&self, scene: &str) -> Vec<SceneItem> {
        self.lock()
            .scene(scene)
            .map(|scene| scene.items.clone())
            .unwrap_or_default()
    }

    fn transitions(&self) -> Vec<String> {
        self.lock().transitions.clone()
    }

    fn current_scene(&self) -> Option<String> {
        self.lock().current_scene.clone()
    }

    fn preview_scene(&self) -> Option<String> {
        self.lock().preview_scene.clone()
    }

    fn current_transition(&self) -> Option<String> {
        self.lock().current_transition.clone()
    }

    fn transition_duration(&self) -> u32 {
        self.lock().transition_duration
    }

    fn is_studio_mode(&self) -> bool {
        self.lock().studio_mode
    }

    fn is_streaming(&self) -> bool {
        self.lock().is_active(OutputKind::Streaming)
    }

    fn is_recording(&self) -> bool {
        self.lock().is_active(OutputKind::Recording)
    }

    fn output(&self, kind: OutputKind) -> Option<OutputStats> {
        self.lock().output(kind).cloned()
    }

    fn set_studio_mode(&mut self, enabled: bool) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            if state.studio_mode == enabled {
                return;
            }
            state.studio_mode = enabled;
            if enabled {
                state.preview_scene = state.current_scene.clone();
            } else {
                state.preview_scene = None;
            }
            events.push(StudioEvent::StudioModeChanged(enabled));
        }
        self.publish(events);
    }

    fn set_streaming(&mut self, enabled: bool) {
        if self.lock().set_active(OutputKind::Streaming, enabled) {
            self.publish(vec![StudioEvent::StreamingStateChanged(enabled)]);
        }
    }

    fn set_recording(&mut self, enabled: bool) {
        if self.lock().set_active(OutputKind::Recording, enabled) {
            self.publish(vec![StudioEvent::RecordingStateChanged(enabled)]);
        }
    }

    fn set_current_scene(&mut self, name: &str) {
        {
            let mut state = self.lock();
            if !state.has_scene(name) {
                tracing::warn!("No scene named '{}'", name);
                return;
            }
            if state.current_scene.as_deref() == Some(name) {
                return;
            }
            state.current_scene = Some(name.to_string());
        }
        self.publish(vec![StudioEvent::SceneChanged]);
    }

    fn set_preview_scene(&mut self, name: &str) {
        {
            let mut state = self.lock();
            if !state.studio_mode {
                tracing::debug!("Preview scene ignored outside studio mode");
                return;
            }
            if !state.has_scene(name) {
                tracing::warn!("No scene named '{}'", name);
                return;
            }
            if state.preview_scene.as_deref() == Some(name) {
                return;
            }
            state.preview_scene = Some(name.to_string());
        }
        self.publish(vec![StudioEvent::PreviewSceneChanged]);
    }

    fn set_current_transition(&mut self, name: &str) {
        {
            let mut state = self.lock();
            if !state.transitions.iter().any(|t| t == name) {
                tracing::warn!("No transition named '{}'", name);
                return;
            }
            if state.current_transition.as_deref() == Some(name) {
                return;
            }
            state.current_transition = Some(name.to_string());
        }
        self.publish(vec![StudioEvent::TransitionChanged]);
    }

    fn set_transition_duration(&mut self, millis: u32) {
        {
            let mut state = self.lock();
            if state.transition_duration == millis {
                return;
            }
            state.transition_duration = millis;
        }
        self.publish(vec![StudioEvent::TransitionDurationChanged]);
    }

    fn set_item_visible(&mut self, scene: &str, index: usize, visible: bool) {
        self.set_item_flag(scene, index, visible, |item| &mut item.visible, |item, visible| {
            SceneChange::ItemVisibilityChanged { item, visible }
        });
    }

    fn set_item_locked(&mut self, scene: &str, index: usize, locked: bool) {
        self.set_item_flag(scene, index, locked, |item| &mut item.locked, |item, locked| {
            SceneChange::ItemLockChanged { item, locked }
        });
    }

    fn trigger_transition(&mut self) {
        {
            let mut state = self.lock();
            if !state.studio_mode {
                return;
            }
            let program = state.current_scene.take();
            state.current_scene = state.preview_scene.take();
            state.preview_scene = program;
        }
        self.publish(vec![
            StudioEvent::SceneChanged,
            StudioEvent::PreviewSceneChanged,
            StudioEvent::TransitionStopped,
        ]);
    }
}

impl Statistics for MemoryStudio {
    fn cpu_usage(&self) -> String {
        self.lock().cpu_usage.clone()
    }

    fn memory_usage(&self) -> String {
        self.lock().memory_usage.clone()
    }

    fn free_disk(&self) -> String {
        self.lock().free_disk.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::{EventCategory, Subscription};

    fn studio_with_events() -> (MemoryStudio, Subscription) {
        let bus = EventBus::new();
        let studio = MemoryStudio::new(bus.clone());
        studio.add_scene(
            "Intro",
            vec![SceneItem::new("Camera"), SceneItem::new("Logo")],
        );
        studio.add_scene("Main", vec![SceneItem::new("Screen")]);
        let events = bus.subscribe(&EventCategory::ALL);
        (studio, events)
    }

    fn drain(events: &mut Subscription) -> Vec<StudioEvent> {
        std::iter::from_fn(|| events.try_next()).collect()
    }

    #[test]
    fn test_first_scene_is_current() {
        let (studio, _) = studio_with_events();
        assert_eq!(studio.scenes(), vec!["Intro", "Main"]);
        assert_eq!(studio.current_scene().as_deref(), Some("Intro"));
        assert_eq!(studio.preview_scene(), None);
    }

    #[test]
    fn test_streaming_events_only_on_change() {
        let (mut studio, mut events) = studio_with_events();

        studio.set_streaming(true);
        studio.set_streaming(true);
        studio.set_streaming(false);

        assert_eq!(
            drain(&mut events),
            vec![
                StudioEvent::StreamingStateChanged(true),
                StudioEvent::StreamingStateChanged(false)
            ]
        );
    }

    #[test]
    fn test_preview_requires_studio_mode() {
        let (mut studio, mut events) = studio_with_events();

        studio.set_preview_scene("Main");
        assert_eq!(studio.preview_scene(), None);

        studio.set_studio_mode(true);
        assert_eq!(studio.preview_scene().as_deref(), Some("Intro"));
        studio.set_preview_scene("Main");

        assert_eq!(studio.preview_scene().as_deref(), Some("Main"));
        assert_eq!(
            drain(&mut events),
            vec![
                StudioEvent::StudioModeChanged(true),
                StudioEvent::PreviewSceneChanged
            ]
        );
    }

    #[test]
    fn test_trigger_transition_swaps_scenes() {
        let (mut studio, mut events) = studio_with_events();
        studio.trigger_transition();
        assert!(drain(&mut events).is_empty());

        studio.set_studio_mode(true);
        studio.set_preview_scene("Main");
        drain(&mut events);

        studio.trigger_transition();

        assert_eq!(studio.current_scene().as_deref(), Some("Main"));
        assert_eq!(studio.preview_scene().as_deref(), Some("Intro"));
        assert_eq!(drain(&mut events).last(), Some(&StudioEvent::TransitionStopped));
    }

    #[test]
    fn test_item_flags() {
        let (mut studio, mut events) = studio_with_events();

        studio.set_item_visible("Intro", 1, false);
        studio.set_item_visible("Intro", 1, false);
        studio.set_item_locked("Intro", 0, true);
        studio.set_item_locked("Intro", 9, true);

        let items = studio.scene_items("Intro");
        assert!(!items[1].visible);
        assert!(items[0].locked);
        assert_eq!(drain(&mut events).len(), 2);
    }

    #[test]
    fn test_topology_changes() {
        let (studio, mut events) = studio_with_events();

        studio.add_item("Intro", SceneItem::new("Music"));
        studio.move_item("Intro", 2, 0);
        studio.remove_item("Intro", 1);

        let names: Vec<_> = studio
            .scene_items("Intro")
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, vec!["Music", "Logo"]);
        assert_eq!(drain(&mut events).len(), 3);
    }

    #[test]
    fn test_remove_current_scene_falls_back() {
        let (studio, mut events) = studio_with_events();
        studio.remove_scene("Intro");

        assert_eq!(studio.current_scene().as_deref(), Some("Main"));
        let events = drain(&mut events);
        assert!(events.contains(&StudioEvent::SceneChanged));
        assert!(events.contains(&StudioEvent::SceneListChanged));
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let (mut studio, mut events) = studio_with_events();

        studio.set_current_scene("Missing");
        studio.set_current_transition("Swipe");

        assert_eq!(studio.current_scene().as_deref(), Some("Intro"));
        assert_eq!(studio.current_transition().as_deref(), Some("Fade"));
        assert!(drain(&mut events).is_empty());
    }
}
