//! Change notifications from the host.
//!
//! The host publishes [`StudioEvent`]s on an [`EventBus`]. Consumers
//! subscribe to the categories they care about and poll their
//! [`Subscription`] from their own tick; dropping the subscription
//! unregisters it.
//!
//! # Example
//!
//! ```
//! use scene_remote::studio::{EventBus, EventCategory, StudioEvent};
//!
//! let bus = EventBus::new();
//! let mut outputs = bus.subscribe(&[EventCategory::Outputs]);
//!
//! bus.publish(StudioEvent::StreamingStateChanged(true));
//! bus.publish(StudioEvent::SceneListChanged);
//!
//! assert_eq!(outputs.try_next(), Some(StudioEvent::StreamingStateChanged(true)));
//! assert_eq!(outputs.try_next(), None);
//!
//! drop(outputs);
//! assert_eq!(bus.subscriber_count(), 0);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

/// What changed inside one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneChange {
    Destroyed,
    Removed,
    Activated(bool),
    Shown(bool),
    Enabled(bool),
    /// Renamed to `new_name`; the old name is the event's `scene`.
    Renamed { new_name: String },
    ItemAdded { item: String },
    ItemRemoved { item: String },
    ItemsReordered,
    ItemsRefreshed,
    ItemVisibilityChanged { item: String, visible: bool },
    ItemLockChanged { item: String, locked: bool },
}

/// A state change in the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    StreamingStateChanged(bool),
    RecordingStateChanged(bool),
    StudioModeChanged(bool),
    /// Program scene switched.
    SceneChanged,
    PreviewSceneChanged,
    /// Scenes added, removed or reordered.
    SceneListChanged,
    TransitionChanged,
    TransitionListChanged,
    TransitionStopped,
    TransitionDurationChanged,
    /// Something happened inside a single scene.
    Scene { scene: String, change: SceneChange },
}

/// Coarse grouping used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Streaming and recording state.
    Outputs,
    StudioMode,
    /// Program/preview scene and the scene list.
    Scenes,
    Transitions,
    /// Per-scene changes, including its items.
    SceneItems,
}

impl EventCategory {
    /// Every category.
    pub const ALL: [EventCategory; 5] = [
        EventCategory::Outputs,
        EventCategory::StudioMode,
        EventCategory::Scenes,
        EventCategory::Transitions,
        EventCategory::SceneItems,
    ];
}

impl StudioEvent {
    /// Category this event is delivered under.
    pub fn category(&self) -> EventCategory {
        match self {
            Self::StreamingStateChanged(_) | Self::RecordingStateChanged(_) => EventCategory::Outputs,
            Self::StudioModeChanged(_) => EventCategory::StudioMode,
            Self::SceneChanged | Self::PreviewSceneChanged | Self::SceneListChanged => {
                EventCategory::Scenes
            }
            Self::TransitionChanged
            | Self::TransitionListChanged
            | Self::TransitionStopped
            | Self::TransitionDurationChanged => EventCategory::Transitions,
            Self::Scene { .. } => EventCategory::SceneItems,
        }
    }
}

struct Subscriber {
    id: u64,
    categories: Vec<EventCategory>,
    tx: mpsc::UnboundedSender<StudioEvent>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

fn lock(inner: &Mutex<BusInner>) -> MutexGuard<'_, BusInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publish/subscribe hub for [`StudioEvent`]s.
///
/// Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `categories`.
    pub fn subscribe(&self, categories: &[EventCategory]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            categories: categories.to_vec(),
            tx,
        });

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every interested subscriber.
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, event: StudioEvent) -> usize {
        let category = event.category();
        let mut inner = lock(&self.inner);
        let mut delivered = 0;

        inner.subscribers.retain(|subscriber| {
            if !subscriber.categories.contains(&category) {
                return true;
            }
            match subscriber.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });

        tracing::trace!("Published {:?} to {} subscriber(s)", event, delivered);
        delivered
    }

    /// Number of registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

/// Receiving end of a bus registration. Unregisters on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<StudioEvent>,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Take the next pending event without waiting.
    pub fn try_next(&mut self) -> Option<StudioEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next event. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<StudioEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            lock(&inner).subscribers.retain(|s| s.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_event(change: SceneChange) -> StudioEvent {
        StudioEvent::Scene {
            scene: "Intro".to_string(),
            change,
        }
    }

    #[test]
    fn test_category_filtering() {
        let bus = EventBus::new();
        let mut scenes = bus.subscribe(&[EventCategory::Scenes, EventCategory::SceneItems]);
        let mut everything = bus.subscribe(&EventCategory::ALL);

        assert_eq!(bus.publish(StudioEvent::SceneChanged), 2);
        assert_eq!(bus.publish(StudioEvent::TransitionStopped), 1);
        assert_eq!(bus.publish(scene_event(SceneChange::ItemsReordered)), 2);

        assert_eq!(scenes.try_next(), Some(StudioEvent::SceneChanged));
        assert_eq!(scenes.try_next(), Some(scene_event(SceneChange::ItemsReordered)));
        assert_eq!(scenes.try_next(), None);

        assert_eq!(everything.try_next(), Some(StudioEvent::SceneChanged));
        assert_eq!(everything.try_next(), Some(StudioEvent::TransitionStopped));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let first = bus.subscribe(&EventCategory::ALL);
        let _second = bus.subscribe(&EventCategory::ALL);
        assert_eq!(bus.subscriber_count(), 2);

        drop(first);

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(StudioEvent::SceneListChanged), 1);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = EventBus::new();
        let mut subscription = bus.subscribe(&EventCategory::ALL);
        bus.publish(StudioEvent::StudioModeChanged(true));
        drop(bus);

        assert_eq!(subscription.try_next(), Some(StudioEvent::StudioModeChanged(true)));
        assert_eq!(subscription.try_next(), None);
    }

    #[test]
    fn test_event_categories() {
        assert_eq!(StudioEvent::RecordingStateChanged(false).category(), EventCategory::Outputs);
        assert_eq!(StudioEvent::TransitionDurationChanged.category(), EventCategory::Transitions);
        assert_eq!(StudioEvent::PreviewSceneChanged.category(), EventCategory::Scenes);
        assert_eq!(
            scene_event(SceneChange::Shown(true)).category(),
            EventCategory::SceneItems
        );
    }

    #[tokio::test]
    async fn test_next_waits_for_event() {
        let bus = EventBus::new();
        let mut subscription = bus.subscribe(&[EventCategory::Outputs]);

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(StudioEvent::RecordingStateChanged(true));
        });

        assert_eq!(
            subscription.next().await,
            Some(StudioEvent::RecordingStateChanged(true))
        );
    }
}
