//! Store change notifications.
//!
//! The store publishes a [`StoreEvent`] on every mutation and lifecycle
//! transition. Subscribers register either a callback ([`EventBus::observe`])
//! or take a channel ([`EventBus::subscribe`]). Delivery happens synchronously
//! inside `publish`, in registration order, so events reach every subscriber
//! in the same order the mutations happened.
//!
//! Callbacks run while the store is mid-mutation. They must be quick and must
//! not call back into the store.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Nodes,
    Layers,
    Mappings,
    /// Default data was written into an empty store.
    Seeded,
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// In-memory entities changed and should eventually be persisted.
    Changed(ChangeKind),
    /// A bulk load from external storage is starting; changes until
    /// `LoadingFinished` come from disk and must not be saved back.
    LoadingStarted,
    LoadingFinished,
    RootWillChange {
        from: Option<PathBuf>,
        to: Option<PathBuf>,
    },
    RootChanged(Option<PathBuf>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&StoreEvent) -> bool + Send>;

#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<Mutex<Vec<(SubscriptionId, Observer)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback invoked for every event until unsubscribed.
    pub fn observe<F>(&self, mut callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        self.register(Box::new(move |event| {
            callback(event);
            true
        }))
    }

    /// Returns a channel receiving every event. The subscription ends when
    /// the receiver is dropped.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.register(Box::new(move |event| tx.send(event.clone()).is_ok()));
        rx
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.observers.lock().retain(|(sid, _)| *sid != id);
    }

    pub fn publish(&self, event: StoreEvent) {
        tracing::trace!(?event, "publish");
        self.observers
            .lock()
            .retain_mut(|(_, observer)| observer(&event));
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.lock().len()
    }

    fn register(&self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
