//! # Sync Scheduler
//!
//! Turns the store's change stream into debounced saves.
//!
//! A single worker thread owns all persistence writes triggered by changes.
//! Every `Changed` event (re)arms one deadline `debounce` after the *latest*
//! change; when the deadline passes without further changes, the worker takes
//! a snapshot and saves it. A burst of edits therefore produces one save that
//! reflects the final state.
//!
//! ## Guarantees
//!
//! - **One save at a time.** Saves run on the worker itself. Changes that
//!   arrive while a save is in flight wait in the channel and re-arm the
//!   deadline once it completes.
//! - **No save-back of loads.** Between `LoadingStarted` and
//!   `LoadingFinished` changes are ignored and pending work is discarded.
//! - **Root switches.** `RootWillChange` cancels the deadline; the store then
//!   calls [`SyncScheduler::flush`] to write pending changes to the old root
//!   before the new one is read. A snapshot is never written to a root other
//!   than the one it was taken for.
//! - **Bounded flushes.** A flush that times out is abandoned: if its request
//!   is still queued when the worker reaches it, no save runs for it and the
//!   pending changes go back under the debounce timer. The caller never waits
//!   on a save it gave up on.
//!
//! Failed saves are not retried on a timer. The in-memory state stays
//! authoritative and the next change schedules a fresh attempt.

use crate::config::SyncConfig;
use crate::error::{Result, WordTaggerError};
use crate::events::{EventBus, StoreEvent, SubscriptionId};
use crate::model::Snapshot;
use crate::store::Persistence;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "reason")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub status: SyncStatus,
    pub is_syncing: bool,
    pub last_error: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            is_syncing: false,
            last_error: None,
            last_sync_time: None,
        }
    }
}

impl SyncState {
    pub fn begin(&mut self) {
        self.status = SyncStatus::Syncing;
        self.is_syncing = true;
    }

    /// Records the outcome of a save or load.
    pub fn finish<T>(&mut self, outcome: &Result<T>) {
        self.is_syncing = false;
        match outcome {
            Ok(_) => {
                self.status = SyncStatus::Success;
                self.last_error = None;
                self.last_sync_time = Some(Utc::now());
            }
            Err(e) => {
                self.status = SyncStatus::Failed(e.reason());
                self.last_error = Some(e.to_string());
            }
        }
    }
}

type SnapshotSource = Box<dyn Fn() -> Snapshot + Send>;

enum Input {
    Event(StoreEvent),
    /// Carries the flush generation current when it was sent.
    Flush(Sender<Result<()>>, u64),
    Shutdown,
}

pub struct SyncScheduler {
    tx: Sender<Input>,
    state: Arc<Mutex<SyncState>>,
    bus: EventBus,
    subscription: SubscriptionId,
    generation: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Starts the worker and subscribes it to `bus`.
    pub fn spawn<P, F>(
        gateway: Arc<Mutex<P>>,
        source: F,
        bus: &EventBus,
        config: SyncConfig,
        state: Arc<Mutex<SyncState>>,
    ) -> Result<Self>
    where
        P: Persistence + 'static,
        F: Fn() -> Snapshot + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        let events = tx.clone();
        let subscription = bus.observe(move |event| {
            let _ = events.send(Input::Event(event.clone()));
        });

        let generation = Arc::new(AtomicU64::new(0));
        let root = gateway.lock().current_root();
        let mut worker = Worker {
            root,
            generation: Arc::clone(&generation),
            gateway,
            source: Box::new(source),
            state: Arc::clone(&state),
            debounce: config.debounce,
            deadline: None,
            dirty: false,
            suspended: false,
        };
        let handle = std::thread::Builder::new()
            .name("wordtagger-sync".to_string())
            .spawn(move || worker.run(rx))?;

        Ok(Self {
            tx,
            state,
            bus: bus.clone(),
            subscription,
            generation,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> SyncState {
        self.state.lock().clone()
    }

    /// Saves pending changes now, waiting at most `timeout` for the outcome.
    ///
    /// On timeout the flush is abandoned and an error is returned. A save
    /// already running still completes; a flush request the worker has not
    /// reached yet is skipped and the changes wait for the debounce timer.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        let (reply, outcome) = mpsc::channel();
        let generation = self.generation.load(Ordering::SeqCst);
        if self.tx.send(Input::Flush(reply, generation)).is_err() {
            return Ok(());
        }
        match outcome.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("Flush did not finish within {:?}, abandoned", timeout);
                Err(WordTaggerError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "pending save did not finish in time",
                )))
            }
        }
    }

    /// Flushes pending changes and stops the worker.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.bus.unsubscribe(self.subscription);
        let _ = self.tx.send(Input::Shutdown);
        if handle.join().is_err() {
            tracing::error!("Sync worker panicked");
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker<P> {
    gateway: Arc<Mutex<P>>,
    source: SnapshotSource,
    state: Arc<Mutex<SyncState>>,
    debounce: Duration,
    /// Root the pending changes belong to.
    root: Option<PathBuf>,
    generation: Arc<AtomicU64>,
    deadline: Option<Instant>,
    dirty: bool,
    suspended: bool,
}

impl<P: Persistence> Worker<P> {
    fn run(&mut self, rx: mpsc::Receiver<Input>) {
        loop {
            let input = match self.deadline {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(wait)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match input {
                Ok(Input::Event(event)) => self.on_event(event),
                Ok(Input::Flush(reply, generation)) => {
                    if generation != self.generation.load(Ordering::SeqCst) {
                        tracing::debug!("Skipping abandoned flush");
                        if self.dirty && !self.suspended {
                            self.deadline = Some(Instant::now() + self.debounce);
                        }
                        continue;
                    }
                    self.deadline = None;
                    let _ = reply.send(self.save_pending());
                }
                Ok(Input::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    if let Err(e) = self.save_pending() {
                        tracing::error!("Final save failed: {}", e);
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.deadline = None;
                    if let Err(e) = self.save_pending() {
                        tracing::error!("Save failed: {}", e);
                    }
                }
            }
        }
        tracing::debug!("Sync worker stopped");
    }

    fn on_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Changed(kind) => {
                if self.suspended {
                    tracing::trace!(?kind, "Ignoring change during load");
                    return;
                }
                self.dirty = true;
                self.deadline = Some(Instant::now() + self.debounce);
                tracing::debug!(?kind, "Save armed in {:?}", self.debounce);
            }
            StoreEvent::LoadingStarted => {
                self.suspended = true;
                self.dirty = false;
                self.deadline = None;
            }
            StoreEvent::LoadingFinished => self.suspended = false,
            StoreEvent::RootWillChange { .. } => self.deadline = None,
            StoreEvent::RootChanged(root) => {
                if self.dirty {
                    tracing::warn!(
                        "Unsaved changes for {:?} were abandoned by the root switch",
                        self.root.as_ref().map(|p| p.display().to_string())
                    );
                }
                self.root = root;
                self.dirty = false;
                self.deadline = None;
            }
        }
    }

    fn save_pending(&mut self) -> Result<()> {
        if !self.dirty || self.suspended {
            return Ok(());
        }
        self.dirty = false;

        let mut gateway = self.gateway.lock();
        if gateway.current_root() != self.root {
            tracing::warn!(
                "Dropping save for {:?}: storage root changed",
                self.root.as_ref().map(|p| p.display().to_string())
            );
            return Ok(());
        }

        self.state.lock().begin();
        let snapshot = (self.source)();
        let outcome = gateway.save(&snapshot);
        drop(gateway);

        self.state.lock().finish(&outcome);
        match outcome {
            Ok(report) => {
                tracing::debug!("Synced to {}", report.root.display());
                Ok(())
            }
            Err(e) => {
                tracing::error!("Sync failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use crate::model::Node;
    use crate::store::mem_backend::{MemBackend, MemOp};
    use std::path::Path;
    use std::thread::sleep;

    const DEBOUNCE: Duration = Duration::from_millis(40);

    struct Harness {
        gateway: Arc<Mutex<MemBackend>>,
        nodes: Arc<Mutex<Vec<Node>>>,
        bus: EventBus,
        scheduler: SyncScheduler,
    }

    fn harness(backend: MemBackend) -> Harness {
        let mut backend = backend;
        backend.select_root(Path::new("/roots/a")).unwrap();
        let gateway = Arc::new(Mutex::new(backend));
        let nodes = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new();

        let source_nodes = Arc::clone(&nodes);
        let scheduler = SyncScheduler::spawn(
            Arc::clone(&gateway),
            move || Snapshot {
                nodes: source_nodes.lock().clone(),
                ..Snapshot::default()
            },
            &bus,
            SyncConfig {
                debounce: DEBOUNCE,
                flush_timeout: Duration::from_secs(1),
            },
            Arc::new(Mutex::new(SyncState::default())),
        )
        .unwrap();

        Harness {
            gateway,
            nodes,
            bus,
            scheduler,
        }
    }

    impl Harness {
        fn change(&self, text: &str) {
            self.nodes.lock().push(Node::new(text));
            self.bus.publish(StoreEvent::Changed(ChangeKind::Nodes));
        }
    }

    #[test]
    fn bursts_coalesce_into_one_save_of_the_final_state() {
        let h = harness(MemBackend::new());
        for i in 0..10 {
            h.change(&format!("word{i}"));
        }
        sleep(DEBOUNCE * 5);

        let gateway = h.gateway.lock();
        assert_eq!(gateway.save_count(), 1);
        assert_eq!(gateway.stored(Path::new("/roots/a")).unwrap().nodes.len(), 10);
        drop(gateway);
        assert_eq!(h.scheduler.state().status, SyncStatus::Success);
    }

    #[test]
    fn changes_during_load_are_not_saved() {
        let h = harness(MemBackend::new());
        h.bus.publish(StoreEvent::LoadingStarted);
        h.change("loaded");
        sleep(DEBOUNCE * 3);
        h.bus.publish(StoreEvent::LoadingFinished);
        sleep(DEBOUNCE * 3);
        assert_eq!(h.gateway.lock().save_count(), 0);

        h.change("edited");
        sleep(DEBOUNCE * 5);
        assert_eq!(h.gateway.lock().save_count(), 1);
    }

    #[test]
    fn change_during_save_is_queued_not_dropped() {
        let h = harness(MemBackend::new().with_save_delay(Duration::from_millis(150)));
        h.change("first");
        sleep(DEBOUNCE * 2);
        h.change("second");
        sleep(Duration::from_millis(500));

        let gateway = h.gateway.lock();
        let saves: Vec<&MemOp> = gateway
            .ops()
            .iter()
            .filter(|op| matches!(op, MemOp::Save { .. }))
            .collect();
        assert_eq!(saves.len(), 2);
        assert_eq!(
            saves[1],
            &MemOp::Save {
                root: PathBuf::from("/roots/a"),
                nodes: 2
            }
        );
    }

    #[test]
    fn flush_saves_immediately() {
        let h = harness(MemBackend::new());
        h.change("pending");
        h.scheduler.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(h.gateway.lock().save_count(), 1);

        // nothing left to write
        h.scheduler.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(h.gateway.lock().save_count(), 1);
    }

    #[test]
    fn failures_are_recorded_and_retried_on_next_change() {
        let h = harness(MemBackend::new());
        h.gateway.lock().set_simulate_write_error(true);
        h.change("lost?");
        let _ = h.scheduler.flush(Duration::from_secs(1));

        let state = h.scheduler.state();
        assert!(matches!(state.status, SyncStatus::Failed(_)));
        assert!(state.last_error.is_some());

        h.gateway.lock().set_simulate_write_error(false);
        h.change("retry");
        h.scheduler.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(h.gateway.lock().save_count(), 1);
        assert!(h.scheduler.state().last_error.is_none());
    }

    #[test]
    fn shutdown_flushes_pending_changes() {
        let mut h = harness(MemBackend::new());
        h.change("last words");
        h.scheduler.shutdown();
        assert_eq!(h.gateway.lock().save_count(), 1);
        assert_eq!(h.bus.subscriber_count(), 0);
    }

    #[test]
    fn timed_out_flush_is_abandoned_not_replayed() {
        let h = harness(MemBackend::new().with_save_delay(Duration::from_millis(300)));
        h.change("first");
        sleep(DEBOUNCE * 2);
        // "first" is being saved; this flush queues behind it
        h.change("second");
        let started = Instant::now();
        assert!(h.scheduler.flush(Duration::from_millis(50)).is_err());
        assert!(started.elapsed() < Duration::from_millis(250));

        // The gateway frees up after the in-flight save alone.
        let locked = Instant::now();
        drop(h.gateway.lock());
        assert!(locked.elapsed() < Duration::from_millis(300));

        // The skipped flush leaves "second" to the debounce timer.
        sleep(Duration::from_millis(800));
        let gateway = h.gateway.lock();
        assert_eq!(gateway.save_count(), 2);
        assert_eq!(gateway.stored(Path::new("/roots/a")).unwrap().nodes.len(), 2);
    }

    #[test]
    fn pending_snapshot_never_lands_on_another_root() {
        let h = harness(MemBackend::new());
        h.change("for a");
        h.gateway
            .lock()
            .select_root(Path::new("/roots/b"))
            .unwrap();
        h.scheduler.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(h.gateway.lock().save_count(), 0);
    }
}
