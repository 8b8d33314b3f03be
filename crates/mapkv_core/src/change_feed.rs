//! Change notification.
//!
//! Every successful put, remove and clear produces a [`ChangeEvent`]. Events
//! are queued and delivered on a dedicated thread, in commit order, to:
//!
//! - registered [`ChangeListener`]s,
//! - channel subscribers from [`Store::subscribe`](crate::Store::subscribe).
//!
//! Delivery happens after the write is visible to `get`, so a listener can
//! read the new value from the store it is handed.
//!
//! ```rust,ignore
//! let rx = store.subscribe();
//! store.put_int("count", 1)?;
//! assert_eq!(rx.recv()?.key.as_deref(), Some("count"));
//! ```

use crate::error::CoreResult;
use crate::Store;
use parking_lot::{Mutex, RwLock};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// Receives change notifications of a store.
pub trait ChangeListener: Send + Sync {
    /// Called after `key` changed; `None` means the store was cleared.
    fn on_change(&self, store: &Store, key: Option<&str>);
}

impl<F> ChangeListener for F
where
    F: Fn(&Store, Option<&str>) + Send + Sync,
{
    fn on_change(&self, store: &Store, key: Option<&str>) {
        self(store, key);
    }
}

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Written through this store handle.
    Local,
    /// Written by another process and picked up from the file.
    External,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Header sequence after the change.
    pub sequence: u64,
    /// Changed key, `None` for clear.
    pub key: Option<String>,
    /// Where the change came from.
    pub origin: ChangeOrigin,
}

impl ChangeEvent {
    /// Creates an event for a local write.
    #[must_use]
    pub fn local(sequence: u64, key: Option<String>) -> Self {
        Self {
            sequence,
            key,
            origin: ChangeOrigin::Local,
        }
    }

    /// Creates an event for a change made by another process.
    #[must_use]
    pub fn external(sequence: u64, key: Option<String>) -> Self {
        Self {
            sequence,
            key,
            origin: ChangeOrigin::External,
        }
    }
}

/// Listener registry plus the dispatch queue.
pub(crate) struct ChangeFeed {
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    queue: Mutex<Option<Sender<ChangeEvent>>>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            queue: Mutex::new(None),
        }
    }

    /// Starts the dispatch thread. `deliver` runs for every event and
    /// returns `false` once nothing can receive events any more.
    pub(crate) fn start<D>(&self, deliver: D) -> CoreResult<()>
    where
        D: Fn(ChangeEvent) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<ChangeEvent>();
        thread::Builder::new()
            .name("mapkv-notify".to_string())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    if !deliver(event) {
                        break;
                    }
                }
            })?;
        *self.queue.lock() = Some(tx);
        Ok(())
    }

    /// Stops accepting events; queued ones are still delivered.
    pub(crate) fn stop(&self) {
        self.queue.lock().take();
    }

    /// Returns `true` if anyone would receive an event.
    pub(crate) fn has_observers(&self) -> bool {
        !self.listeners.read().is_empty() || !self.subscribers.read().is_empty()
    }

    /// Queues events for delivery.
    pub(crate) fn emit(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        if !self.has_observers() {
            return;
        }
        if let Some(tx) = self.queue.lock().as_ref() {
            for event in events {
                // The dispatcher only exits after the queue sender is gone
                let _ = tx.send(event);
            }
        }
    }

    /// Delivers one event. Runs on the dispatch thread.
    pub(crate) fn deliver(&self, store: &Store, event: &ChangeEvent) {
        // Listeners may (un)register from inside the callback
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_change(store, event.key.as_deref());
        }
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn register(&self, listener: Arc<dyn ChangeListener>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub(crate) fn unregister(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub(crate) fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("listeners", &self.listeners.read().len())
            .field("subscribers", &self.subscribers.read().len())
            .field("running", &self.queue.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Noop;

    impl ChangeListener for Noop {
        fn on_change(&self, _: &Store, _: Option<&str>) {}
    }

    #[test]
    fn emit_without_observers_is_dropped() {
        let feed = ChangeFeed::new();
        let (seen_tx, seen_rx) = mpsc::channel();
        feed.start(move |e| seen_tx.send(e).is_ok()).unwrap();

        feed.emit([ChangeEvent::local(1, Some("a".into()))]);
        assert!(seen_rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn events_reach_dispatcher_in_order() {
        let feed = ChangeFeed::new();
        let _rx = feed.subscribe();
        let (seen_tx, seen_rx) = mpsc::channel();
        feed.start(move |e| seen_tx.send(e).is_ok()).unwrap();

        feed.emit((1..=3).map(|i| ChangeEvent::local(i, Some(format!("k{i}")))));
        feed.emit([ChangeEvent::external(4, None)]);

        let got: Vec<ChangeEvent> = (0..4)
            .map(|_| seen_rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(got[0].key.as_deref(), Some("k1"));
        assert_eq!(got[2].sequence, 3);
        assert_eq!(got[3].origin, ChangeOrigin::External);
        assert_eq!(got[3].key, None);
    }

    #[test]
    fn stopped_feed_queues_nothing() {
        let feed = ChangeFeed::new();
        let _rx = feed.subscribe();
        let (seen_tx, seen_rx) = mpsc::channel();
        feed.start(move |e| seen_tx.send(e).is_ok()).unwrap();
        feed.stop();

        feed.emit([ChangeEvent::local(1, None)]);
        assert!(seen_rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn register_is_idempotent() {
        let feed = ChangeFeed::new();
        let listener: Arc<dyn ChangeListener> = Arc::new(Noop);
        feed.register(Arc::clone(&listener));
        feed.register(Arc::clone(&listener));
        assert_eq!(feed.listener_count(), 1);
        assert!(feed.has_observers());

        assert!(feed.unregister(&listener));
        assert!(!feed.unregister(&listener));
        assert_eq!(feed.listener_count(), 0);
    }
}
