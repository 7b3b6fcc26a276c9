//! Listener registry for changer notifications.
//!
//! Entry points publish their events while still holding the state lock,
//! so the pending queue is in mutation order. Listeners are called after
//! the state lock is released, in registration order, by whichever thread
//! is draining the queue. A listener may call back into the changer; its
//! events are queued behind the ones being delivered.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use atc_common::changer::event::AtcEvent;
use parking_lot::{Mutex, RwLock};

/// Receiver of changer notifications (display layer, logger, test recorder).
pub trait AtcListener: Send + Sync {
    fn on_event(&self, event: &AtcEvent);
}

impl<F> AtcListener for F
where
    F: Fn(&AtcEvent) + Send + Sync,
{
    fn on_event(&self, event: &AtcEvent) {
        self(event)
    }
}

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

type Entry = (ListenerId, Arc<dyn AtcListener>);

#[derive(Default)]
struct Pending {
    events: Vec<AtcEvent>,
    draining: bool,
}

/// Resets the drain flag if a listener panics mid-delivery.
struct DrainGuard<'a>(&'a Mutex<Pending>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}

/// Ordered set of listeners plus the queue of undelivered events.
#[derive(Default)]
pub struct Notifier {
    listeners: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
    pending: Mutex<Pending>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.len())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl AtcListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(entry, _)| *entry != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `events` behind everything published before them.
    pub fn publish(&self, events: Vec<AtcEvent>) {
        if events.is_empty() {
            return;
        }
        self.pending.lock().events.extend(events);
    }

    /// Deliver queued events until the queue is empty.
    ///
    /// Only one thread drains at a time. A caller that finds a drain in
    /// progress returns at once and the draining thread delivers its
    /// events, so listeners always see them in publish order.
    pub fn flush(&self) {
        {
            let mut pending = self.pending.lock();
            if pending.draining || pending.events.is_empty() {
                return;
            }
            pending.draining = true;
        }
        let _guard = DrainGuard(&self.pending);
        loop {
            let batch = {
                let mut pending = self.pending.lock();
                if pending.events.is_empty() {
                    pending.draining = false;
                    return;
                }
                std::mem::take(&mut pending.events)
            };
            self.dispatch(&batch);
        }
    }

    /// Deliver `events` to every listener registered at call time.
    pub fn dispatch(&self, events: &[AtcEvent]) {
        if events.is_empty() {
            return;
        }
        // Snapshot so listeners can subscribe/unsubscribe re-entrantly.
        let listeners: Vec<Arc<dyn AtcListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for event in events {
            for listener in &listeners {
                listener.on_event(event);
            }
        }
    }
}
