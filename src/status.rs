//! Observable boolean status.
//!
//! A [`StatusCell`] holds one boolean and an explicit list of synchronous
//! observers. Every write notifies every observer, even when the value did
//! not change. Observers are invoked outside the cell's lock, so an observer
//! may subscribe, unsubscribe or write back into the cell.
//!
//! Async consumers that only need the latest value can use [`StatusCell::watch`],
//! a `tokio::sync::watch` mirror of the same value.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Observer = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct ObserverList {
    next_id: u64,
    entries: Vec<(u64, Observer)>,
}

/// An observable boolean with an explicit observer list.
pub struct StatusCell {
    value: watch::Sender<bool>,
    observers: Mutex<ObserverList>,
}

impl StatusCell {
    pub fn new(initial: bool) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            value,
            observers: Mutex::new(ObserverList::default()),
        }
    }

    /// Current value.
    pub fn get(&self) -> bool {
        *self.value.borrow()
    }

    /// Write a value and notify every observer.
    pub fn set(&self, value: bool) {
        self.replace(value).fire();
    }

    /// Write a value and capture the observers to notify, without notifying.
    ///
    /// Lets a caller make the write under its own lock and fire after
    /// releasing it.
    pub(crate) fn replace(&self, value: bool) -> Notification {
        self.value.send_replace(value);
        let observers = lock(&self.observers)
            .entries
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        Notification { value, observers }
    }

    /// Register an observer called on every subsequent write.
    ///
    /// The observer is not called with the current value. It stays
    /// registered until the returned [`Subscription`] is dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        observer: impl Fn(bool) + Send + Sync + 'static,
    ) -> Subscription {
        let mut list = lock(&self.observers);
        let id = list.next_id;
        list.next_id += 1;
        list.entries.push((id, Arc::new(observer)));
        Subscription {
            cell: Arc::downgrade(self),
            id,
        }
    }

    /// Receiver tracking the latest value.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.value.subscribe()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        lock(&self.observers).entries.len()
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.observers)
            .entries
            .retain(|(entry_id, _)| *entry_id != id);
    }
}

impl std::fmt::Debug for StatusCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCell")
            .field("value", &self.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// A pending notification produced by [`StatusCell::replace`].
#[must_use = "observers are only notified when the notification is fired"]
pub(crate) struct Notification {
    value: bool,
    observers: Vec<Observer>,
}

impl Notification {
    pub(crate) fn fire(self) {
        for observer in self.observers {
            observer(self.value);
        }
    }
}

/// Registration handle returned by [`StatusCell::subscribe`].
///
/// Dropping it removes the observer. It does not keep the cell alive.
#[derive(Debug)]
pub struct Subscription {
    cell: Weak<StatusCell>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.upgrade() {
            cell.unsubscribe(self.id);
        }
    }
}
