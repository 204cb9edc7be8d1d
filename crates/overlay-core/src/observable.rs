//! Observable values with change callbacks.

use parking_lot::Mutex;

/// Change callback function type.
pub type ChangeCallback<T> = Box<dyn FnMut(&T) + Send>;

struct Cell<T> {
    value: T,
    /// Highest version accepted by [`Observable::publish`].
    version: u64,
    /// Bumped on every stored change.
    changes: u64,
    /// `changes` as of the last delivery to subscribers.
    delivered: u64,
}

/// A value that notifies subscribers whenever it changes.
///
/// Callbacks run with no lock held, so a callback may read the value, subscribe, or set the
/// value again. Deliveries are serialized: one thread at a time runs the callbacks, always with
/// the latest value, and keeps going until no newer change is pending. Changes made while a
/// delivery is running may therefore be coalesced. Setting an equal value does not notify.
pub struct Observable<T> {
    cell: Mutex<Cell<T>>,
    callbacks: Mutex<Vec<ChangeCallback<T>>>,
    subscribed: Mutex<Vec<ChangeCallback<T>>>,
}

impl<T: Clone + PartialEq> Observable<T> {
    /// Create an observable holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            cell: Mutex::new(Cell {
                value,
                version: 0,
                changes: 0,
                delivered: 0,
            }),
            callbacks: Mutex::new(Vec::new()),
            subscribed: Mutex::new(Vec::new()),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.cell.lock().value.clone()
    }

    /// Store `value`, notifying subscribers when it differs from the current one.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        self.store(None, value)
    }

    /// Store `value` computed at `version`, unless a newer version was already published.
    ///
    /// Versions must be monotonic in the state the value was derived from; a publication that
    /// lost a race against a newer one is dropped. Returns whether the value changed.
    pub fn publish(&self, version: u64, value: T) -> bool {
        self.store(Some(version), value)
    }

    /// Register a change callback.
    ///
    /// The callback sees changes stored after this call returns.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.subscribed.lock().push(Box::new(callback));
    }

    fn store(&self, version: Option<u64>, value: T) -> bool {
        {
            let mut cell = self.cell.lock();
            if let Some(version) = version {
                if version < cell.version {
                    return false;
                }
                cell.version = version;
            }
            if cell.value == value {
                return false;
            }
            cell.value = value;
            cell.changes += 1;
        }
        self.notify_callbacks();
        true
    }

    // Whoever holds `callbacks` delivers. A caller that cannot take it (another thread, or a
    // callback re-entering on this one) leaves its change to the current holder, which rechecks
    // for pending changes before and after releasing the lock.
    fn notify_callbacks(&self) {
        loop {
            let Some(mut callbacks) = self.callbacks.try_lock() else {
                return;
            };
            loop {
                callbacks.append(&mut self.subscribed.lock());
                let value = {
                    let mut cell = self.cell.lock();
                    if cell.delivered == cell.changes {
                        break;
                    }
                    cell.delivered = cell.changes;
                    cell.value.clone()
                };
                for callback in callbacks.iter_mut() {
                    callback(&value);
                }
            }
            drop(callbacks);
            let cell = self.cell.lock();
            if cell.delivered == cell.changes {
                return;
            }
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = self.cell.lock();
        let callbacks = self.callbacks.try_lock().map_or(0, |c| c.len());
        f.debug_struct("Observable")
            .field("value", &cell.value)
            .field("version", &cell.version)
            .field("callbacks", &(callbacks + self.subscribed.lock().len()))
            .finish()
    }
}
