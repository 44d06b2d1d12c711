use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

pub use serde_json::Value;

/// Store key holding the full grid as an array-of-arrays of integers.
pub const BOARD_KEY: &str = "board";
/// Store key holding the pending tile value as a scalar.
pub const NEXT_TILE_KEY: &str = "next-tile";

/// Durable home for the store's contents. The whole map is written as one
/// JSON snapshot on every change, last writer wins.
pub trait StorageBackend {
    fn load(&mut self) -> Option<String>;
    fn save(&mut self, snapshot: &str);
}

type Listener = Rc<dyn Fn(&Value, Option<&Value>)>;

#[derive(Default)]
struct StoreInner {
    entries: BTreeMap<String, Value>,
    listeners: BTreeMap<String, Vec<(u64, Listener)>>,
    next_listener_id: u64,
    backend: Option<Box<dyn StorageBackend>>,
}

impl StoreInner {
    fn save_to_backend(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        match serde_json::to_string(&self.entries) {
            Ok(snapshot) => backend.save(&snapshot),
            Err(err) => log::error!("failed to encode store snapshot: {err}"),
        }
    }
}

/// Shared key/value store with synchronous change notification. Handles
/// are cheap clones of one underlying store; collaborators receive one
/// explicitly instead of reaching for a global.
///
/// Single-threaded by design, like the engine it serves.
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the map from `backend` and persists every future change
    /// to it. An unreadable snapshot is discarded with a warning; the
    /// board snapshot itself is still validated strictly on engine load.
    pub fn with_backend(mut backend: Box<dyn StorageBackend>) -> Self {
        let entries = match backend.load() {
            None => BTreeMap::new(),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    log::warn!("discarding unreadable store snapshot: {err}");
                    BTreeMap::new()
                }
            },
        };
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                entries,
                backend: Some(backend),
                ..Default::default()
            })),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.borrow().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().entries.contains_key(key)
    }

    /// Sets `key`, persists, then notifies that key's subscribers with
    /// `(new, previous)`. Notification runs with the interior borrow
    /// released, so a listener may call back into the store.
    pub fn set(&self, key: &str, value: Value) {
        let (prev, to_notify) = {
            let mut inner = self.inner.borrow_mut();
            let prev = inner.entries.insert(key.to_string(), value.clone());
            inner.save_to_backend();
            let to_notify: Vec<Listener> = inner
                .listeners
                .get(key)
                .map(|listeners| listeners.iter().map(|(_, cb)| Rc::clone(cb)).collect())
                .unwrap_or_default();
            (prev, to_notify)
        };
        for listener in to_notify {
            listener(&value, prev.as_ref());
        }
    }

    /// Removes `key` along with its subscribers.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.borrow_mut();
        let prev = inner.entries.remove(key);
        inner.listeners.remove(key);
        if prev.is_some() {
            inner.save_to_backend();
        }
        prev
    }

    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.entries.clear();
        inner.listeners.clear();
        inner.save_to_backend();
    }

    /// Registers `callback` for changes to `key`. The returned
    /// [`Subscription`] is the capability to cancel: dropping it (or
    /// calling [`Subscription::cancel`]) unregisters the callback.
    pub fn subscribe(
        &self,
        key: &str,
        callback: impl Fn(&Value, Option<&Value>) + 'static,
    ) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner
            .listeners
            .entry(key.to_string())
            .or_default()
            .push((id, Rc::new(callback)));
        Subscription {
            store: Rc::downgrade(&self.inner),
            key: key.to_string(),
            id,
        }
    }

    /// Weak handle for use inside listeners, to avoid a reference cycle
    /// through the listener table.
    pub fn downgrade(&self) -> WeakStateStore {
        WeakStateStore {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

#[derive(Clone)]
pub struct WeakStateStore {
    inner: Weak<RefCell<StoreInner>>,
}

impl WeakStateStore {
    pub fn upgrade(&self) -> Option<StateStore> {
        self.inner.upgrade().map(|inner| StateStore { inner })
    }
}

/// RAII subscription handle; hold it for as long as the callback should
/// keep firing.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    store: Weak<RefCell<StoreInner>>,
    key: String,
    id: u64,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let mut inner = inner.borrow_mut();
        if let Some(listeners) = inner.listeners.get_mut(&self.key) {
            listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
