//! Fixed-key observable store with bitmask dirty tracking.
//!
//! A [`Store`] wraps a finite attribute map declared once at creation. Each
//! key owns a stable bit in a `u32` dirty mask, so a store observes at most
//! [`MAX_KEYS`] top-level keys — a load-bearing cap, not an incidental one.
//! Writes are intercepted, coalesced through the [`scheduler`](crate::scheduler),
//! and delivered to listeners in one flush pass per tick.
//!
//! # Listener registries
//!
//! Two registries per store: *direct* (key → ordered callbacks, fired with
//! the key's new value) and *nested* (key → remainder path → group). A
//! nested group shares one prebuilt [`Accessor`] and one last-observed-value
//! cache across every callback on that exact remainder, so the accessor runs
//! once per flush regardless of fan-out, and callbacks fire only when the
//! derived value actually changes.
//!
//! # Failure modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Too many keys | more than 32 declared | `StoreError::TooManyKeys` |
//! | Duplicate key | key declared twice | `StoreError::DuplicateKey` |
//! | Unknown key write | key not declared | `StoreError::UnknownKey` |
//! | Unreachable nested path | intermediate missing or scalar | `StoreError::PathUnreachable` |
//! | Watch on undeclared key | typo, dynamic source mismatch | inert subscription, never fires |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::path::{Accessor, split_path};
use crate::scheduler;

/// Maximum number of top-level observable keys per store.
///
/// One bit per key in the dirty mask. Widening this would change the
/// store's memory and flush characteristics; reject at creation instead.
pub const MAX_KEYS: usize = 32;

/// Shared listener callback. Stores clone the `Rc`, never the closure.
pub type Callback = Rc<dyn Fn(&Value)>;

/// Errors from store creation and writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// More than [`MAX_KEYS`] top-level keys were declared.
    TooManyKeys(usize),
    /// The same top-level key was declared twice.
    DuplicateKey(String),
    /// A write targeted a key outside the declared set.
    UnknownKey(String),
    /// A nested write could not reach its target through the current value.
    PathUnreachable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyKeys(n) => {
                write!(f, "store declares {n} keys; the dirty mask caps at {MAX_KEYS}")
            }
            Self::DuplicateKey(k) => write!(f, "duplicate top-level key '{k}'"),
            Self::UnknownKey(k) => write!(f, "unknown top-level key '{k}'"),
            Self::PathUnreachable(p) => write!(f, "nested path '{p}' is unreachable"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Anything a dynamic binding can subscribe to.
///
/// The store implements this; external named sources provide the same
/// contract with store-identical path semantics (dotless path = direct key,
/// dotted path = derived value under the first segment).
pub trait WatchSource {
    /// Subscribe `callback` to changes at `path`.
    fn watch(&self, path: &str, callback: Callback) -> Subscription;

    /// Read the current value at `path` without subscribing. An empty path
    /// reads the whole source.
    fn peek(&self, path: &str) -> Value;
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle for one registered listener.
///
/// `cancel()` removes the listener; a second `cancel()` (or a cancel racing
/// a drop) is a no-op. Dropping the handle cancels it, so holders keep
/// subscriptions alive by keeping the handle.
pub struct Subscription {
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    /// Wrap a cancellation action.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: RefCell::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription that was never registered and cancels to nothing.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            cancel: RefCell::new(None),
        }
    }

    /// Remove the listener. Idempotent.
    pub fn cancel(&self) {
        if let Some(cancel) = self.cancel.borrow_mut().take() {
            cancel();
        }
    }

    /// Whether the listener is still registered through this handle.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.borrow().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct ListenerEntry {
    id: u64,
    callback: Callback,
}

struct NestedGroup {
    accessor: Accessor,
    last_value: Value,
    listeners: Vec<ListenerEntry>,
}

struct StoreInner {
    keys: Vec<String>,
    index: FxHashMap<String, usize>,
    values: Vec<Value>,
    dirty: u32,
    queued: bool,
    next_listener: u64,
    direct: FxHashMap<usize, Vec<ListenerEntry>>,
    nested: FxHashMap<usize, FxHashMap<String, NestedGroup>>,
}

impl StoreInner {
    fn remove_direct(&mut self, key: usize, id: u64) {
        if let Some(entries) = self.direct.get_mut(&key) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                self.direct.remove(&key);
            }
        }
    }

    fn remove_nested(&mut self, key: usize, path: &str, id: u64) {
        if let Some(groups) = self.nested.get_mut(&key) {
            if let Some(group) = groups.get_mut(path) {
                group.listeners.retain(|e| e.id != id);
                if group.listeners.is_empty() {
                    groups.remove(path);
                }
            }
            if groups.is_empty() {
                self.nested.remove(&key);
            }
        }
    }
}

/// A proxy-style observable attribute map.
///
/// Cheap to clone (shared handle). All mutation and delivery is
/// single-threaded; writes schedule a coalesced flush via the global
/// scheduler rather than notifying synchronously.
#[derive(Clone)]
pub struct Store {
    inner: Rc<RefCell<StoreInner>>,
}

impl Store {
    /// Create a store over the given top-level keys and initial values.
    ///
    /// The key set is fixed for the store's lifetime; order determines bit
    /// positions in the dirty mask.
    pub fn new(
        initial: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Self, StoreError> {
        let mut keys = Vec::new();
        let mut index = FxHashMap::default();
        let mut values = Vec::new();
        for (key, value) in initial {
            if index.contains_key(&key) {
                return Err(StoreError::DuplicateKey(key));
            }
            index.insert(key.clone(), keys.len());
            keys.push(key);
            values.push(value);
        }
        if keys.len() > MAX_KEYS {
            return Err(StoreError::TooManyKeys(keys.len()));
        }
        Ok(Self {
            inner: Rc::new(RefCell::new(StoreInner {
                keys,
                index,
                values,
                dirty: 0,
                queued: false,
                next_listener: 0,
                direct: FxHashMap::default(),
                nested: FxHashMap::default(),
            })),
        })
    }

    /// The declared top-level keys, in bit order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().keys.clone()
    }

    /// Read the current value of a top-level key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        let idx = *inner.index.get(key)?;
        Some(inner.values[idx].clone())
    }

    /// The whole state as one object value, keyed by the declared keys.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let inner = self.inner.borrow();
        let mut map = serde_json::Map::new();
        for (i, key) in inner.keys.iter().enumerate() {
            map.insert(key.clone(), inner.values[i].clone());
        }
        Value::Object(map)
    }

    /// Write a top-level key.
    ///
    /// Writing the current value is a no-op: no dirty bit, no scheduling,
    /// no listener ever observes it.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.borrow_mut();
            let Some(&idx) = inner.index.get(key) else {
                return Err(StoreError::UnknownKey(key.to_owned()));
            };
            if inner.values[idx] == value {
                return Ok(());
            }
            inner.values[idx] = value;
            inner.dirty |= 1 << idx;
        }
        self.enqueue();
        Ok(())
    }

    /// Write through a dotted path under a declared top-level key.
    ///
    /// Unlike [`set`](Self::set), nested writes perform no equality check:
    /// every reachable nested write dirties the owning key and schedules a
    /// flush. The asymmetry is intentional and matches the top-level/nested
    /// split of the change-detection contract.
    ///
    /// Intermediate segments must already exist; the final segment may
    /// insert a new field on an object but only overwrite in-bounds array
    /// slots.
    pub fn set_path(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let parts = split_path(path);
        match parts.as_slice() {
            [] => return Err(StoreError::PathUnreachable(path.to_owned())),
            [key] => return self.set(key, value),
            _ => {}
        }
        {
            let mut inner = self.inner.borrow_mut();
            let Some(&idx) = inner.index.get(parts[0].as_str()) else {
                return Err(StoreError::UnknownKey(parts[0].clone()));
            };
            let unreachable = || StoreError::PathUnreachable(path.to_owned());
            let mut current = &mut inner.values[idx];
            for segment in &parts[1..parts.len() - 1] {
                current = match current {
                    Value::Object(map) => {
                        map.get_mut(segment.as_str()).ok_or_else(unreachable)?
                    }
                    Value::Array(items) => {
                        let i: usize =
                            segment.parse().map_err(|_| unreachable())?;
                        items.get_mut(i).ok_or_else(unreachable)?
                    }
                    _ => return Err(unreachable()),
                };
            }
            let last = &parts[parts.len() - 1];
            match current {
                Value::Object(map) => {
                    map.insert(last.clone(), value);
                }
                Value::Array(items) => {
                    let i: usize = last.parse().map_err(|_| unreachable())?;
                    *items.get_mut(i).ok_or_else(unreachable)? = value;
                }
                _ => return Err(unreachable()),
            }
            inner.dirty |= 1 << idx;
        }
        self.enqueue();
        Ok(())
    }

    /// Register `callback` at `path`.
    ///
    /// A dotless path is a direct listener on that key; a dotted path joins
    /// the nested group for the exact remainder string under the first
    /// segment. Watching an undeclared key yields an inert subscription.
    pub fn watch(&self, path: &str, callback: Callback) -> Subscription {
        let parts = split_path(path);
        let mut inner = self.inner.borrow_mut();
        let Some(&key_idx) = parts.first().and_then(|top| inner.index.get(top.as_str()))
        else {
            trace!(path, "watch on undeclared key; inert subscription");
            return Subscription::inert();
        };
        let id = inner.next_listener;
        inner.next_listener += 1;
        let weak = Rc::downgrade(&self.inner);
        if parts.len() > 1 {
            let remainder = parts[1..].join(".");
            let accessor = Accessor::new(parts[1..].iter().cloned().collect());
            let last_value = accessor.resolve(&inner.values[key_idx]);
            let group = inner
                .nested
                .entry(key_idx)
                .or_default()
                .entry(remainder.clone())
                .or_insert_with(|| NestedGroup {
                    accessor,
                    last_value,
                    listeners: Vec::new(),
                });
            group.listeners.push(ListenerEntry { id, callback });
            Subscription::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().remove_nested(key_idx, &remainder, id);
                }
            })
        } else {
            inner
                .direct
                .entry(key_idx)
                .or_default()
                .push(ListenerEntry { id, callback });
            Subscription::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().remove_direct(key_idx, id);
                }
            })
        }
    }

    /// Convenience wrapper over [`watch`](Self::watch) for plain closures.
    pub fn watch_fn(
        &self,
        path: &str,
        callback: impl Fn(&Value) + 'static,
    ) -> Subscription {
        self.watch(path, Rc::new(callback))
    }

    /// Remove the listener behind `subscription`. Idempotent.
    pub fn unwatch(&self, subscription: &Subscription) {
        subscription.cancel();
    }

    /// Total registered listeners across both registries. Used by teardown
    /// leak checks.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.borrow();
        let direct: usize = inner.direct.values().map(Vec::len).sum();
        let nested: usize = inner
            .nested
            .values()
            .flat_map(|groups| groups.values())
            .map(|g| g.listeners.len())
            .sum();
        direct + nested
    }

    fn enqueue(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.dirty == 0 || inner.queued {
                return;
            }
            inner.queued = true;
        }
        scheduler::schedule(self.clone());
    }

    pub(crate) fn clear_queued(&self) {
        self.inner.borrow_mut().queued = false;
    }

    /// Deliver all accumulated change notifications in one pass.
    ///
    /// The dirty mask is snapshotted and cleared before any listener runs;
    /// writes performed inside listeners accumulate into the fresh mask and
    /// reach a later flush, never this one.
    pub(crate) fn flush(&self) {
        let mut pending: Vec<(Callback, Value)> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            let mask = inner.dirty;
            if mask == 0 {
                return;
            }
            inner.dirty = 0;
            debug!(mask = format_args!("{mask:#010b}"), "store flush");
            let mut bits = mask;
            while bits != 0 {
                let idx = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                let value = inner.values[idx].clone();
                if let Some(entries) = inner.direct.get(&idx) {
                    for entry in entries {
                        pending.push((Rc::clone(&entry.callback), value.clone()));
                    }
                }
                if let Some(groups) = inner.nested.get_mut(&idx) {
                    for group in groups.values_mut() {
                        let derived = group.accessor.resolve(&value);
                        let changed = derived != group.last_value;
                        group.last_value = derived.clone();
                        if changed {
                            for entry in &group.listeners {
                                pending.push((Rc::clone(&entry.callback), derived.clone()));
                            }
                        }
                    }
                }
            }
        }
        // Borrow released: listeners may freely read and write the store.
        for (callback, value) in pending {
            callback(&value);
        }
    }
}

impl WatchSource for Store {
    fn watch(&self, path: &str, callback: Callback) -> Subscription {
        Store::watch(self, path, callback)
    }

    fn peek(&self, path: &str) -> Value {
        if path.is_empty() {
            return self.snapshot();
        }
        let parts = split_path(path);
        let inner = self.inner.borrow();
        let Some(&idx) = parts.first().and_then(|top| inner.index.get(top.as_str()))
        else {
            return Value::Null;
        };
        Accessor::new(parts[1..].iter().cloned().collect()).resolve(&inner.values[idx])
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Store")
            .field("keys", &inner.keys)
            .field("dirty", &inner.dirty)
            .field("queued", &inner.queued)
            .finish()
    }
}
