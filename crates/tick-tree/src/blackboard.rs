//! Hierarchical key/value memory shared by the nodes of a tree.
//!
//! A [`Blackboard`] maps string keys to opaque values. Blackboards form a
//! chain through their parent: reads fall back to the nearest ancestor that
//! holds a key, and writes go to the ancestor that already owns it, so a key
//! is never shadowed further down the chain.
//!
//! # Notifications
//!
//! Every change queues a [`ChangeKind`] notification. Listeners are not called
//! from `set`/`remove`; instead a one-shot scheduler timer flushes the queue on
//! the next timer pass. Listener registration during a flush is buffered the
//! same way the scheduler buffers tree registration.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::registry::DeferredSet;
use crate::scheduler::{Scheduler, WeakScheduler};
use crate::timer::{Repeat, TimerKey};

/// A stored blackboard value.
pub type Value = Rc<dyn Any>;

/// The kind of change a listener is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type ListenerFn = Rc<dyn Fn(ChangeKind, Option<&Value>)>;

/// A change callback. Clones share one identity, so the same listener can be
/// registered once per key and unregistered later.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    callback: ListenerFn,
}

impl Listener {
    pub fn new(callback: impl Fn(ChangeKind, Option<&Value>) + 'static) -> Self {
        Self {
            id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
            callback: Rc::new(callback),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.id).finish()
    }
}

struct Notification {
    key: String,
    kind: ChangeKind,
    value: Option<Value>,
}

type ListenerKey = (String, ListenerId);

struct BlackboardState {
    name: String,
    parent: Option<Blackboard>,
    data: HashMap<String, Value>,
    listeners: DeferredSet<ListenerKey, Listener>,
    notifications: Vec<Notification>,
    scheduler: WeakScheduler,
    flush_key: TimerKey,
}

/// Shared handle to a blackboard. Clones refer to the same store.
#[derive(Clone)]
pub struct Blackboard {
    inner: Rc<RefCell<BlackboardState>>,
}

impl Blackboard {
    pub fn new(scheduler: &Scheduler) -> Self {
        Self::named("Blackboard", scheduler)
    }

    pub fn named(name: impl Into<String>, scheduler: &Scheduler) -> Self {
        Self::build(name.into(), None, scheduler.downgrade())
    }

    /// Creates a blackboard whose parent is `self`, on the same scheduler.
    pub fn child(&self, name: impl Into<String>) -> Blackboard {
        let scheduler = self.inner.borrow().scheduler.clone();
        Self::build(name.into(), Some(self.clone()), scheduler)
    }

    fn build(name: String, parent: Option<Blackboard>, scheduler: WeakScheduler) -> Self {
        let state = BlackboardState {
            name,
            parent,
            data: HashMap::new(),
            listeners: DeferredSet::new(),
            notifications: Vec::new(),
            scheduler,
            flush_key: TimerKey::next(),
        };
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub fn parent(&self) -> Option<Blackboard> {
        self.inner.borrow().parent.clone()
    }

    /// Replaces the parent. Returns `false`, leaving the parent unchanged, if
    /// `self` is `parent` or one of its ancestors.
    pub fn set_parent(&self, parent: Option<Blackboard>) -> bool {
        let mut cursor = parent.clone();
        while let Some(board) = cursor {
            if board.ptr_eq(self) {
                tracing::error!(
                    blackboard = %self.name(),
                    "refusing parent that would form a cycle"
                );
                return false;
            }
            cursor = board.parent();
        }
        self.inner.borrow_mut().parent = parent;
        true
    }

    /// Whether both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Blackboard) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Looks `key` up here, then along the parent chain.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let state = self.inner.borrow();
        match state.data.get(key) {
            Some(value) => Some(Rc::clone(value)),
            None => state.parent.as_ref().and_then(|parent| parent.get_value(key)),
        }
    }

    /// Typed read. `None` if the key is missing or holds another type.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.get_value(key)?.downcast_ref::<T>().cloned()
    }

    pub fn has_key(&self, key: &str) -> bool {
        let state = self.inner.borrow();
        state.data.contains_key(key)
            || state.parent.as_ref().is_some_and(|parent| parent.has_key(key))
    }

    pub fn set<T: Any>(&self, key: &str, value: T) {
        self.set_value(key, Rc::new(value));
    }

    /// Writes `key`, delegating to the nearest ancestor that already owns it.
    ///
    /// Otherwise the key is added or updated here and an `Add` or `Update`
    /// notification carrying `value` is queued.
    pub fn set_value(&self, key: &str, value: Value) {
        if let Some(owner) = self.parent().filter(|parent| parent.has_key(key)) {
            owner.set_value(key, value);
            return;
        }

        {
            let mut state = self.inner.borrow_mut();
            let kind = if state.data.contains_key(key) {
                ChangeKind::Update
            } else {
                ChangeKind::Add
            };
            state.data.insert(key.to_owned(), Rc::clone(&value));
            state.notifications.push(Notification {
                key: key.to_owned(),
                kind,
                value: Some(value),
            });
        }
        self.schedule_flush();
    }

    /// Removes a key stored on this blackboard. Ancestors are not touched.
    pub fn remove(&self, key: &str) -> bool {
        {
            let mut state = self.inner.borrow_mut();
            if state.data.remove(key).is_none() {
                return false;
            }
            state.notifications.push(Notification {
                key: key.to_owned(),
                kind: ChangeKind::Remove,
                value: None,
            });
        }
        self.schedule_flush();
        true
    }

    /// Subscribes `listener` to changes of `key`. Registering the same
    /// listener twice for one key changes nothing.
    pub fn register_listener(&self, key: &str, listener: &Listener) {
        let mut state = self.inner.borrow_mut();
        if state
            .listeners
            .insert((key.to_owned(), listener.id), listener.clone())
            .is_err()
        {
            tracing::trace!(key, listener = ?listener.id, "listener already registered");
        }
    }

    /// Returns `false` if `listener` was not registered for `key`.
    pub fn unregister_listener(&self, key: &str, listener: &Listener) -> bool {
        self.inner
            .borrow_mut()
            .listeners
            .remove(&(key.to_owned(), listener.id))
            .is_ok()
    }

    pub fn is_listener_registered(&self, key: &str, listener: &Listener) -> bool {
        self.inner
            .borrow()
            .listeners
            .contains(&(key.to_owned(), listener.id))
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .keys()
            .filter(|(k, _)| k == key)
            .count()
    }

    pub fn has_listener(&self, key: &str) -> bool {
        self.listener_count(key) > 0
    }

    /// Number of notifications waiting for the next flush.
    pub fn pending_notifications(&self) -> usize {
        self.inner.borrow().notifications.len()
    }

    /// Drops the scheduled flush. Queued notifications stay queued until the
    /// next change or an explicit [`flush`](Self::flush).
    pub fn disable(&self) {
        let state = self.inner.borrow();
        if let Some(scheduler) = state.scheduler.upgrade()
            && scheduler.has_timer(state.flush_key)
        {
            let _ = scheduler.unregister_timer(state.flush_key);
        }
    }

    fn schedule_flush(&self) {
        let (scheduler, key) = {
            let state = self.inner.borrow();
            (state.scheduler.upgrade(), state.flush_key)
        };
        let Some(scheduler) = scheduler else {
            tracing::warn!(blackboard = %self.name(), "no scheduler; notifications wait for flush()");
            return;
        };
        let weak: Weak<RefCell<BlackboardState>> = Rc::downgrade(&self.inner);
        scheduler.register_timer(key, 0.0, 0.0, Repeat::ONCE, move || {
            if let Some(inner) = weak.upgrade() {
                Blackboard { inner }.flush();
            }
        });
    }

    /// Delivers every queued notification to the listeners of its key.
    ///
    /// Normally run by the scheduled flush timer. Notifications queued by the
    /// listeners themselves are delivered by the following flush.
    pub fn flush(&self) {
        let (notifications, listeners) = {
            let mut state = self.inner.borrow_mut();
            if state.listeners.is_iterating() {
                tracing::warn!(blackboard = %state.name, "flush re-entered; ignoring");
                return;
            }
            let notifications = std::mem::take(&mut state.notifications);
            state.listeners.begin_pass();
            let listeners: Vec<(ListenerKey, Listener)> = state
                .listeners
                .iter()
                .map(|(key, listener)| (key.clone(), listener.clone()))
                .collect();
            (notifications, listeners)
        };
        tracing::trace!(count = notifications.len(), "flushing blackboard notifications");

        for notification in &notifications {
            for (key, listener) in &listeners {
                if key.0 != notification.key {
                    continue;
                }
                if self.inner.borrow().listeners.is_pending_removal(key) {
                    continue;
                }
                (listener.callback)(notification.kind, notification.value.as_ref());
            }
        }

        let requeue = {
            let mut state = self.inner.borrow_mut();
            state.listeners.end_pass();
            !state.notifications.is_empty()
        };
        if requeue {
            self.schedule_flush();
        }
    }
}

impl fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Blackboard")
            .field("name", &state.name)
            .field("keys", &state.data.len())
            .field("pending", &state.notifications.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<(ChangeKind, Option<i32>)>>>, Listener) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let listener = Listener::new(move |kind, value| {
            let value = value.and_then(|v| v.downcast_ref::<i32>()).copied();
            sink.borrow_mut().push((kind, value));
        });
        (seen, listener)
    }

    #[test]
    fn reads_fall_back_to_parent() {
        let scheduler = Scheduler::new();
        let root = Blackboard::new(&scheduler);
        let child = root.child("Child");
        root.set("hp", 10_i32);

        assert_eq!(child.get::<i32>("hp"), Some(10));
        assert!(child.has_key("hp"));
        assert_eq!(child.get::<String>("hp"), None);
        assert_eq!(child.get::<i32>("mana"), None);
    }

    #[test]
    fn parent_cycles_are_refused() {
        let scheduler = Scheduler::new();
        let root = Blackboard::new(&scheduler);
        let child = root.child("Child");
        let grandchild = child.child("Grandchild");

        assert!(!root.set_parent(Some(root.clone())));
        assert!(!root.set_parent(Some(grandchild.clone())));
        assert!(root.parent().is_none());
        assert!(!grandchild.has_key("missing"));

        let other = Blackboard::named("Other", &scheduler);
        assert!(grandchild.set_parent(Some(other.clone())));
        assert!(grandchild.parent().is_some_and(|parent| parent.ptr_eq(&other)));
        assert!(grandchild.set_parent(None));
    }

    #[test]
    fn writes_go_to_owning_ancestor() {
        let scheduler = Scheduler::new();
        let root = Blackboard::new(&scheduler);
        let child = root.child("Child");
        root.set("hp", 10_i32);
        child.set("hp", 5_i32);
        child.set("local", 1_i32);

        assert_eq!(root.get::<i32>("hp"), Some(5));
        assert!(!root.has_key("local"));

        // Remove is local only
        assert!(!child.remove("hp"));
        assert_eq!(child.get::<i32>("hp"), Some(5));
        assert!(child.remove("local"));
    }

    #[test]
    fn notifications_wait_for_the_flush_timer() {
        let scheduler = Scheduler::new();
        let board = Blackboard::new(&scheduler);
        let (seen, listener) = recorder();
        board.register_listener("k", &listener);
        board.register_listener("k", &listener);
        assert_eq!(board.listener_count("k"), 1);

        board.set("k", 1_i32);
        board.set("k", 2_i32);
        board.remove("k");
        assert!(seen.borrow().is_empty());
        assert_eq!(board.pending_notifications(), 3);

        scheduler.tick(0.016);
        assert_eq!(
            *seen.borrow(),
            vec![
                (ChangeKind::Add, Some(1)),
                (ChangeKind::Update, Some(2)),
                (ChangeKind::Remove, None),
            ]
        );
        assert_eq!(board.pending_notifications(), 0);
        assert!(!scheduler.has_timer(board.inner.borrow().flush_key));
    }

    #[test]
    fn listener_registered_during_flush_waits_for_next_flush() {
        let scheduler = Scheduler::new();
        let board = Blackboard::new(&scheduler);
        let (late_seen, late) = recorder();

        let handle = board.clone();
        let registrar = Listener::new(move |_, _| handle.register_listener("k", &late));
        board.register_listener("k", &registrar);

        board.set("k", 1_i32);
        board.flush();
        assert!(late_seen.borrow().is_empty());
        assert_eq!(board.listener_count("k"), 2);

        board.set("k", 2_i32);
        board.flush();
        assert_eq!(*late_seen.borrow(), vec![(ChangeKind::Update, Some(2))]);
    }

    #[test]
    fn unregistered_listener_is_not_called() {
        let scheduler = Scheduler::new();
        let board = Blackboard::new(&scheduler);
        let (seen, listener) = recorder();
        board.register_listener("k", &listener);
        assert!(board.unregister_listener("k", &listener));
        assert!(!board.unregister_listener("k", &listener));
        assert!(!board.has_listener("k"));

        board.set("k", 1_i32);
        scheduler.tick(0.016);
        assert!(seen.borrow().is_empty());
    }
}
