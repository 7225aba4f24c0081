//! Observer - per-container dependency bookkeeping.
//!
//! Every tracked raw container has exactly one observer, held in the proxy
//! identity table. The observer maps property keys to the dependents
//! ([`Tracker`]s) that read them, keeps explicit per-key watchers, and keeps
//! whole-object listeners.
//!
//! Reads register the *current consumer* (the top of a thread-local stack)
//! under the key being read. Writes invalidate those consumers, then fire
//! watchers, then listeners. Every callback runs isolated: a panicking
//! callback is logged and the remaining callbacks still run.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};
use tracing::{error, trace, warn};

use super::value::{PropKey, Value};

// =============================================================================
// Types
// =============================================================================

/// Cleanup function returned by subscriptions.
///
/// Call it to unsubscribe.
pub type Cleanup = Box<dyn FnOnce()>;

/// Per-key watcher callback.
pub type WatchCallback = Rc<dyn Fn(&Mutation)>;

/// Whole-object listener.
pub type Listener = Rc<dyn Fn(&Mutation)>;

/// What kind of structural change a mutation was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMeta {
    Insert,
    Delete,
    Clear,
}

/// A single applied change, passed to watchers and listeners.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub key: PropKey,
    pub old: Value,
    pub new: Value,
    pub meta: Option<MutationMeta>,
}

impl Mutation {
    pub fn new(key: PropKey, old: Value, new: Value) -> Self {
        Self {
            key,
            old,
            new,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: MutationMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// The observer contract shared by [`Observer`] and [`HooklessObserver`].
pub trait Observe {
    /// Record a read of `key` by the current consumer.
    fn use_prop(&self, key: &PropKey);

    /// Notify after `mutation` was applied to the raw container.
    fn set_prop(&self, mutation: &Mutation);

    /// Invalidate every dependent of every key.
    fn all_change(&self, mutation: &Mutation);

    fn add_listener(&self, listener: Listener);

    /// Remove a listener by identity. No-op if it was never added.
    fn remove_listener(&self, listener: &Listener);

    /// Subscribe to writes of `key`. The returned closure unsubscribes.
    fn watch(&self, key: PropKey, callback: WatchCallback) -> Cleanup;

    /// Remove watcher `id` from `key`.
    fn unwatch(&self, key: &PropKey, id: u64);

    /// Drop the registration of tracker `id` under `key`.
    fn forget(&self, id: u64, key: &PropKey);

    /// Fire whole-object listeners, then bubble to linked parents.
    fn notify_listeners(&self, mutation: &Mutation);

    /// Link a containing observer so listener notifications bubble to it.
    fn link_parent(&self, parent: Weak<dyn Observe>);

    /// Whether reads establish dependencies.
    fn is_tracking(&self) -> bool;

    /// Number of live dependents registered under `key`.
    fn dependent_count(&self, key: &PropKey) -> usize;
}

// =============================================================================
// Isolation
// =============================================================================

/// Run a user callback, logging and swallowing a panic.
pub(crate) fn isolate(what: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(callback = what, %message, "callback panicked");
            false
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// Consumer Stack
// =============================================================================

thread_local! {
    /// Active consumers. `None` entries mark untracked scopes.
    static CONSUMERS: RefCell<Vec<Option<Rc<Tracker>>>> = const { RefCell::new(Vec::new()) };

    static NEXT_TRACKER_ID: Cell<u64> = const { Cell::new(1) };

    /// Observers currently bubbling listener notifications (cycle guard).
    static NOTIFYING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// The consumer reads currently register against, if any.
pub fn current_consumer() -> Option<Rc<Tracker>> {
    CONSUMERS.with(|stack| stack.borrow().last().cloned().flatten())
}

struct ConsumerGuard;

impl ConsumerGuard {
    fn push(consumer: Option<Rc<Tracker>>) -> Self {
        CONSUMERS.with(|stack| stack.borrow_mut().push(consumer));
        ConsumerGuard
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        CONSUMERS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` without registering any dependency.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ConsumerGuard::push(None);
    f()
}

// =============================================================================
// Tracker (dependent)
// =============================================================================

/// A dependent: something that re-evaluates when what it read changes.
///
/// Rendering VNodes and [`watch_effect`] closures each own a tracker.
pub struct Tracker {
    id: u64,
    label: &'static str,
    on_invalidate: RefCell<Option<Rc<dyn Fn()>>>,
    sources: RefCell<Vec<(Weak<dyn Observe>, PropKey)>>,
    active: Cell<bool>,
}

impl Tracker {
    pub fn new(label: &'static str, on_invalidate: impl Fn() + 'static) -> Rc<Self> {
        let id = NEXT_TRACKER_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Rc::new(Self {
            id,
            label,
            on_invalidate: RefCell::new(Some(Rc::new(on_invalidate))),
            sources: RefCell::new(Vec::new()),
            active: Cell::new(true),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Re-evaluate: forget old dependencies, then record the ones `f` reads.
    pub fn run<R>(self: &Rc<Self>, f: impl FnOnce() -> R) -> R {
        self.clear_dependencies();
        let _guard = ConsumerGuard::push(Some(self.clone()));
        f()
    }

    pub(crate) fn record(&self, source: Weak<dyn Observe>, key: PropKey) {
        self.sources.borrow_mut().push((source, key));
    }

    /// Drop every registration this tracker holds.
    pub fn clear_dependencies(&self) {
        let sources = std::mem::take(&mut *self.sources.borrow_mut());
        for (source, key) in sources {
            if let Some(observer) = source.upgrade() {
                observer.forget(self.id, &key);
            }
        }
    }

    pub fn dependency_count(&self) -> usize {
        self.sources.borrow().len()
    }

    /// Signal that something this tracker read has changed.
    pub fn invalidate(&self) {
        if !self.active.get() {
            return;
        }
        let callback = self.on_invalidate.borrow().clone();
        if let Some(callback) = callback {
            isolate(self.label, || callback());
        }
    }

    /// Deactivate permanently and release all registrations.
    pub fn dispose(&self) {
        self.active.set(false);
        self.clear_dependencies();
        self.on_invalidate.borrow_mut().take();
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.clear_dependencies();
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("active", &self.active.get())
            .finish()
    }
}

// =============================================================================
// Subscribers (shared by both observer kinds)
// =============================================================================

#[derive(Default)]
struct Subscribers {
    watchers: RefCell<AHashMap<PropKey, Vec<(u64, WatchCallback)>>>,
    listeners: RefCell<Vec<Listener>>,
    parents: RefCell<Vec<Weak<dyn Observe>>>,
    next_watch: Cell<u64>,
}

fn listener_addr(listener: &Listener) -> *const () {
    Rc::as_ptr(listener) as *const ()
}

impl Subscribers {
    fn fire_watchers(&self, mutation: &Mutation) {
        let watchers: Vec<WatchCallback> = self
            .watchers
            .borrow()
            .get(&mutation.key)
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        for watcher in watchers {
            isolate("watcher", || watcher(mutation));
        }
    }

    fn add_listener(&self, listener: Listener) {
        let mut listeners = self.listeners.borrow_mut();
        let addr = listener_addr(&listener);
        if !listeners.iter().any(|l| listener_addr(l) == addr) {
            listeners.push(listener);
        }
    }

    fn remove_listener(&self, listener: &Listener) {
        let addr = listener_addr(listener);
        self.listeners
            .borrow_mut()
            .retain(|l| listener_addr(l) != addr);
    }

    fn watch(&self, this: Weak<dyn Observe>, key: PropKey, callback: WatchCallback) -> Cleanup {
        let id = self.next_watch.get();
        self.next_watch.set(id + 1);
        self.watchers
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .push((id, callback));
        Box::new(move || {
            if let Some(observer) = this.upgrade() {
                observer.unwatch(&key, id);
            }
        })
    }

    fn unwatch(&self, key: &PropKey, id: u64) {
        let mut watchers = self.watchers.borrow_mut();
        if let Some(list) = watchers.get_mut(key) {
            list.retain(|(wid, _)| *wid != id);
            if list.is_empty() {
                watchers.remove(key);
            }
        }
    }

    fn link_parent(&self, parent: Weak<dyn Observe>) {
        let mut parents = self.parents.borrow_mut();
        parents.retain(|p| p.strong_count() > 0);
        if !parents.iter().any(|p| Weak::ptr_eq(p, &parent)) {
            parents.push(parent);
        }
    }

    fn notify_listeners(&self, addr: usize, mutation: &Mutation) {
        let reentered = NOTIFYING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&addr) {
                true
            } else {
                stack.push(addr);
                false
            }
        });
        if reentered {
            return;
        }

        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            isolate("listener", || listener(mutation));
        }
        let parents: Vec<Rc<dyn Observe>> = self
            .parents
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for parent in parents {
            parent.notify_listeners(mutation);
        }

        NOTIFYING.with(|stack| {
            stack.borrow_mut().retain(|a| *a != addr);
        });
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Dependents of one key, in registration order.
#[derive(Default)]
struct Dependents {
    ids: AHashSet<u64>,
    order: Vec<(u64, Weak<Tracker>)>,
}

impl Dependents {
    fn insert(&mut self, tracker: &Rc<Tracker>) -> bool {
        if !self.ids.insert(tracker.id) {
            return false;
        }
        self.order.push((tracker.id, Rc::downgrade(tracker)));
        true
    }

    /// Drop `id` along with any tracker that no longer exists.
    fn remove(&mut self, id: u64) {
        self.ids.remove(&id);
        let ids = &mut self.ids;
        self.order.retain(|(tracker, weak)| {
            if *tracker == id {
                return false;
            }
            if weak.strong_count() == 0 {
                ids.remove(tracker);
                return false;
            }
            true
        });
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn live(&self) -> impl Iterator<Item = Rc<Tracker>> + '_ {
        self.order.iter().filter_map(|(_, weak)| weak.upgrade())
    }
}

/// Tracking observer: reads register dependents.
pub struct Observer {
    this: Weak<Observer>,
    deps: RefCell<AHashMap<PropKey, Dependents>>,
    subs: Subscribers,
}

impl Observer {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            deps: RefCell::new(AHashMap::new()),
            subs: Subscribers::default(),
        })
    }

    fn weak_dyn(&self) -> Weak<dyn Observe> {
        self.this.clone()
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    fn dependents_of(&self, key: &PropKey) -> Vec<Rc<Tracker>> {
        self.deps
            .borrow()
            .get(key)
            .map(|list| list.live().collect())
            .unwrap_or_default()
    }
}

impl Observe for Observer {
    fn use_prop(&self, key: &PropKey) {
        let Some(consumer) = current_consumer() else {
            return;
        };
        if !consumer.is_active() {
            return;
        }
        let inserted = self
            .deps
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .insert(&consumer);
        if inserted {
            trace!(tracker = consumer.id, key = %key, "use_prop");
            consumer.record(self.weak_dyn(), key.clone());
        }
    }

    fn set_prop(&self, mutation: &Mutation) {
        let dependents = self.dependents_of(&mutation.key);
        trace!(key = %mutation.key, dependents = dependents.len(), "set_prop");
        for dependent in dependents {
            dependent.invalidate();
        }
        self.subs.fire_watchers(mutation);
        self.notify_listeners(mutation);
    }

    fn all_change(&self, mutation: &Mutation) {
        let mut seen = AHashSet::new();
        let dependents: Vec<Rc<Tracker>> = self
            .deps
            .borrow()
            .values()
            .flat_map(Dependents::live)
            .filter(|t| seen.insert(t.id))
            .collect();
        trace!(dependents = dependents.len(), "all_change");
        for dependent in dependents {
            dependent.invalidate();
        }
        self.subs.fire_watchers(mutation);
        self.notify_listeners(mutation);
    }

    fn add_listener(&self, listener: Listener) {
        self.subs.add_listener(listener);
    }

    fn remove_listener(&self, listener: &Listener) {
        self.subs.remove_listener(listener);
    }

    fn watch(&self, key: PropKey, callback: WatchCallback) -> Cleanup {
        self.subs.watch(self.weak_dyn(), key, callback)
    }

    fn unwatch(&self, key: &PropKey, id: u64) {
        self.subs.unwatch(key, id);
    }

    fn forget(&self, id: u64, key: &PropKey) {
        let mut deps = self.deps.borrow_mut();
        if let Some(list) = deps.get_mut(key) {
            list.remove(id);
            if list.is_empty() {
                deps.remove(key);
            }
        }
    }

    fn notify_listeners(&self, mutation: &Mutation) {
        self.subs.notify_listeners(self.addr(), mutation);
    }

    fn link_parent(&self, parent: Weak<dyn Observe>) {
        if parent.as_ptr() as *const () as usize == self.addr() {
            return;
        }
        self.subs.link_parent(parent);
    }

    fn is_tracking(&self) -> bool {
        true
    }

    fn dependent_count(&self, key: &PropKey) -> usize {
        self.dependents_of(key).len()
    }
}

// =============================================================================
// HooklessObserver
// =============================================================================

/// Notify-only observer: reads never register dependents.
///
/// Created through [`untracked`](super::untracked). Watchers and listeners
/// work exactly as on [`Observer`].
pub struct HooklessObserver {
    this: Weak<HooklessObserver>,
    subs: Subscribers,
}

impl HooklessObserver {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            subs: Subscribers::default(),
        })
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }
}

impl Observe for HooklessObserver {
    fn use_prop(&self, _key: &PropKey) {}

    fn set_prop(&self, mutation: &Mutation) {
        self.subs.fire_watchers(mutation);
        self.notify_listeners(mutation);
    }

    fn all_change(&self, mutation: &Mutation) {
        self.subs.fire_watchers(mutation);
        self.notify_listeners(mutation);
    }

    fn add_listener(&self, listener: Listener) {
        self.subs.add_listener(listener);
    }

    fn remove_listener(&self, listener: &Listener) {
        self.subs.remove_listener(listener);
    }

    fn watch(&self, key: PropKey, callback: WatchCallback) -> Cleanup {
        let this: Weak<dyn Observe> = self.this.clone();
        self.subs.watch(this, key, callback)
    }

    fn unwatch(&self, key: &PropKey, id: u64) {
        self.subs.unwatch(key, id);
    }

    fn forget(&self, _id: u64, _key: &PropKey) {}

    fn notify_listeners(&self, mutation: &Mutation) {
        self.subs.notify_listeners(self.addr(), mutation);
    }

    fn link_parent(&self, parent: Weak<dyn Observe>) {
        if parent.as_ptr() as *const () as usize == self.addr() {
            return;
        }
        self.subs.link_parent(parent);
    }

    fn is_tracking(&self) -> bool {
        false
    }

    fn dependent_count(&self, _key: &PropKey) -> usize {
        0
    }
}

// =============================================================================
// watch_effect
// =============================================================================

const MAX_EFFECT_RERUNS: usize = 100;

/// Run `effect` now and again whenever anything it read changes.
///
/// The effect stays subscribed while the returned [`Cleanup`] is alive;
/// calling it (or dropping it) stops the effect.
pub fn watch_effect(effect: impl Fn() + 'static) -> Cleanup {
    let effect: Rc<dyn Fn()> = Rc::new(effect);
    let running = Rc::new(Cell::new(false));
    let dirty = Rc::new(Cell::new(false));
    let slot: Rc<RefCell<Weak<Tracker>>> = Rc::new(RefCell::new(Weak::new()));

    let tracker = Tracker::new("watch_effect", {
        let effect = effect.clone();
        let running = running.clone();
        let dirty = dirty.clone();
        let slot = slot.clone();
        move || {
            let tracker = slot.borrow().upgrade();
            if let Some(tracker) = tracker {
                run_effect(&tracker, &effect, &running, &dirty);
            }
        }
    });
    *slot.borrow_mut() = Rc::downgrade(&tracker);
    run_effect(&tracker, &effect, &running, &dirty);

    Box::new(move || tracker.dispose())
}

fn run_effect(tracker: &Rc<Tracker>, effect: &Rc<dyn Fn()>, running: &Cell<bool>, dirty: &Cell<bool>) {
    if running.get() {
        dirty.set(true);
        return;
    }
    running.set(true);
    let mut runs = 0;
    loop {
        dirty.set(false);
        isolate("watch_effect", || tracker.run(|| effect()));
        runs += 1;
        if !dirty.get() || !tracker.is_active() {
            break;
        }
        if runs >= MAX_EFFECT_RERUNS {
            warn!(runs, "watch_effect keeps invalidating itself, giving up");
            break;
        }
    }
    running.set(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> PropKey {
        PropKey::from(name)
    }

    #[test]
    fn test_use_prop_outside_consumer_is_noop() {
        let observer = Observer::new();
        observer.use_prop(&key("a"));
        assert_eq!(observer.dependent_count(&key("a")), 0);
    }

    #[test]
    fn test_set_prop_invalidates_readers() {
        let observer = Observer::new();
        let hits = Rc::new(Cell::new(0));
        let tracker = Tracker::new("test", {
            let hits = hits.clone();
            move || hits.set(hits.get() + 1)
        });
        tracker.run(|| observer.use_prop(&key("a")));
        assert_eq!(observer.dependent_count(&key("a")), 1);

        observer.set_prop(&Mutation::new(key("b"), Value::Undefined, Value::from(1)));
        assert_eq!(hits.get(), 0, "unrelated key must not invalidate");

        observer.set_prop(&Mutation::new(key("a"), Value::Undefined, Value::from(1)));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_rerun_replaces_dependencies() {
        let observer = Observer::new();
        let tracker = Tracker::new("test", || {});
        tracker.run(|| observer.use_prop(&key("a")));
        tracker.run(|| observer.use_prop(&key("b")));
        assert_eq!(observer.dependent_count(&key("a")), 0);
        assert_eq!(observer.dependent_count(&key("b")), 1);
        tracker.dispose();
        assert_eq!(observer.dependent_count(&key("b")), 0);
    }

    #[test]
    fn test_dropped_tracker_releases_registrations() {
        let observer = Observer::new();
        {
            let tracker = Tracker::new("test", || {});
            tracker.run(|| observer.use_prop(&key("a")));
        }
        assert_eq!(observer.dependent_count(&key("a")), 0);
    }

    #[test]
    fn test_panicking_watcher_is_isolated() {
        let observer = Observer::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _a = observer.watch(key("a"), Rc::new(|_: &Mutation| panic!("bad watcher")));
        let _b = observer.watch(key("a"), {
            let seen = seen.clone();
            Rc::new(move |m: &Mutation| seen.borrow_mut().push(m.new.clone()))
        });
        observer.set_prop(&Mutation::new(key("a"), Value::from(1), Value::from(2)));
        assert_eq!(*seen.borrow(), vec![Value::from(2)]);
    }

    #[test]
    fn test_unwatch() {
        let observer = Observer::new();
        let hits = Rc::new(Cell::new(0));
        let stop = observer.watch(key("a"), {
            let hits = hits.clone();
            Rc::new(move |_: &Mutation| hits.set(hits.get() + 1))
        });
        observer.set_prop(&Mutation::new(key("a"), Value::from(1), Value::from(2)));
        stop();
        observer.set_prop(&Mutation::new(key("a"), Value::from(2), Value::from(3)));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_remove_listener_is_idempotent() {
        let observer = Observer::new();
        let listener: Listener = Rc::new(|_: &Mutation| {});
        observer.remove_listener(&listener);
        observer.add_listener(listener.clone());
        observer.remove_listener(&listener);
        observer.remove_listener(&listener);
    }

    #[test]
    fn test_listeners_bubble_to_parent_without_cycles() {
        let parent = Observer::new();
        let child = Observer::new();
        let hits = Rc::new(Cell::new(0));
        parent.add_listener({
            let hits = hits.clone();
            Rc::new(move |_: &Mutation| hits.set(hits.get() + 1))
        });
        let parent_dyn: Rc<dyn Observe> = parent.clone();
        let child_dyn: Rc<dyn Observe> = child.clone();
        child.link_parent(Rc::downgrade(&parent_dyn));
        parent.link_parent(Rc::downgrade(&child_dyn));

        child.set_prop(&Mutation::new(key("x"), Value::Undefined, Value::from(1)));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_hookless_never_tracks() {
        let observer = HooklessObserver::new();
        let tracker = Tracker::new("test", || {});
        tracker.run(|| observer.use_prop(&key("a")));
        assert_eq!(tracker.dependency_count(), 0);
        assert!(!observer.is_tracking());
    }

    #[test]
    fn test_untrack_suppresses_registration() {
        let observer = Observer::new();
        let tracker = Tracker::new("test", || {});
        tracker.run(|| untrack(|| observer.use_prop(&key("a"))));
        assert_eq!(observer.dependent_count(&key("a")), 0);
    }

    #[test]
    fn test_repeated_reads_register_once() {
        let observer = Observer::new();
        let tracker = Tracker::new("test", || {});
        tracker.run(|| {
            for _ in 0..1000 {
                observer.use_prop(&key("a"));
            }
        });
        assert_eq!(observer.dependent_count(&key("a")), 1);
        assert_eq!(tracker.dependency_count(), 1);

        // Forgotten on re-run, then registered again
        tracker.run(|| observer.use_prop(&key("a")));
        assert_eq!(observer.dependent_count(&key("a")), 1);
    }

    #[test]
    fn test_dependents_invalidate_in_registration_order() {
        let observer = Observer::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let trackers: Vec<Rc<Tracker>> = (0..200)
            .map(|i| {
                let order = order.clone();
                Tracker::new("test", move || order.borrow_mut().push(i))
            })
            .collect();
        for tracker in &trackers {
            tracker.run(|| observer.use_prop(&key("a")));
        }
        observer.all_change(
            &Mutation::new(PropKey::CollectionChange, Value::Undefined, Value::Undefined)
                .with_meta(MutationMeta::Clear),
        );
        assert_eq!(*order.borrow(), (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_all_change_invalidates_each_dependent_once() {
        let observer = Observer::new();
        let hits = Rc::new(Cell::new(0));
        let tracker = Tracker::new("test", {
            let hits = hits.clone();
            move || hits.set(hits.get() + 1)
        });
        tracker.run(|| {
            observer.use_prop(&key("a"));
            observer.use_prop(&key("b"));
        });
        observer.all_change(
            &Mutation::new(PropKey::CollectionChange, Value::Undefined, Value::Undefined)
                .with_meta(MutationMeta::Clear),
        );
        assert_eq!(hits.get(), 1);
    }
}
