//! Proxy Factory - stable tracked wrappers around raw containers.
//!
//! [`create_proxy`] returns the same wrapper every time it is asked for the
//! same container in the same mode, and returns a proxy unchanged when handed
//! one. Primitives pass through untouched.
//!
//! The identity table is thread-local shared state. It is keyed by raw
//! container identity and holds only weak references to the container and to
//! its proxies, so it never keeps user data alive; dead entries are swept
//! periodically. Each entry owns the container's one observer, so a container
//! keeps its observer (and its dependents) across proxy re-creation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::{debug, trace};

use super::handlers::{self, Entries, Keys, Values};
use super::observer::{Cleanup, HooklessObserver, Listener, Mutation, Observe, Observer};
use super::value::{ContainerKind, PropKey, RawObject, Value, WeakRaw};
use crate::devtools;
use crate::error::ReactiveError;

// =============================================================================
// Modes
// =============================================================================

/// How a proxy exposes its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProxyMode {
    /// Reads return nested containers raw instead of proxied.
    pub shallow: bool,
    /// Writes fail with [`ReactiveError::Readonly`].
    pub readonly: bool,
}

impl ProxyMode {
    pub const DEEP: Self = Self {
        shallow: false,
        readonly: false,
    };
    pub const SHALLOW: Self = Self {
        shallow: true,
        readonly: false,
    };
    pub const READONLY: Self = Self {
        shallow: false,
        readonly: true,
    };
    pub const SHALLOW_READONLY: Self = Self {
        shallow: true,
        readonly: true,
    };

    fn slot(self) -> usize {
        (self.shallow as usize) | ((self.readonly as usize) << 1)
    }
}

/// Whether a container's observer records dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tracking {
    #[default]
    Hooked,
    /// Notify-only; see [`untracked`].
    Hookless,
}

// =============================================================================
// Identity Table
// =============================================================================

struct IdentityEntry {
    raw: WeakRaw,
    observer: Rc<dyn Observe>,
    tracking: Tracking,
    proxies: [Weak<ProxyInner>; 4],
}

const SWEEP_INTERVAL: usize = 256;

thread_local! {
    static IDENTITY: RefCell<AHashMap<usize, IdentityEntry>> = RefCell::new(AHashMap::new());
    static INSERTS_SINCE_SWEEP: Cell<usize> = const { Cell::new(0) };
}

fn sweep_if_due() {
    let due = INSERTS_SINCE_SWEEP.with(|n| {
        n.set(n.get() + 1);
        n.get() >= SWEEP_INTERVAL
    });
    if due {
        sweep();
    }
}

fn sweep() {
    INSERTS_SINCE_SWEEP.with(|n| n.set(0));
    let removed = IDENTITY.with(|table| {
        let mut table = table.borrow_mut();
        let before = table.len();
        table.retain(|_, entry| entry.raw.is_alive());
        before - table.len()
    });
    if removed > 0 {
        trace!(removed, "swept identity table");
    }
}

/// Look up (or attach) the observer for `raw`.
///
/// The first tracking mode to reach a container wins.
fn observer_for(raw: &RawObject, tracking: Tracking) -> (Rc<dyn Observe>, Tracking) {
    let addr = raw.addr();
    let existing = IDENTITY.with(|table| {
        table
            .borrow()
            .get(&addr)
            .filter(|entry| entry.raw.upgrade().is_some_and(|r| r.ptr_eq(raw)))
            .map(|entry| (entry.observer.clone(), entry.tracking))
    });
    if let Some(found) = existing {
        if found.1 != tracking {
            debug!(addr, requested = ?tracking, kept = ?found.1, "tracking mode already fixed");
        }
        return found;
    }

    let observer: Rc<dyn Observe> = match tracking {
        Tracking::Hooked => Observer::new(),
        Tracking::Hookless => HooklessObserver::new(),
    };
    IDENTITY.with(|table| {
        table.borrow_mut().insert(
            addr,
            IdentityEntry {
                raw: raw.downgrade(),
                observer: observer.clone(),
                tracking,
                proxies: Default::default(),
            },
        );
    });
    sweep_if_due();
    (observer, tracking)
}

/// The observer attached to `raw`, if a proxy was ever created for it.
pub fn observer_of(raw: &RawObject) -> Option<Rc<dyn Observe>> {
    IDENTITY.with(|table| {
        table
            .borrow()
            .get(&raw.addr())
            .filter(|entry| entry.raw.upgrade().is_some_and(|r| r.ptr_eq(raw)))
            .map(|entry| entry.observer.clone())
    })
}

/// Live proxies of `raw`, in mode order.
pub(crate) fn live_proxies(raw: &RawObject) -> Vec<Proxy> {
    IDENTITY.with(|table| {
        table
            .borrow()
            .get(&raw.addr())
            .filter(|entry| entry.raw.upgrade().is_some_and(|r| r.ptr_eq(raw)))
            .map(|entry| {
                entry
                    .proxies
                    .iter()
                    .filter_map(Weak::upgrade)
                    .map(Proxy)
                    .collect()
            })
            .unwrap_or_default()
    })
}

fn proxy_for(raw: &RawObject, mode: ProxyMode, tracking: Tracking) -> Proxy {
    let (observer, tracking) = observer_for(raw, tracking);
    let addr = raw.addr();
    let cached = IDENTITY.with(|table| {
        table
            .borrow()
            .get(&addr)
            .and_then(|entry| entry.proxies[mode.slot()].upgrade())
    });
    if let Some(inner) = cached {
        return Proxy(inner);
    }

    let kind = raw.kind();
    let inner = Rc::new(ProxyInner {
        raw: raw.clone(),
        kind,
        observer,
        mode,
    });
    IDENTITY.with(|table| {
        if let Some(entry) = table.borrow_mut().get_mut(&addr) {
            entry.proxies[mode.slot()] = Rc::downgrade(&inner);
        }
    });
    devtools::emit("proxy:create", || {
        format!("{kind} @{addr:#x} mode={mode:?} tracking={tracking:?}")
    });
    Proxy(inner)
}

/// Clear the identity table.
pub fn reset_proxies() {
    IDENTITY.with(|table| table.borrow_mut().clear());
    INSERTS_SINCE_SWEEP.with(|n| n.set(0));
}

/// Number of containers with a live observer (sweeps first).
pub fn tracked_container_count() -> usize {
    sweep();
    IDENTITY.with(|table| table.borrow().len())
}

// =============================================================================
// Factory API
// =============================================================================

/// Wrap `value` in a deep, tracked proxy.
///
/// Primitives are returned unchanged. A proxy is returned as is.
pub fn create_proxy(value: &Value) -> Value {
    match value {
        Value::Proxy(_) => value.clone(),
        _ => create_proxy_with(value, ProxyMode::DEEP),
    }
}

/// Wrap `value` in a proxy of the given mode.
///
/// A proxy already in `mode` is returned as is; a proxy in another mode is
/// re-wrapped from its raw container.
pub fn create_proxy_with(value: &Value, mode: ProxyMode) -> Value {
    match value {
        Value::Object(raw) => Value::Proxy(proxy_for(raw, mode, Tracking::Hooked)),
        Value::Proxy(p) if p.mode() == mode => value.clone(),
        Value::Proxy(p) => Value::Proxy(proxy_for(p.raw(), mode, Tracking::Hooked)),
        primitive => primitive.clone(),
    }
}

/// Deep tracked proxy of a raw container.
pub fn reactive(raw: &RawObject) -> Proxy {
    proxy_for(raw, ProxyMode::DEEP, Tracking::Hooked)
}

/// Single-level proxy: nested containers are returned raw.
pub fn shallow(value: &Value) -> Value {
    create_proxy_with(value, ProxyMode::SHALLOW)
}

/// Deep proxy that rejects writes.
pub fn readonly(value: &Value) -> Value {
    create_proxy_with(value, ProxyMode::READONLY)
}

/// Deep proxy whose reads never establish dependencies.
///
/// Watchers and listeners still fire. If the container was already observed
/// in tracking mode, that mode is kept.
pub fn untracked(value: &Value) -> Value {
    match value {
        Value::Object(raw) => Value::Proxy(proxy_for(raw, ProxyMode::DEEP, Tracking::Hookless)),
        Value::Proxy(p) => Value::Proxy(proxy_for(p.raw(), p.mode(), Tracking::Hookless)),
        primitive => primitive.clone(),
    }
}

/// The raw container behind a proxy. Anything else is returned unchanged.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(p) => Value::Object(p.raw().clone()),
        other => other.clone(),
    }
}

pub fn is_proxy(value: &Value) -> bool {
    matches!(value, Value::Proxy(_))
}

// =============================================================================
// Proxy
// =============================================================================

pub(crate) struct ProxyInner {
    raw: RawObject,
    kind: ContainerKind,
    observer: Rc<dyn Observe>,
    mode: ProxyMode,
}

/// Tracked wrapper around a [`RawObject`].
///
/// Cloning a `Proxy` clones the handle; all clones are the same proxy.
#[derive(Clone)]
pub struct Proxy(Rc<ProxyInner>);

impl Proxy {
    pub fn raw(&self) -> &RawObject {
        &self.0.raw
    }

    pub fn kind(&self) -> ContainerKind {
        self.0.kind
    }

    pub fn mode(&self) -> ProxyMode {
        self.0.mode
    }

    pub fn is_readonly(&self) -> bool {
        self.0.mode.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.0.mode.shallow
    }

    pub fn observer(&self) -> &Rc<dyn Observe> {
        &self.0.observer
    }

    /// Identity of this wrapper.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn guard(&self, op: &'static str, key: impl fmt::Display) -> Result<(), ReactiveError> {
        if self.is_readonly() {
            return Err(ReactiveError::Readonly {
                op,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Read a property, element or entry. Tracked.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        handlers::get(self, &key.into())
    }

    /// Membership test. Tracked.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        handlers::has(self, &key.into())
    }

    /// Length, key count or size. Tracked on the structural key.
    pub fn len(&self) -> usize {
        handlers::len(self)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live key iterator. Empty for WeakMap and WeakSet.
    pub fn keys(&self) -> Keys {
        Keys::new(self.clone())
    }

    pub fn values(&self) -> Values {
        Values::new(self.clone())
    }

    pub fn entries(&self) -> Entries {
        Entries::new(self.clone())
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Assign a property, element or Map entry.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let key = key.into();
        self.guard("set", &key)?;
        handlers::set(self, &key, value.into())
    }

    /// Remove a property or entry; for arrays, leave a hole. Returns whether
    /// anything was there.
    pub fn delete(&self, key: impl Into<Value>) -> Result<bool, ReactiveError> {
        let key = key.into();
        self.guard("delete", &key)?;
        handlers::delete(self, &key)
    }

    /// Add a member to a Set or WeakSet.
    pub fn add(&self, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let value = value.into();
        self.guard("add", &value)?;
        handlers::add(self, value)
    }

    /// Remove everything, invalidating every dependent at once.
    pub fn clear(&self) -> Result<(), ReactiveError> {
        self.guard("clear", self.kind())?;
        handlers::clear(self)
    }

    /// Append to an array. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize, ReactiveError> {
        self.guard("push", "length")?;
        handlers::array::push(self, value.into())
    }

    pub fn pop(&self) -> Result<Value, ReactiveError> {
        self.guard("pop", "length")?;
        handlers::array::pop(self)
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<(), ReactiveError> {
        self.guard("insert", index)?;
        handlers::array::insert(self, index, value.into())
    }

    pub fn remove(&self, index: usize) -> Result<Value, ReactiveError> {
        self.guard("remove", index)?;
        handlers::array::remove(self, index)
    }

    /// Truncate or extend (with `undefined`) an array.
    pub fn set_len(&self, len: usize) -> Result<(), ReactiveError> {
        self.guard("set", "length")?;
        handlers::array::set_len(self, len)
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Call `callback` after every write of `key`. Returns the unsubscribe.
    pub fn watch(&self, key: impl Into<Value>, callback: impl Fn(&Mutation) + 'static) -> Cleanup {
        let key = handlers::prop_key(self.kind(), &key.into());
        self.watch_key(key, callback)
    }

    pub fn watch_key(&self, key: PropKey, callback: impl Fn(&Mutation) + 'static) -> Cleanup {
        self.0.observer.watch(key, Rc::new(callback))
    }

    /// Subscribe to every change of this container and its nested containers.
    pub fn add_listener(&self, listener: Listener) {
        self.0.observer.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Listener) {
        self.0.observer.remove_listener(listener);
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("kind", &self.kind())
            .field("raw", &format_args!("{:#x}", self.raw().addr()))
            .field("mode", &self.mode())
            .finish()
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_primitives_pass_through() {
        assert_eq!(create_proxy(&Value::from(3)), Value::from(3));
        assert!(!is_proxy(&create_proxy(&Value::from("x"))));
    }

    #[test]
    fn test_identity_is_stable() {
        let raw = Value::Object(RawObject::object());
        let a = create_proxy(&raw);
        let b = create_proxy(&raw);
        assert_eq!(a, b);
        assert_eq!(create_proxy(&a), a);
    }

    #[test]
    fn test_modes_get_distinct_wrappers_sharing_one_observer() {
        let raw = RawObject::object();
        let deep = reactive(&raw);
        let Value::Proxy(ro) = readonly(&Value::Object(raw.clone())) else {
            panic!("expected proxy");
        };
        assert!(!deep.ptr_eq(&ro));
        assert!(Rc::ptr_eq(deep.observer(), ro.observer()));
    }

    #[test]
    fn test_observer_survives_proxy_recreation() {
        let raw = RawObject::object();
        let first = Rc::as_ptr(reactive(&raw).observer()) as *const () as usize;
        let second = Rc::as_ptr(reactive(&raw).observer()) as *const () as usize;
        assert_eq!(first, second);
    }

    #[test]
    fn test_readonly_rejects_writes() {
        let raw = Value::object([("a", 1)]);
        let Value::Proxy(ro) = readonly(&raw) else {
            panic!("expected proxy");
        };
        let err = ro.set("a", 2).unwrap_err();
        assert!(err.to_string().contains("readonly variable"));
        assert_eq!(ro.get("a"), Value::from(1));
    }

    #[test]
    fn test_to_raw() {
        let raw = RawObject::array();
        let proxy = reactive(&raw);
        assert_eq!(to_raw(&Value::Proxy(proxy)), Value::Object(raw));
    }

    #[test]
    fn test_first_tracking_mode_wins() {
        let raw = Value::Object(RawObject::object());
        let Value::Proxy(quiet) = untracked(&raw) else {
            panic!("expected proxy");
        };
        assert!(!quiet.observer().is_tracking());
        let Value::Proxy(loud) = create_proxy(&raw) else {
            panic!("expected proxy");
        };
        assert!(!loud.observer().is_tracking());
    }

    #[test]
    fn test_dead_containers_are_swept() {
        reset_proxies();
        {
            let raw = RawObject::object();
            let _proxy = reactive(&raw);
            assert_eq!(tracked_container_count(), 1);
        }
        assert_eq!(tracked_container_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_create_proxy_idempotent(n in 1usize..8) {
            let raws: Vec<Value> = (0..n).map(|_| Value::Object(RawObject::object())).collect();
            for raw in &raws {
                let once = create_proxy(raw);
                prop_assert_eq!(&create_proxy(&once), &once);
                prop_assert_eq!(&create_proxy(raw), &once);
            }
        }
    }
}
