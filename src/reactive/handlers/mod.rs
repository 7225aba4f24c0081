//! Collection Proxy Handlers.
//!
//! One module per container kind. Every handler follows the same contract:
//! - reads call `use_prop` on the key before returning, and wrap containers
//!   they return (unless the proxy is shallow)
//! - writes mutate the raw container first, then notify only if the value
//!   changed under [`is_same`]
//! - structural changes also notify the synthetic key iteration depends on
//! - clear uses `all_change`
//!
//! Dispatch on [`ContainerKind`] happens here, once per operation, on the
//! kind stored in the proxy.

pub mod array;
pub mod iter;
pub mod map;
pub mod object;
pub mod set;
pub mod weak;

pub use iter::{Entries, Keys, Values};

use std::rc::Rc;

use super::observer::{Mutation, MutationMeta};
use super::proxy::{self, Proxy, ProxyMode};
use super::same::is_same;
use super::value::{ContainerKind, OrderedTable, PropKey, Value, ValueKey};
use crate::error::ReactiveError;

// =============================================================================
// Dispatch
// =============================================================================

pub(crate) fn get(proxy: &Proxy, key: &Value) -> Value {
    match proxy.kind() {
        ContainerKind::Array => array::get(proxy, key),
        ContainerKind::Object => object::get(proxy, key),
        ContainerKind::Map => map::get(proxy, key),
        ContainerKind::Set => {
            if set::has(proxy, key) {
                key.clone()
            } else {
                Value::Undefined
            }
        }
        ContainerKind::WeakMap => weak::map_get(proxy, key),
        ContainerKind::WeakSet => Value::Undefined,
    }
}

pub(crate) fn has(proxy: &Proxy, key: &Value) -> bool {
    match proxy.kind() {
        ContainerKind::Array => array::has(proxy, key),
        ContainerKind::Object => object::has(proxy, key),
        ContainerKind::Map => map::has(proxy, key),
        ContainerKind::Set => set::has(proxy, key),
        ContainerKind::WeakMap | ContainerKind::WeakSet => weak::has(proxy, key),
    }
}

pub(crate) fn len(proxy: &Proxy) -> usize {
    match proxy.kind() {
        ContainerKind::Array => array::len(proxy),
        ContainerKind::Object => object::len(proxy),
        ContainerKind::Map | ContainerKind::Set => {
            proxy.observer().use_prop(&PropKey::CollectionChange);
            proxy.raw().len()
        }
        // Weak collections have no observable size.
        ContainerKind::WeakMap | ContainerKind::WeakSet => 0,
    }
}

pub(crate) fn set(proxy: &Proxy, key: &Value, value: Value) -> Result<(), ReactiveError> {
    match proxy.kind() {
        ContainerKind::Array => array::set(proxy, key, value),
        ContainerKind::Object => object::set(proxy, key, value),
        ContainerKind::Map => map::set(proxy, key, value),
        ContainerKind::WeakMap => weak::map_set(proxy, key, value),
        kind => Err(ReactiveError::Unsupported { op: "set", kind }),
    }
}

pub(crate) fn delete(proxy: &Proxy, key: &Value) -> Result<bool, ReactiveError> {
    match proxy.kind() {
        ContainerKind::Array => array::delete(proxy, key),
        ContainerKind::Object => object::delete(proxy, key),
        ContainerKind::Map => map::delete(proxy, key),
        ContainerKind::Set => set::delete(proxy, key),
        ContainerKind::WeakMap | ContainerKind::WeakSet => weak::delete(proxy, key),
    }
}

pub(crate) fn add(proxy: &Proxy, value: Value) -> Result<(), ReactiveError> {
    match proxy.kind() {
        ContainerKind::Set => set::add(proxy, value),
        ContainerKind::WeakSet => weak::set_add(proxy, value),
        kind => Err(ReactiveError::Unsupported { op: "add", kind }),
    }
}

pub(crate) fn clear(proxy: &Proxy) -> Result<(), ReactiveError> {
    match proxy.kind() {
        ContainerKind::Array => array::clear(proxy),
        ContainerKind::Object => object::clear(proxy),
        ContainerKind::Map => map::clear(proxy),
        ContainerKind::Set => set::clear(proxy),
        kind => Err(ReactiveError::Unsupported { op: "clear", kind }),
    }
}

/// The observer key a caller-facing key maps to for `kind`.
pub(crate) fn prop_key(kind: ContainerKind, key: &Value) -> PropKey {
    match kind {
        ContainerKind::Array => match array_slot(key) {
            ArraySlot::Index(i) => PropKey::Index(i),
            ArraySlot::Length => PropKey::Length,
            ArraySlot::Other => PropKey::Name(name_of(key)),
        },
        ContainerKind::Object => PropKey::Name(name_of(key)),
        _ => PropKey::Entry(track_key(key)),
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Wrap a value read out of `parent` according to its mode.
pub(crate) fn wrap(parent: &Proxy, value: Value) -> Value {
    if parent.is_shallow() || !value.is_container() {
        return value;
    }
    let mode = ProxyMode {
        shallow: false,
        readonly: parent.is_readonly(),
    };
    let wrapped = if parent.observer().is_tracking() {
        proxy::create_proxy_with(&value, mode)
    } else {
        let quiet = proxy::untracked(&value);
        proxy::create_proxy_with(&quiet, mode)
    };
    if let Value::Proxy(child) = &wrapped {
        child.observer().link_parent(Rc::downgrade(parent.observer()));
    }
    wrapped
}

/// Strip proxies from a value about to be stored.
pub(crate) fn unwrap(value: Value) -> Value {
    proxy::to_raw(&value)
}

/// Notify `key` unless old and new are the same value.
pub(crate) fn notify_change(proxy: &Proxy, key: PropKey, old: Value, new: Value) -> bool {
    if is_same(&old, &new) {
        return false;
    }
    proxy.observer().set_prop(&Mutation::new(key, old, new));
    true
}

/// Notify a structural change unconditionally.
pub(crate) fn notify_structure(proxy: &Proxy, key: PropKey, old: Value, new: Value, meta: MutationMeta) {
    proxy
        .observer()
        .set_prop(&Mutation::new(key, old, new).with_meta(meta));
}

pub(crate) fn clear_all(proxy: &Proxy, key: PropKey, old_len: usize) {
    proxy.observer().all_change(
        &Mutation::new(key, Value::from(old_len), Value::from(0)).with_meta(MutationMeta::Clear),
    );
}

/// Property name for a plain-object key.
pub(crate) fn name_of(key: &Value) -> Rc<str> {
    match key {
        Value::Str(s) => s.clone(),
        other => Rc::from(other.to_string()),
    }
}

pub(crate) enum ArraySlot {
    Index(usize),
    Length,
    Other,
}

pub(crate) fn array_slot(key: &Value) -> ArraySlot {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n < usize::MAX as f64 => {
            ArraySlot::Index(*n as usize)
        }
        Value::Str(s) if &**s == "length" => ArraySlot::Length,
        Value::Str(s) => match s.parse::<usize>() {
            Ok(i) if i.to_string() == **s => ArraySlot::Index(i),
            _ => ArraySlot::Other,
        },
        _ => ArraySlot::Other,
    }
}

/// Identity used to track a Map/Set entry.
///
/// Containers track by raw identity, so a raw key and any of its proxies
/// observe the same entry.
pub(crate) fn track_key(key: &Value) -> ValueKey {
    match key.as_raw() {
        Some(raw) => ValueKey::Object(raw.addr()),
        None => ValueKey::of(key),
    }
}

/// Find the stored key for a caller-supplied key.
///
/// Container keys are stored as proxies, so a raw key is looked up through
/// its live proxies first, then by raw identity.
pub(crate) fn resolve_key<V>(table: &OrderedTable<ValueKey, V>, key: &Value) -> Option<ValueKey> {
    let Some(raw) = key.as_raw() else {
        let direct = ValueKey::of(key);
        return table.contains_key(&direct).then_some(direct);
    };
    if let Value::Proxy(p) = key {
        let direct = ValueKey::Proxy(p.addr());
        if table.contains_key(&direct) {
            return Some(direct);
        }
    }
    proxy::live_proxies(raw)
        .into_iter()
        .map(|p| ValueKey::Proxy(p.addr()))
        .chain(std::iter::once(ValueKey::Object(raw.addr())))
        .find(|candidate| table.contains_key(candidate))
}

/// How a new key is stored: containers as their deep proxy.
pub(crate) fn storage_key(key: &Value) -> (ValueKey, Value) {
    let stored = match key {
        Value::Object(_) => proxy::create_proxy(key),
        Value::Proxy(p) if p.mode() != ProxyMode::DEEP => {
            proxy::create_proxy(&Value::Object(p.raw().clone()))
        }
        other => other.clone(),
    };
    (ValueKey::of(&stored), stored)
}
