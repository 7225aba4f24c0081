//! WeakMap / WeakSet handlers.
//!
//! Keys must be containers and are held weakly, by raw identity. There is
//! no size and no iteration. Dead keys are pruned on insert.

use super::{notify_change, notify_structure, unwrap, wrap};
use crate::error::ReactiveError;
use crate::reactive::observer::MutationMeta;
use crate::reactive::proxy::Proxy;
use crate::reactive::value::{ContainerKind, PropKey, RawData, RawObject, Value, ValueKey};

fn weak_key(proxy: &Proxy, key: &Value) -> Result<RawObject, ReactiveError> {
    key.as_raw()
        .cloned()
        .ok_or_else(|| ReactiveError::InvalidWeakKey {
            kind: proxy.kind(),
            found: key.type_name(),
        })
}

fn entry_key(raw: &RawObject) -> PropKey {
    PropKey::Entry(ValueKey::Object(raw.addr()))
}

fn lookup(proxy: &Proxy, raw: &RawObject) -> Option<Value> {
    let addr = raw.addr();
    match &*proxy.raw().data() {
        RawData::WeakMap(entries) => entries
            .get(&addr)
            .filter(|(k, _)| k.upgrade().is_some_and(|k| k.ptr_eq(raw)))
            .map(|(_, v)| v.clone()),
        RawData::WeakSet(entries) => entries
            .get(&addr)
            .filter(|k| k.upgrade().is_some_and(|k| k.ptr_eq(raw)))
            .map(|_| Value::Bool(true)),
        _ => None,
    }
}

pub(crate) fn map_get(proxy: &Proxy, key: &Value) -> Value {
    let Some(raw) = key.as_raw() else {
        return Value::Undefined;
    };
    proxy.observer().use_prop(&entry_key(raw));
    let value = lookup(proxy, raw).unwrap_or_default();
    wrap(proxy, value)
}

pub(crate) fn has(proxy: &Proxy, key: &Value) -> bool {
    let Some(raw) = key.as_raw() else {
        return false;
    };
    proxy.observer().use_prop(&entry_key(raw));
    lookup(proxy, raw).is_some()
}

pub(crate) fn map_set(proxy: &Proxy, key: &Value, value: Value) -> Result<(), ReactiveError> {
    let raw = weak_key(proxy, key)?;
    let value = unwrap(value);
    let previous = match &mut *proxy.raw().data_mut() {
        RawData::WeakMap(entries) => {
            entries.retain(|_, (k, _)| k.is_alive());
            entries
                .insert(raw.addr(), (raw.downgrade(), value.clone()))
                .map(|(_, old)| old)
        }
        _ => return Err(ReactiveError::Unsupported {
            op: "set",
            kind: proxy.kind(),
        }),
    };
    match previous {
        Some(old) => {
            notify_change(proxy, entry_key(&raw), old, value);
        }
        None => notify_structure(proxy, entry_key(&raw), Value::Undefined, value, MutationMeta::Insert),
    }
    Ok(())
}

pub(crate) fn set_add(proxy: &Proxy, value: Value) -> Result<(), ReactiveError> {
    let raw = weak_key(proxy, &value)?;
    if lookup(proxy, &raw).is_some() {
        return Ok(());
    }
    if let RawData::WeakSet(entries) = &mut *proxy.raw().data_mut() {
        entries.retain(|_, k| k.is_alive());
        entries.insert(raw.addr(), raw.downgrade());
    }
    notify_structure(
        proxy,
        entry_key(&raw),
        Value::Undefined,
        Value::Bool(true),
        MutationMeta::Insert,
    );
    Ok(())
}

pub(crate) fn delete(proxy: &Proxy, key: &Value) -> Result<bool, ReactiveError> {
    let Some(raw) = key.as_raw().cloned() else {
        return Ok(false);
    };
    let Some(old) = lookup(proxy, &raw) else {
        return Ok(false);
    };
    match &mut *proxy.raw().data_mut() {
        RawData::WeakMap(entries) => {
            entries.remove(&raw.addr());
        }
        RawData::WeakSet(entries) => {
            entries.remove(&raw.addr());
        }
        _ => {}
    }
    let old = if proxy.kind() == ContainerKind::WeakSet {
        Value::Bool(true)
    } else {
        old
    };
    notify_structure(proxy, entry_key(&raw), old, Value::Undefined, MutationMeta::Delete);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::reactive::proxy::reactive;
    use crate::reactive::value::{RawObject, Value};

    #[test]
    fn test_weak_map_round_trip() {
        let map = reactive(&RawObject::weak_map());
        let key = RawObject::object();
        map.set(Value::Object(key.clone()), "v").unwrap();
        assert_eq!(map.get(Value::Object(key.clone())), Value::from("v"));
        let proxied = crate::reactive::reactive(&key);
        assert!(map.has(Value::Proxy(proxied)), "proxy and raw key are the same entry");
        assert!(map.delete(Value::Object(key.clone())).unwrap());
        assert!(!map.has(Value::Object(key)));
    }

    #[test]
    fn test_primitive_key_rejected() {
        let map = reactive(&RawObject::weak_map());
        assert!(map.set("a", 1).is_err());
        let set = reactive(&RawObject::weak_set());
        assert!(set.add(1).is_err());
    }

    #[test]
    fn test_weak_set_does_not_keep_keys_alive() {
        let set = reactive(&RawObject::weak_set());
        let weak = {
            let member = RawObject::object();
            set.add(Value::Object(member.clone())).unwrap();
            assert!(set.has(Value::Object(member.clone())));
            member.downgrade()
        };
        assert!(!weak.is_alive());
        assert_eq!(set.raw().len(), 0);
    }
}
