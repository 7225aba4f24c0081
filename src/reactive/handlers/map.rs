//! Map handler.
//!
//! Container keys are stored as their deep proxy, so mutating a key object
//! through the map is tracked too. Lookups resolve a caller's key (raw or
//! any proxy of it) to the stored key before touching the table.
//!
//! Entries are tracked by raw key identity; size and iteration depend on the
//! synthetic `CollectionChange` key.

use super::{clear_all, notify_change, notify_structure, resolve_key, storage_key, track_key, unwrap, wrap};
use crate::error::ReactiveError;
use crate::reactive::observer::MutationMeta;
use crate::reactive::proxy::Proxy;
use crate::reactive::value::{OrderedTable, PropKey, RawData, Value, ValueKey};

type Table = OrderedTable<ValueKey, (Value, Value)>;

fn read<R>(proxy: &Proxy, f: impl FnOnce(&Table) -> R) -> R {
    match &*proxy.raw().data() {
        RawData::Map(table) => f(table),
        _ => unreachable!("map handler on non-map container"),
    }
}

fn write<R>(proxy: &Proxy, f: impl FnOnce(&mut Table) -> R) -> R {
    match &mut *proxy.raw().data_mut() {
        RawData::Map(table) => f(table),
        _ => unreachable!("map handler on non-map container"),
    }
}

pub(crate) fn get(proxy: &Proxy, key: &Value) -> Value {
    proxy.observer().use_prop(&PropKey::Entry(track_key(key)));
    let value = read(proxy, |table| {
        resolve_key(table, key)
            .and_then(|k| table.get(&k).map(|(_, v)| v.clone()))
            .unwrap_or_default()
    });
    wrap(proxy, value)
}

pub(crate) fn has(proxy: &Proxy, key: &Value) -> bool {
    proxy.observer().use_prop(&PropKey::Entry(track_key(key)));
    read(proxy, |table| resolve_key(table, key).is_some())
}

pub(crate) fn set(proxy: &Proxy, key: &Value, value: Value) -> Result<(), ReactiveError> {
    let value = unwrap(value);
    let tracked = PropKey::Entry(track_key(key));
    let existing = read(proxy, |table| resolve_key(table, key));

    match existing {
        Some(stored) => {
            let old = write(proxy, |table| {
                let stored_key = table.get(&stored).map(|(k, _)| k.clone()).unwrap_or_default();
                table
                    .insert(stored, (stored_key, value.clone()))
                    .map(|(_, old)| old)
                    .unwrap_or_default()
            });
            notify_change(proxy, tracked, old, value);
        }
        None => {
            let (stored, stored_key) = storage_key(key);
            write(proxy, |table| table.insert(stored, (stored_key, value.clone())));
            notify_structure(proxy, tracked, Value::Undefined, value, MutationMeta::Insert);
            notify_structure(
                proxy,
                PropKey::CollectionChange,
                Value::Undefined,
                key.clone(),
                MutationMeta::Insert,
            );
        }
    }
    Ok(())
}

pub(crate) fn delete(proxy: &Proxy, key: &Value) -> Result<bool, ReactiveError> {
    let Some(stored) = read(proxy, |table| resolve_key(table, key)) else {
        return Ok(false);
    };
    let old = write(proxy, |table| table.remove(&stored));
    let Some((_, old)) = old else {
        return Ok(false);
    };
    notify_structure(
        proxy,
        PropKey::Entry(track_key(key)),
        old,
        Value::Undefined,
        MutationMeta::Delete,
    );
    notify_structure(
        proxy,
        PropKey::CollectionChange,
        key.clone(),
        Value::Undefined,
        MutationMeta::Delete,
    );
    Ok(true)
}

pub(crate) fn clear(proxy: &Proxy) -> Result<(), ReactiveError> {
    let old_len = write(proxy, |table| {
        let len = table.len();
        table.clear();
        len
    });
    if old_len > 0 {
        clear_all(proxy, PropKey::CollectionChange, old_len);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::reactive::observer::Tracker;
    use crate::reactive::proxy::reactive;
    use crate::reactive::value::{RawObject, Value};

    #[test]
    fn test_object_key_round_trip() {
        let map = reactive(&RawObject::map());
        let key = RawObject::object();
        map.set(Value::Object(key.clone()), 7).unwrap();
        assert!(map.has(Value::Object(key.clone())));
        assert_eq!(map.get(Value::Object(key.clone())), Value::from(7));

        // The stored key is a proxy of the raw key.
        let stored: Vec<Value> = map.keys().collect();
        let Value::Proxy(stored) = &stored[0] else {
            panic!("expected proxied key");
        };
        assert!(stored.raw().ptr_eq(&key));

        // Looking up through that proxy reaches the same entry.
        assert_eq!(map.get(Value::Proxy(stored.clone())), Value::from(7));
        assert!(map.delete(Value::Object(key)).unwrap());
        assert!(map.is_empty());
    }

    #[test]
    fn test_overwrite_keeps_position_and_size() {
        let map = reactive(&RawObject::map());
        map.set("a", 1).unwrap();
        map.set("b", 2).unwrap();
        map.set("a", 3).unwrap();
        let keys: Vec<Value> = map.keys().collect();
        assert_eq!(keys, vec![Value::from("a"), Value::from("b")]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_size_reader_invalidated_by_insert_not_by_overwrite() {
        let map = reactive(&RawObject::map());
        map.set("a", 1).unwrap();
        let hits = Rc::new(Cell::new(0));
        let tracker = Tracker::new("size", {
            let hits = hits.clone();
            move || hits.set(hits.get() + 1)
        });
        tracker.run(|| map.len());
        map.set("a", 2).unwrap();
        assert_eq!(hits.get(), 0);
        map.set("b", 1).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_missing_delete_returns_false() {
        let map = reactive(&RawObject::map());
        assert!(!map.delete("nope").unwrap());
    }

    #[test]
    fn test_negative_zero_key() {
        let map = reactive(&RawObject::map());
        map.set(-0.0, "z").unwrap();
        assert_eq!(map.get(0.0), Value::from("z"));
    }
}
