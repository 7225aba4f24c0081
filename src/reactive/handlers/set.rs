//! Set handler. Members are stored like Map keys.

use super::{clear_all, notify_structure, resolve_key, storage_key, track_key};
use crate::error::ReactiveError;
use crate::reactive::observer::MutationMeta;
use crate::reactive::proxy::Proxy;
use crate::reactive::value::{OrderedTable, PropKey, RawData, Value, ValueKey};

type Table = OrderedTable<ValueKey, Value>;

fn read<R>(proxy: &Proxy, f: impl FnOnce(&Table) -> R) -> R {
    match &*proxy.raw().data() {
        RawData::Set(table) => f(table),
        _ => unreachable!("set handler on non-set container"),
    }
}

fn write<R>(proxy: &Proxy, f: impl FnOnce(&mut Table) -> R) -> R {
    match &mut *proxy.raw().data_mut() {
        RawData::Set(table) => f(table),
        _ => unreachable!("set handler on non-set container"),
    }
}

pub(crate) fn has(proxy: &Proxy, value: &Value) -> bool {
    proxy.observer().use_prop(&PropKey::Entry(track_key(value)));
    read(proxy, |table| resolve_key(table, value).is_some())
}

/// Adding an existing member is a no-op.
pub(crate) fn add(proxy: &Proxy, value: Value) -> Result<(), ReactiveError> {
    if read(proxy, |table| resolve_key(table, &value).is_some()) {
        return Ok(());
    }
    let (stored, member) = storage_key(&value);
    write(proxy, |table| table.insert(stored, member));
    notify_structure(
        proxy,
        PropKey::Entry(track_key(&value)),
        Value::Undefined,
        value.clone(),
        MutationMeta::Insert,
    );
    notify_structure(
        proxy,
        PropKey::CollectionChange,
        Value::Undefined,
        value,
        MutationMeta::Insert,
    );
    Ok(())
}

pub(crate) fn delete(proxy: &Proxy, value: &Value) -> Result<bool, ReactiveError> {
    let Some(stored) = read(proxy, |table| resolve_key(table, value)) else {
        return Ok(false);
    };
    if write(proxy, |table| table.remove(&stored)).is_none() {
        return Ok(false);
    }
    notify_structure(
        proxy,
        PropKey::Entry(track_key(value)),
        value.clone(),
        Value::Undefined,
        MutationMeta::Delete,
    );
    notify_structure(
        proxy,
        PropKey::CollectionChange,
        value.clone(),
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
    fn test_size_reflects_add_and_invalidates_size_reader() {
        let set = reactive(&RawObject::set());
        let hits = Rc::new(Cell::new(0));
        let tracker = Tracker::new("size", {
            let hits = hits.clone();
            move || hits.set(hits.get() + 1)
        });
        assert_eq!(tracker.run(|| set.len()), 0);
        set.add("x").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_duplicate_add_is_silent() {
        let set = reactive(&RawObject::set());
        set.add(1).unwrap();
        let hits = Rc::new(Cell::new(0));
        let _stop = set.watch_key(crate::reactive::PropKey::CollectionChange, {
            let hits = hits.clone();
            move |_| hits.set(hits.get() + 1)
        });
        set.add(1).unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_object_member_resolves_from_raw() {
        let set = reactive(&RawObject::set());
        let member = RawObject::object();
        set.add(Value::Object(member.clone())).unwrap();
        assert!(set.has(Value::Object(member.clone())));
        assert!(set.delete(Value::Object(member)).unwrap());
        assert!(set.is_empty());
    }

    #[test]
    fn test_clear_invalidates_member_readers() {
        let set = reactive(&RawObject::set());
        set.add("a").unwrap();
        let hits = Rc::new(Cell::new(0));
        let tracker = Tracker::new("has", {
            let hits = hits.clone();
            move || hits.set(hits.get() + 1)
        });
        tracker.run(|| set.has("a"));
        set.clear().unwrap();
        assert_eq!(hits.get(), 1);
        assert!(!set.has("a"));
    }
}
