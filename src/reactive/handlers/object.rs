//! Plain object handler.
//!
//! Each property is its own key; adding or removing a property also notifies
//! the synthetic `OwnKeys` key that key enumeration depends on.

use super::{clear_all, name_of, notify_change, notify_structure, unwrap, wrap};
use crate::error::ReactiveError;
use crate::reactive::observer::MutationMeta;
use crate::reactive::proxy::Proxy;
use crate::reactive::value::{PropKey, RawData, Value};

pub(crate) fn get(proxy: &Proxy, key: &Value) -> Value {
    let name = name_of(key);
    proxy.observer().use_prop(&PropKey::Name(name.clone()));
    let value = match &*proxy.raw().data() {
        RawData::Object(table) => table.get(&name).cloned().unwrap_or_default(),
        _ => Value::Undefined,
    };
    wrap(proxy, value)
}

pub(crate) fn has(proxy: &Proxy, key: &Value) -> bool {
    let name = name_of(key);
    proxy.observer().use_prop(&PropKey::Name(name.clone()));
    match &*proxy.raw().data() {
        RawData::Object(table) => table.contains_key(&name),
        _ => false,
    }
}

pub(crate) fn len(proxy: &Proxy) -> usize {
    proxy.observer().use_prop(&PropKey::OwnKeys);
    proxy.raw().len()
}

pub(crate) fn set(proxy: &Proxy, key: &Value, value: Value) -> Result<(), ReactiveError> {
    let name = name_of(key);
    let value = unwrap(value);
    let previous = match &mut *proxy.raw().data_mut() {
        RawData::Object(table) => table.insert(name.clone(), value.clone()),
        _ => None,
    };
    let added = previous.is_none();
    notify_change(
        proxy,
        PropKey::Name(name.clone()),
        previous.unwrap_or_default(),
        value,
    );
    if added {
        notify_structure(
            proxy,
            PropKey::OwnKeys,
            Value::Undefined,
            Value::Str(name),
            MutationMeta::Insert,
        );
    }
    Ok(())
}

pub(crate) fn delete(proxy: &Proxy, key: &Value) -> Result<bool, ReactiveError> {
    let name = name_of(key);
    let removed = match &mut *proxy.raw().data_mut() {
        RawData::Object(table) => table.remove(&name),
        _ => None,
    };
    let Some(old) = removed else {
        return Ok(false);
    };
    notify_change(proxy, PropKey::Name(name.clone()), old, Value::Undefined);
    notify_structure(
        proxy,
        PropKey::OwnKeys,
        Value::Str(name),
        Value::Undefined,
        MutationMeta::Delete,
    );
    Ok(true)
}

pub(crate) fn clear(proxy: &Proxy) -> Result<(), ReactiveError> {
    let old_len = match &mut *proxy.raw().data_mut() {
        RawData::Object(table) => {
            let len = table.len();
            table.clear();
            len
        }
        _ => 0,
    };
    if old_len > 0 {
        clear_all(proxy, PropKey::OwnKeys, old_len);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::reactive::observer::{Mutation, Tracker};
    use crate::reactive::proxy::reactive;
    use crate::reactive::value::{RawObject, Value};

    #[test]
    fn test_identical_write_does_not_fire_watcher() {
        let obj = reactive(&RawObject::from_pairs([("k", 1)]));
        let hits = Rc::new(Cell::new(0));
        let _stop = obj.watch("k", {
            let hits = hits.clone();
            move |_| hits.set(hits.get() + 1)
        });
        obj.set("k", 1).unwrap();
        assert_eq!(hits.get(), 0);
        obj.set("k", 2).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_watchers_receive_old_and_new_in_order() {
        let obj = reactive(&RawObject::object());
        let log = Rc::new(RefCell::new(Vec::new()));
        let _a = obj.watch("n", {
            let log = log.clone();
            move |m: &Mutation| log.borrow_mut().push(("a", m.old.clone(), m.new.clone()))
        });
        let _b = obj.watch("n", {
            let log = log.clone();
            move |m: &Mutation| log.borrow_mut().push(("b", m.old.clone(), m.new.clone()))
        });
        obj.set("n", 5).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                ("a", Value::Undefined, Value::from(5)),
                ("b", Value::Undefined, Value::from(5)),
            ]
        );
    }

    #[test]
    fn test_key_enumeration_tracks_own_keys() {
        let obj = reactive(&RawObject::from_pairs([("a", 1)]));
        let hits = Rc::new(Cell::new(0));
        let tracker = Tracker::new("keys", {
            let hits = hits.clone();
            move || hits.set(hits.get() + 1)
        });
        tracker.run(|| obj.keys().count());
        obj.set("a", 2).unwrap();
        assert_eq!(hits.get(), 0, "value change is not a key change");
        obj.set("b", 1).unwrap();
        assert_eq!(hits.get(), 1);
        obj.delete("b").unwrap();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_nested_change_reaches_parent_listener() {
        let inner = RawObject::from_pairs([("x", 1)]);
        let outer = reactive(&RawObject::from_pairs([("inner", Value::Object(inner))]));
        let hits = Rc::new(Cell::new(0));
        outer.add_listener({
            let hits = hits.clone();
            Rc::new(move |_: &Mutation| hits.set(hits.get() + 1))
        });
        let Value::Proxy(nested) = outer.get("inner") else {
            panic!("expected nested proxy");
        };
        nested.set("x", 2).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_shallow_returns_raw_children() {
        let inner = RawObject::object();
        let outer = Value::object([("inner", Value::Object(inner.clone()))]);
        let Value::Proxy(shallow) = crate::reactive::shallow(&outer) else {
            panic!("expected proxy");
        };
        assert_eq!(shallow.get("inner"), Value::Object(inner));
    }
}
