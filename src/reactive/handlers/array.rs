//! Array handler.
//!
//! Index keys and the synthetic `length` key are tracked separately. Any
//! write notifies the indices whose values changed, in ascending order, and
//! then `length` if it changed.

use super::{ArraySlot, array_slot, clear_all, notify_change, unwrap, wrap};
use crate::error::ReactiveError;
use crate::reactive::observer::{Mutation, MutationMeta};
use crate::reactive::proxy::Proxy;
use crate::reactive::same::is_same;
use crate::reactive::value::{ContainerKind, PropKey, RawData, Value};

/// Longest array a write may produce. Higher indices are rejected instead
/// of resizing the backing vector.
pub(crate) const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

fn out_of_bounds(index: usize, len: usize) -> ReactiveError {
    ReactiveError::IndexOutOfBounds { index, len }
}

fn unsupported(op: &'static str) -> ReactiveError {
    ReactiveError::Unsupported {
        op,
        kind: ContainerKind::Array,
    }
}

/// Run `f` on the backing vector. Every caller holds the proxy's kind.
fn with_items<R>(proxy: &Proxy, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    match &mut *proxy.raw().data_mut() {
        RawData::Array(items) => f(items),
        _ => unreachable!("array handler on non-array container"),
    }
}

fn read_items<R>(proxy: &Proxy, f: impl FnOnce(&[Value]) -> R) -> R {
    match &*proxy.raw().data() {
        RawData::Array(items) => f(items),
        _ => unreachable!("array handler on non-array container"),
    }
}

pub(crate) fn len(proxy: &Proxy) -> usize {
    proxy.observer().use_prop(&PropKey::Length);
    read_items(proxy, |items| items.len())
}

pub(crate) fn get(proxy: &Proxy, key: &Value) -> Value {
    match array_slot(key) {
        ArraySlot::Index(i) => {
            proxy.observer().use_prop(&PropKey::Index(i));
            let value = read_items(proxy, |items| items.get(i).cloned().unwrap_or_default());
            wrap(proxy, value)
        }
        ArraySlot::Length => Value::from(len(proxy)),
        ArraySlot::Other => Value::Undefined,
    }
}

pub(crate) fn has(proxy: &Proxy, key: &Value) -> bool {
    match array_slot(key) {
        ArraySlot::Index(i) => {
            proxy.observer().use_prop(&PropKey::Index(i));
            read_items(proxy, |items| i < items.len())
        }
        ArraySlot::Length => true,
        ArraySlot::Other => false,
    }
}

pub(crate) fn set(proxy: &Proxy, key: &Value, value: Value) -> Result<(), ReactiveError> {
    match array_slot(key) {
        ArraySlot::Index(i) => set_index(proxy, i, unwrap(value)),
        ArraySlot::Length => match value.as_number() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 => set_len(proxy, n as usize),
            _ => Err(unsupported("set length to a non-index")),
        },
        ArraySlot::Other => Err(unsupported("set named property")),
    }
}

fn set_index(proxy: &Proxy, index: usize, value: Value) -> Result<(), ReactiveError> {
    if index >= MAX_ARRAY_LENGTH {
        return Err(out_of_bounds(index, read_items(proxy, |items| items.len())));
    }
    let (old, old_len, new_len) = with_items(proxy, |items| {
        let old_len = items.len();
        if index >= old_len {
            items.resize(index + 1, Value::Undefined);
        }
        let old = std::mem::replace(&mut items[index], value.clone());
        (old, old_len, items.len())
    });
    notify_change(proxy, PropKey::Index(index), old, value);
    notify_change(proxy, PropKey::Length, Value::from(old_len), Value::from(new_len));
    Ok(())
}

/// Replace the whole contents, notifying per changed index then `length`.
fn replace_items(proxy: &Proxy, f: impl FnOnce(&mut Vec<Value>)) {
    let (before, after) = with_items(proxy, |items| {
        let before = items.clone();
        f(items);
        (before, items.clone())
    });
    let span = before.len().max(after.len());
    for i in 0..span {
        let old = before.get(i).cloned().unwrap_or_default();
        let new = after.get(i).cloned().unwrap_or_default();
        if is_same(&old, &new) {
            continue;
        }
        let meta = if i >= after.len() {
            Some(MutationMeta::Delete)
        } else if i >= before.len() {
            Some(MutationMeta::Insert)
        } else {
            None
        };
        let mutation = Mutation::new(PropKey::Index(i), old, new);
        let mutation = match meta {
            Some(meta) => mutation.with_meta(meta),
            None => mutation,
        };
        proxy.observer().set_prop(&mutation);
    }
    notify_change(
        proxy,
        PropKey::Length,
        Value::from(before.len()),
        Value::from(after.len()),
    );
}

pub(crate) fn set_len(proxy: &Proxy, len: usize) -> Result<(), ReactiveError> {
    if len > MAX_ARRAY_LENGTH {
        return Err(out_of_bounds(len, read_items(proxy, |items| items.len())));
    }
    replace_items(proxy, |items| items.resize(len, Value::Undefined));
    Ok(())
}

pub(crate) fn push(proxy: &Proxy, value: Value) -> Result<usize, ReactiveError> {
    let index = read_items(proxy, |items| items.len());
    set_index(proxy, index, unwrap(value))?;
    Ok(index + 1)
}

pub(crate) fn pop(proxy: &Proxy) -> Result<Value, ReactiveError> {
    let last = read_items(proxy, |items| items.last().cloned());
    let Some(last) = last else {
        return Ok(Value::Undefined);
    };
    replace_items(proxy, |items| {
        items.pop();
    });
    Ok(wrap(proxy, last))
}

pub(crate) fn insert(proxy: &Proxy, index: usize, value: Value) -> Result<(), ReactiveError> {
    let len = read_items(proxy, |items| items.len());
    if index > len || len >= MAX_ARRAY_LENGTH {
        return Err(out_of_bounds(index, len));
    }
    let value = unwrap(value);
    replace_items(proxy, |items| items.insert(index, value));
    Ok(())
}

pub(crate) fn remove(proxy: &Proxy, index: usize) -> Result<Value, ReactiveError> {
    let len = read_items(proxy, |items| items.len());
    if index >= len {
        return Err(out_of_bounds(index, len));
    }
    let mut removed = Value::Undefined;
    replace_items(proxy, |items| removed = items.remove(index));
    Ok(wrap(proxy, removed))
}

/// Leave a hole at `key`: the element becomes `undefined`, length is kept.
pub(crate) fn delete(proxy: &Proxy, key: &Value) -> Result<bool, ReactiveError> {
    let ArraySlot::Index(i) = array_slot(key) else {
        return Err(unsupported("delete"));
    };
    let old = with_items(proxy, |items| items.get_mut(i).map(std::mem::take));
    let Some(old) = old else {
        return Ok(false);
    };
    notify_change(proxy, PropKey::Index(i), old, Value::Undefined);
    Ok(true)
}

pub(crate) fn clear(proxy: &Proxy) -> Result<(), ReactiveError> {
    let old_len = with_items(proxy, |items| {
        let len = items.len();
        items.clear();
        len
    });
    if old_len > 0 {
        clear_all(proxy, PropKey::Length, old_len);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::MAX_ARRAY_LENGTH;
    use crate::error::ReactiveError;
    use crate::reactive::observer::Mutation;
    use crate::reactive::proxy::reactive;
    use crate::reactive::value::{PropKey, RawObject, Value};

    fn recorder(proxy: &crate::reactive::Proxy) -> Rc<RefCell<Vec<PropKey>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        proxy.add_listener({
            let log = log.clone();
            Rc::new(move |m: &Mutation| log.borrow_mut().push(m.key.clone()))
        });
        log
    }

    #[test]
    fn test_growth_notifies_index_then_length() {
        let proxy = reactive(&RawObject::from_values([1, 2]));
        let log = recorder(&proxy);
        proxy.set(4, 9).unwrap();
        assert_eq!(*log.borrow(), vec![PropKey::Index(4), PropKey::Length]);
        assert_eq!(proxy.len(), 5);
        assert_eq!(proxy.get(3), Value::Undefined);
    }

    #[test]
    fn test_growth_with_undefined_only_notifies_length() {
        let proxy = reactive(&RawObject::from_values([1]));
        let log = recorder(&proxy);
        proxy.set(2, Value::Undefined).unwrap();
        assert_eq!(*log.borrow(), vec![PropKey::Length]);
    }

    #[test]
    fn test_shrink_notifies_removed_defined_indices_ascending() {
        let proxy = reactive(&RawObject::from_values([
            Value::from(1),
            Value::Undefined,
            Value::from(3),
            Value::from(4),
        ]));
        let log = recorder(&proxy);
        proxy.set_len(1).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![PropKey::Index(2), PropKey::Index(3), PropKey::Length]
        );
    }

    #[test]
    fn test_same_value_write_is_silent() {
        let proxy = reactive(&RawObject::from_values([1]));
        let log = recorder(&proxy);
        proxy.set(0, 1).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_insert_and_remove_shift() {
        let proxy = reactive(&RawObject::from_values(["a", "c"]));
        proxy.insert(1, "b").unwrap();
        assert_eq!(proxy.raw().array_values(), vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(proxy.remove(0).unwrap(), Value::from("a"));
        assert_eq!(proxy.len(), 2);
        assert!(proxy.insert(9, "x").is_err());
    }

    #[test]
    fn test_push_pop() {
        let proxy = reactive(&RawObject::array());
        assert_eq!(proxy.push(1).unwrap(), 1);
        assert_eq!(proxy.push(2).unwrap(), 2);
        assert_eq!(proxy.pop().unwrap(), Value::from(2));
        assert_eq!(proxy.len(), 1);
    }

    #[test]
    fn test_delete_leaves_hole() {
        let proxy = reactive(&RawObject::from_values([1, 2]));
        assert!(proxy.delete(0).unwrap());
        assert_eq!(proxy.len(), 2);
        assert_eq!(proxy.get(0), Value::Undefined);
    }

    #[test]
    fn test_write_past_max_length_is_rejected() {
        let proxy = reactive(&RawObject::from_values([1, 2]));
        let log = recorder(&proxy);

        assert!(matches!(proxy.set(1.8e19, 1), Err(ReactiveError::IndexOutOfBounds { len: 2, .. })));
        assert!(matches!(proxy.set(1e11, 1), Err(ReactiveError::IndexOutOfBounds { len: 2, .. })));
        assert!(matches!(
            proxy.set(MAX_ARRAY_LENGTH as f64, 1),
            Err(ReactiveError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(proxy.set("length", 1e12), Err(ReactiveError::IndexOutOfBounds { .. })));
        assert!(proxy.set_len(MAX_ARRAY_LENGTH + 1).is_err());

        assert_eq!(proxy.len(), 2);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_nested_reads_are_proxied() {
        let inner = RawObject::from_values([1]);
        let proxy = reactive(&RawObject::from_values([Value::Object(inner.clone())]));
        let Value::Proxy(nested) = proxy.get(0) else {
            panic!("expected nested proxy");
        };
        assert!(nested.raw().ptr_eq(&inner));
    }
}
