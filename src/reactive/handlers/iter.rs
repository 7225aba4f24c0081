//! Live iterators over a proxy.
//!
//! Iterators hold a position, not a snapshot: entries added behind the
//! cursor are seen, removed ones are skipped. Every `next()` re-reads the
//! structural key (`length`, own keys or `CollectionChange`) so a consumer
//! iterating inside a tracked scope depends on the collection's structure.
//! [`Entries`] and [`Values`] read each yielded entry like `get`, so they
//! also depend on every value they saw. [`Keys`] depends on structure only.
//! Containers are wrapped like any other read.

use super::{prop_key, wrap};
use crate::reactive::proxy::Proxy;
use crate::reactive::value::{ContainerKind, PropKey, RawData, Value};

/// Iterator over `(key, value)` pairs.
///
/// Arrays yield `(index, element)`, objects `(name, value)`, maps
/// `(key, value)` and sets `(member, member)`.
pub struct Entries {
    proxy: Proxy,
    pos: usize,
    track_values: bool,
}

impl Entries {
    pub(crate) fn new(proxy: Proxy) -> Self {
        Self {
            proxy,
            pos: 0,
            track_values: true,
        }
    }

    fn keys_only(proxy: Proxy) -> Self {
        Self {
            proxy,
            pos: 0,
            track_values: false,
        }
    }

    fn touch(&self) -> bool {
        let key = match self.proxy.kind() {
            ContainerKind::Array => PropKey::Length,
            ContainerKind::Object => PropKey::OwnKeys,
            ContainerKind::Map | ContainerKind::Set => PropKey::CollectionChange,
            ContainerKind::WeakMap | ContainerKind::WeakSet => return false,
        };
        self.proxy.observer().use_prop(&key);
        true
    }

    /// Raw pair at the cursor, advancing past tombstones.
    fn next_raw(&mut self) -> Option<(Value, Value)> {
        let data = self.proxy.raw().data();
        loop {
            let pos = self.pos;
            self.pos += 1;
            match &*data {
                RawData::Array(items) => {
                    return items.get(pos).map(|v| (Value::from(pos), v.clone()));
                }
                RawData::Object(table) => match table.slot(pos)? {
                    Some((k, v)) => return Some((Value::Str(k.clone()), v.clone())),
                    None => continue,
                },
                RawData::Map(table) => match table.slot(pos)? {
                    Some((_, (k, v))) => return Some((k.clone(), v.clone())),
                    None => continue,
                },
                RawData::Set(table) => match table.slot(pos)? {
                    Some((_, v)) => return Some((v.clone(), v.clone())),
                    None => continue,
                },
                RawData::WeakMap(_) | RawData::WeakSet(_) => return None,
            }
        }
    }
}

impl Iterator for Entries {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.touch() {
            return None;
        }
        let (key, value) = self.next_raw()?;
        if self.track_values {
            self.proxy.observer().use_prop(&prop_key(self.proxy.kind(), &key));
        }
        Some((wrap(&self.proxy, key), wrap(&self.proxy, value)))
    }
}

/// Key iterator. See [`Entries`].
pub struct Keys(Entries);

impl Keys {
    pub(crate) fn new(proxy: Proxy) -> Self {
        Keys(Entries::keys_only(proxy))
    }
}

impl Iterator for Keys {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.0.next().map(|(k, _)| k)
    }
}

/// Value iterator. See [`Entries`].
pub struct Values(Entries);

impl Values {
    pub(crate) fn new(proxy: Proxy) -> Self {
        Values(Entries::new(proxy))
    }
}

impl Iterator for Values {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.0.next().map(|(_, v)| v)
    }
}
