//! Dynamic values and raw containers.
//!
//! A [`Value`] is either a primitive or a reference to a container. Raw
//! containers ([`RawObject`]) are plain shared data with no tracking at all;
//! wrapping one with [`create_proxy`](super::create_proxy) yields a
//! [`Proxy`] whose reads and writes are observed.
//!
//! Containers never carry hidden bookkeeping: observers live in a side-table
//! keyed by container identity, so enumerating a raw container only ever
//! yields user data.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use super::proxy::Proxy;
use super::same::is_same;

// =============================================================================
// Value
// =============================================================================

/// A dynamically typed value flowing through state, props and containers.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// Untracked container.
    Object(RawObject),
    /// Tracked wrapper around a container.
    Proxy(Proxy),
}

impl Value {
    /// Build a plain object value from key/value pairs.
    pub fn object<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        Value::Object(RawObject::from_pairs(pairs))
    }

    /// Build an array value.
    pub fn array<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Value::Object(RawObject::from_values(values))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// True for containers, tracked or not.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// The underlying container, looking through proxies.
    pub fn as_raw(&self) -> Option<&RawObject> {
        match self {
            Value::Object(raw) => Some(raw),
            Value::Proxy(p) => Some(p.raw()),
            _ => None,
        }
    }

    /// JS-style truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Proxy(_) => true,
        }
    }

    /// The canonical type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(raw) => raw.kind().name(),
            Value::Proxy(p) => p.kind().name(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        is_same(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n:?})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(raw) => write!(f, "Object({}@{:#x})", raw.kind().name(), raw.addr()),
            Value::Proxy(p) => write!(f, "Proxy({}@{:#x})", p.kind().name(), p.raw().addr()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(raw) => write!(f, "[object {}]", raw.kind().name()),
            Value::Proxy(p) => write!(f, "[object {}]", p.kind().name()),
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        write!(f, "NaN")
    } else if n.is_infinite() {
        write!(f, "{}Infinity", if n < 0.0 { "-" } else { "" })
    } else if n == n.trunc() && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<RawObject> for Value {
    fn from(raw: RawObject) -> Self {
        Value::Object(raw)
    }
}

impl From<Proxy> for Value {
    fn from(p: Proxy) -> Self {
        Value::Proxy(p)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Undefined, Into::into)
    }
}

// =============================================================================
// Keys
// =============================================================================

/// Hashable identity of a value under same-value-zero.
///
/// Used as the key of Map and Set entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    /// Raw container, by address.
    Object(usize),
    /// Proxy wrapper, by address (distinct from its raw container).
    Proxy(usize),
}

impl ValueKey {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => ValueKey::Undefined,
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Number(n) => {
                let n = if *n == 0.0 {
                    0.0
                } else if n.is_nan() {
                    f64::NAN
                } else {
                    *n
                };
                ValueKey::Number(n.to_bits())
            }
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Object(raw) => ValueKey::Object(raw.addr()),
            Value::Proxy(p) => ValueKey::Proxy(p.addr()),
        }
    }
}

/// A key an observer tracks dependencies under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// Named property of a plain object.
    Name(Rc<str>),
    /// Array element.
    Index(usize),
    /// Map/Set/WeakMap/WeakSet entry.
    Entry(ValueKey),
    /// Synthetic array length.
    Length,
    /// Synthetic key set of a plain object.
    OwnKeys,
    /// Synthetic structure of a Map or Set; iteration and size depend on it.
    CollectionChange,
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Name(Rc::from(name))
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Index(index)
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Name(name) => write!(f, "{name}"),
            PropKey::Index(i) => write!(f, "{i}"),
            PropKey::Entry(key) => write!(f, "{key:?}"),
            PropKey::Length => write!(f, "length"),
            PropKey::OwnKeys => write!(f, "[[OwnKeys]]"),
            PropKey::CollectionChange => write!(f, "_collectionChange"),
        }
    }
}

// =============================================================================
// Ordered table
// =============================================================================

/// Insertion-ordered hash table with stable slot positions.
///
/// Removed entries leave a tombstone so live iterators keep their place;
/// tombstones are compacted away once they dominate the table.
#[derive(Clone)]
pub(crate) struct OrderedTable<K, V> {
    slots: Vec<Option<(K, V)>>,
    index: AHashMap<K, usize>,
}

impl<K: Hash + Eq + Clone, V> Default for OrderedTable<K, V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: AHashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Clone, V> OrderedTable<K, V> {
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        let pos = *self.index.get(key)?;
        self.slots[pos].as_ref().map(|(_, v)| v)
    }

    /// Insert or replace in place. Returns the previous value.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&pos) = self.index.get(&key) {
            if let Some((_, slot)) = self.slots[pos].as_mut() {
                return Some(std::mem::replace(slot, value));
            }
        }
        self.slots.push(Some((key.clone(), value)));
        self.index.insert(key, self.slots.len() - 1);
        None
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        let pos = self.index.remove(key)?;
        let (_, value) = self.slots[pos].take()?;
        if self.slots.len() > 32 && self.index.len() * 2 < self.slots.len() {
            self.compact();
        }
        Some(value)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    /// Slot at `pos`: `None` past the end, `Some(None)` for a tombstone.
    pub(crate) fn slot(&self, pos: usize) -> Option<Option<(&K, &V)>> {
        self.slots
            .get(pos)
            .map(|slot| slot.as_ref().map(|(k, v)| (k, v)))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots.iter().flatten().map(|(k, v)| (k, v))
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        for (pos, slot) in self.slots.iter().enumerate() {
            if let Some((key, _)) = slot {
                self.index.insert(key.clone(), pos);
            }
        }
    }
}

// =============================================================================
// Raw containers
// =============================================================================

/// The kind of a container, decided once when the container is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Array,
    Object,
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl ContainerKind {
    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::Array => "Array",
            ContainerKind::Object => "Object",
            ContainerKind::Map => "Map",
            ContainerKind::Set => "Set",
            ContainerKind::WeakMap => "WeakMap",
            ContainerKind::WeakSet => "WeakSet",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) enum RawData {
    Array(Vec<Value>),
    Object(OrderedTable<Rc<str>, Value>),
    /// Entry key -> (key as stored, value).
    Map(OrderedTable<ValueKey, (Value, Value)>),
    Set(OrderedTable<ValueKey, Value>),
    /// Raw key address -> (weak key, value).
    WeakMap(AHashMap<usize, (WeakRaw, Value)>),
    WeakSet(AHashMap<usize, WeakRaw>),
}

impl RawData {
    fn kind(&self) -> ContainerKind {
        match self {
            RawData::Array(_) => ContainerKind::Array,
            RawData::Object(_) => ContainerKind::Object,
            RawData::Map(_) => ContainerKind::Map,
            RawData::Set(_) => ContainerKind::Set,
            RawData::WeakMap(_) => ContainerKind::WeakMap,
            RawData::WeakSet(_) => ContainerKind::WeakSet,
        }
    }
}

/// A shared, untracked container.
#[derive(Clone)]
pub struct RawObject(Rc<RefCell<RawData>>);

/// Weak reference to a raw container.
#[derive(Clone)]
pub struct WeakRaw(Weak<RefCell<RawData>>);

impl WeakRaw {
    pub fn upgrade(&self) -> Option<RawObject> {
        self.0.upgrade().map(RawObject)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl RawObject {
    fn new(data: RawData) -> Self {
        RawObject(Rc::new(RefCell::new(data)))
    }

    pub fn object() -> Self {
        Self::new(RawData::Object(OrderedTable::default()))
    }

    pub fn array() -> Self {
        Self::new(RawData::Array(Vec::new()))
    }

    pub fn map() -> Self {
        Self::new(RawData::Map(OrderedTable::default()))
    }

    pub fn set() -> Self {
        Self::new(RawData::Set(OrderedTable::default()))
    }

    pub fn weak_map() -> Self {
        Self::new(RawData::WeakMap(AHashMap::new()))
    }

    pub fn weak_set() -> Self {
        Self::new(RawData::WeakSet(AHashMap::new()))
    }

    /// Plain object from key/value pairs (later duplicates win).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        let mut table = OrderedTable::default();
        for (k, v) in pairs {
            table.insert(k.into(), v.into());
        }
        Self::new(RawData::Object(table))
    }

    pub fn from_values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::new(RawData::Array(values.into_iter().map(Into::into).collect()))
    }

    /// Map from key/value pairs. Keys are stored as given.
    pub fn map_from(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut table = OrderedTable::default();
        for (k, v) in pairs {
            table.insert(ValueKey::of(&k), (k, v));
        }
        Self::new(RawData::Map(table))
    }

    pub fn set_from(values: impl IntoIterator<Item = Value>) -> Self {
        let mut table = OrderedTable::default();
        for v in values {
            table.insert(ValueKey::of(&v), v);
        }
        Self::new(RawData::Set(table))
    }

    pub fn kind(&self) -> ContainerKind {
        self.0.borrow().kind()
    }

    /// Identity of this container.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &RawObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakRaw {
        WeakRaw(Rc::downgrade(&self.0))
    }

    pub(crate) fn data(&self) -> Ref<'_, RawData> {
        self.0.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, RawData> {
        self.0.borrow_mut()
    }

    /// Own entries of a plain object, in insertion order. Empty for other kinds.
    pub fn object_entries(&self) -> Vec<(Rc<str>, Value)> {
        match &*self.data() {
            RawData::Object(table) => table.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }

    /// Elements of an array. Empty for other kinds.
    pub fn array_values(&self) -> Vec<Value> {
        match &*self.data() {
            RawData::Array(items) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Untracked read of a named property of a plain object.
    pub fn field(&self, name: &str) -> Value {
        match &*self.data() {
            RawData::Object(table) => table.get(&Rc::from(name)).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Number of own entries / elements.
    pub fn len(&self) -> usize {
        match &*self.data() {
            RawData::Array(items) => items.len(),
            RawData::Object(table) => table.len(),
            RawData::Map(table) => table.len(),
            RawData::Set(table) => table.len(),
            RawData::WeakMap(entries) => entries.values().filter(|(k, _)| k.is_alive()).count(),
            RawData::WeakSet(entries) => entries.values().filter(|k| k.is_alive()).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawObject({}@{:#x})", self.kind().name(), self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_display() {
        assert_eq!(Value::from(1).to_string(), "1");
        assert_eq!(Value::from(-0.0).to_string(), "0");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::from(f64::NEG_INFINITY).to_string(), "-Infinity");
    }

    #[test]
    fn test_value_key_same_value_zero() {
        assert_eq!(ValueKey::of(&Value::from(0.0)), ValueKey::of(&Value::from(-0.0)));
        assert_eq!(ValueKey::of(&Value::from(f64::NAN)), ValueKey::of(&Value::from(f64::NAN)));
        assert_ne!(ValueKey::of(&Value::from(1)), ValueKey::of(&Value::from("1")));
    }

    #[test]
    fn test_ordered_table_keeps_positions() {
        let mut table: OrderedTable<i32, &str> = OrderedTable::default();
        table.insert(1, "a");
        table.insert(2, "b");
        table.insert(3, "c");
        table.remove(&2);
        assert!(matches!(table.slot(1), Some(None)));
        assert_eq!(table.insert(1, "z"), Some("a"));
        let keys: Vec<i32> = table.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 3]);
    }

    #[test]
    fn test_ordered_table_compacts() {
        let mut table: OrderedTable<usize, usize> = OrderedTable::default();
        for i in 0..40 {
            table.insert(i, i);
        }
        for i in 0..30 {
            table.remove(&i);
        }
        assert_eq!(table.len(), 10);
        assert_eq!(table.get(&35), Some(&35));
        assert_eq!(table.iter().count(), 10);
    }

    #[test]
    fn test_raw_object_has_no_hidden_keys() {
        let raw = RawObject::from_pairs([("a", 1), ("b", 2)]);
        let _proxy = crate::reactive::create_proxy(&Value::Object(raw.clone()));
        let keys: Vec<String> = raw.object_entries().iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
