//! The built-in `dict` type : a mutable hash-keyed map.
//!
//! Built on [`OrderedMap`] rather than a bespoke table, per's
//! load-factor-0.75/growth-factor-2 shape — `OrderedMap`'s tombstone
//! vector already gives insertion-ordered iteration and the periodic
//! `maybe_compact` amortized cleanup calls for, so there is no
//! separate growth-table logic to reimplement here.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use quill_gc::{Collector, GcHeader, Generation, Trace};

use crate::error::VmResult;
use crate::gcbox::Gc;
use crate::hash::{hash_value, values_equal};
use crate::map::OrderedMap;
use crate::object::{ArObject, Namespace};
use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};
use crate::value::{ObjectRef, Value};

/// A `Value` wrapper implementing `Hash`/`Eq` via the runtime's own
/// canonical hashing and equality , so a plain `OrderedMap` can
/// be keyed by arbitrary runtime values.
#[derive(Clone)]
struct ValueKey(Value);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        values_equal(&self.0, &other.0).unwrap_or(false)
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Callers only ever construct a `ValueKey` after `hash_value`
        // already succeeded once (dict/set reject unhashable keys at
        // insertion), so this can't observe an `Err` in practice.
        state.write_u64(hash_value(&self.0).expect("dict key already checked hashable"));
    }
}

/// A mutable hash-keyed mapping, insertion-ordered on iteration.
pub struct QDict {
    entries: RwLock<OrderedMap<ValueKey, Value>>,
}

impl QDict {
    /// An empty dict, tracked by `collector`.
    pub fn new(collector: &Collector) -> Gc<QDict> {
        Gc::new(QDict { entries: RwLock::new(OrderedMap::new()) }, collector, Generation::Young)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the dict holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Look up `key`. `Err` if `key`'s type has no hash slot.
    pub fn get(&self, key: &Value) -> VmResult<Option<Value>> {
        hash_value(key)?;
        Ok(self.entries.read().get(&ValueKey(key.clone())).cloned())
    }

    /// Whether `key` is present. `Err` if `key`'s type has no hash slot.
    pub fn contains(&self, key: &Value) -> VmResult<bool> {
        hash_value(key)?;
        Ok(self.entries.read().contains_key(&ValueKey(key.clone())))
    }

    /// Insert or overwrite `key -> value`, returning the previous value if
    /// any. `Err` if `key`'s type has no hash slot.
    pub fn insert(&self, key: Value, value: Value) -> VmResult<Option<Value>> {
        hash_value(&key)?;
        Ok(self.entries.write().insert(ValueKey(key), value))
    }

    /// Remove `key`, returning its value if present. `Err` if `key`'s type
    /// has no hash slot.
    pub fn remove(&self, key: &Value) -> VmResult<Option<Value>> {
        hash_value(key)?;
        Ok(self.entries.write().remove(&ValueKey(key.clone())))
    }
}

impl Trace for QDict {
    fn trace(&self, visit: &mut dyn FnMut(*const GcHeader)) {
        for (k, v) in self.entries.read().iter() {
            k.0.trace(visit);
            v.trace(visit);
        }
    }
}

impl ArObject for QDict {
    fn type_info(&self) -> Arc<TypeInfo> {
        dict_type_info()
    }

    fn trace_values(&self, visit: &mut dyn FnMut(&Value)) {
        for (k, v) in self.entries.read().iter() {
            visit(&k.0);
            visit(v);
        }
    }
}

fn as_qdict(v: &Value) -> &QDict {
    match v {
        Value::Object(ObjectRef::Dict(d)) => d,
        _ => unreachable!("dict type slot invoked on a non-dict value"),
    }
}

fn dict_get_item(v: &Value, key: &Value) -> VmResult<Value> {
    let d = as_qdict(v);
    match d.get(key)? {
        Some(value) => Ok(value),
        None => Err(crate::error::Error::key_error(format!("key not found: {}", crate::format::repr_value(key)))),
    }
}

fn dict_set_item(v: &Value, key: &Value, value: Value) -> VmResult<()> {
    as_qdict(v).insert(key.clone(), value)?;
    Ok(())
}

fn dict_contains(v: &Value, key: &Value) -> VmResult<bool> {
    as_qdict(v).contains(key)
}

fn dict_repr(v: &Value) -> String {
    let d = as_qdict(v);
    let entries = d.entries.read();
    let parts: Vec<String> = entries
        .iter()
        .map(|(k, val)| format!("{}: {}", crate::format::repr_value(&k.0), crate::format::repr_value(val)))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

/// The shared `TypeInfo` describing `dict`.
pub fn dict_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "dict",
            qname: None,
            doc: Some("A mutable, insertion-ordered hash-keyed mapping."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None,
                compare: None,
                truthy: None,
                repr: Some(dict_repr),
                str: None,
            },
            object: ObjectSlots::default(),
            subscript: SubscriptSlots {
                length: Some(|v| Ok(as_qdict(v).len())),
                get_item: Some(dict_get_item),
                set_item: Some(dict_set_item),
                contains: Some(dict_contains),
            },
            ops: OpsSlots::default(),
            iter: IterSlots::default(),
            mro: Vec::new(),
            tp_map: Namespace::new(),
        })
    })
    .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_gc::GcConfig;

    #[test]
    fn insert_get_and_remove_round_trip() {
        let collector = Collector::new(GcConfig::default());
        let dict = QDict::new(&collector);
        dict.insert(Value::Int(1), Value::Int(100)).unwrap();
        assert!(matches!(dict.get(&Value::Int(1)).unwrap(), Some(Value::Int(100))));
        assert_eq!(dict.remove(&Value::Int(1)).unwrap(), Some(Value::Int(100)));
        assert!(dict.get(&Value::Int(1)).unwrap().is_none());
    }

    #[test]
    fn numeric_keys_collapse_across_representations() {
        let collector = Collector::new(GcConfig::default());
        let dict = QDict::new(&collector);
        dict.insert(Value::Int(7), Value::Bool(true)).unwrap();
        let via_uint = dict.get(&Value::UInt(7)).unwrap();
        assert!(matches!(via_uint, Some(Value::Bool(true))));
    }

    #[test]
    fn unhashable_key_is_type_error() {
        let collector = Collector::new(GcConfig::default());
        let dict = QDict::new(&collector);
        let inner = QDict::new(&collector);
        let err = dict.insert(Value::Object(ObjectRef::Dict(inner)), Value::Nil).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }
}
