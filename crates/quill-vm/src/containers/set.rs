//! The built-in `set` type : a mutable hash set.

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
        state.write_u64(hash_value(&self.0).expect("set member already checked hashable"));
    }
}

/// A mutable hash set, insertion-ordered on iteration.
pub struct QSet {
    entries: RwLock<OrderedMap<ValueKey, ()>>,
}

impl QSet {
    /// An empty set, tracked by `collector`.
    pub fn new(collector: &Collector) -> Gc<QSet> {
        Gc::new(QSet { entries: RwLock::new(OrderedMap::new()) }, collector, Generation::Young)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the set holds no members.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether `value` is a member. `Err` if its type has no hash slot.
    pub fn contains(&self, value: &Value) -> VmResult<bool> {
        hash_value(value)?;
        Ok(self.entries.read().contains_key(&ValueKey(value.clone())))
    }

    /// Add `value`, returning whether it was newly inserted.
    pub fn insert(&self, value: Value) -> VmResult<bool> {
        hash_value(&value)?;
        let key = ValueKey(value);
        let mut entries = self.entries.write();
        let was_present = entries.contains_key(&key);
        entries.insert(key, ());
        Ok(!was_present)
    }

    /// Remove `value`, returning whether it was present.
    pub fn remove(&self, value: &Value) -> VmResult<bool> {
        hash_value(value)?;
        Ok(self.entries.write().remove(&ValueKey(value.clone())).is_some())
    }
}

impl Trace for QSet {
    fn trace(&self, visit: &mut dyn FnMut(*const GcHeader)) {
        for (k, _) in self.entries.read().iter() {
            k.0.trace(visit);
        }
    }
}

impl ArObject for QSet {
    fn type_info(&self) -> Arc<TypeInfo> {
        set_type_info()
    }

    fn trace_values(&self, visit: &mut dyn FnMut(&Value)) {
        for (k, _) in self.entries.read().iter() {
            visit(&k.0);
        }
    }
}

fn as_qset(v: &Value) -> &QSet {
    match v {
        Value::Object(ObjectRef::Set(s)) => s,
        _ => unreachable!("set type slot invoked on a non-set value"),
    }
}

fn set_contains(v: &Value, member: &Value) -> VmResult<bool> {
    as_qset(v).contains(member)
}

fn set_repr(v: &Value) -> String {
    let s = as_qset(v);
    let entries = s.entries.read();
    if entries.is_empty() {
        return "set()".to_string();
    }
    let parts: Vec<String> = entries.iter().map(|(k, _)| crate::format::repr_value(&k.0)).collect();
    format!("{{{}}}", parts.join(", "))
}

/// The shared `TypeInfo` describing `set`.
pub fn set_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "set",
            qname: None,
            doc: Some("A mutable, insertion-ordered hash set."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None,
                compare: None,
                truthy: None,
                repr: Some(set_repr),
                str: None,
            },
            object: ObjectSlots::default(),
            subscript: SubscriptSlots {
                length: Some(|v| Ok(as_qset(v).len())),
                get_item: None,
                set_item: None,
                contains: Some(set_contains),
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
    fn insert_reports_novelty_and_remove_reports_presence() {
        let collector = Collector::new(GcConfig::default());
        let set = QSet::new(&collector);
        assert!(set.insert(Value::Int(1)).unwrap());
        assert!(!set.insert(Value::Int(1)).unwrap());
        assert_eq!(set.len(), 1);
        assert!(set.remove(&Value::Int(1)).unwrap());
        assert!(!set.remove(&Value::Int(1)).unwrap());
    }
}
