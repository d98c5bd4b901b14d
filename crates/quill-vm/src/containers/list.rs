//! The built-in `list` type : a mutable, growable sequence.
//!
//! Cycle-capable (a list can hold itself), so it is [`Gc`]-tracked rather
//! than `Arc`-wrapped; interior mutability is a `parking_lot::RwLock`
//! since `Gc<T>` only ever hands out `&T`.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use quill_gc::{Collector, GcHeader, Generation, Trace};

use crate::error::{Error, VmResult};
use crate::gcbox::Gc;
use crate::object::{ArObject, Namespace};
use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};
use crate::value::{ObjectRef, Value};

/// A mutable, growable sequence of values.
pub struct QList {
    items: RwLock<Vec<Value>>,
}

impl QList {
    /// An empty list, tracked by `collector`.
    pub fn new(collector: &Collector) -> Gc<QList> {
        Gc::new(QList { items: RwLock::new(Vec::new()) }, collector, Generation::Young)
    }

    /// A list pre-populated with `items`, tracked by `collector`.
    pub fn from_vec(items: Vec<Value>, collector: &Collector) -> Gc<QList> {
        Gc::new(QList { items: RwLock::new(items) }, collector, Generation::Young)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the list holds no elements.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Append a value.
    pub fn push(&self, value: Value) {
        self.items.write().push(value);
    }

    /// Remove and return the last element, if any.
    pub fn pop(&self) -> Option<Value> {
        self.items.write().pop()
    }

    /// Read element `index` (negative indexes from the end).
    pub fn get(&self, index: &Value) -> VmResult<Value> {
        let items = self.items.read();
        let i = resolve_index(index, items.len())?;
        Ok(items[i].clone())
    }

    /// Overwrite element `index` (negative indexes from the end).
    pub fn set(&self, index: &Value, value: Value) -> VmResult<()> {
        let mut items = self.items.write();
        let i = resolve_index(index, items.len())?;
        items[i] = value;
        Ok(())
    }
}

fn resolve_index(index: &Value, len: usize) -> VmResult<usize> {
    let raw = match index {
        Value::Int(i) => *i,
        Value::UInt(u) => *u as i64,
        _ => return Err(Error::type_error("list index must be an integer")),
    };
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved as usize >= len {
        return Err(Error::value_error("list index out of range"));
    }
    Ok(resolved as usize)
}

impl Trace for QList {
    fn trace(&self, visit: &mut dyn FnMut(*const GcHeader)) {
        for v in self.items.read().iter() {
            v.trace(visit);
        }
    }
}

impl ArObject for QList {
    fn type_info(&self) -> Arc<TypeInfo> {
        list_type_info()
    }

    fn trace_values(&self, visit: &mut dyn FnMut(&Value)) {
        for v in self.items.read().iter() {
            visit(v);
        }
    }
}

fn as_qlist(v: &Value) -> &QList {
    match v {
        Value::Object(ObjectRef::List(l)) => l,
        _ => unreachable!("list type slot invoked on a non-list value"),
    }
}

fn list_get_item(v: &Value, index: &Value) -> VmResult<Value> {
    as_qlist(v).get(index)
}

fn list_set_item(v: &Value, index: &Value, value: Value) -> VmResult<()> {
    as_qlist(v).set(index, value)
}

fn list_repr(v: &Value) -> String {
    let l = as_qlist(v);
    let items = l.items.read();
    let parts: Vec<String> = items.iter().map(crate::format::repr_value).collect();
    format!("[{}]", parts.join(", "))
}

/// The shared `TypeInfo` describing `list`.
pub fn list_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "list",
            qname: None,
            doc: Some("A mutable, growable sequence of values."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None,
                compare: None,
                truthy: None,
                repr: Some(list_repr),
                str: None,
            },
            object: ObjectSlots::default(),
            subscript: SubscriptSlots {
                length: Some(|v| Ok(as_qlist(v).len())),
                get_item: Some(list_get_item),
                set_item: Some(list_set_item),
                contains: None,
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
    fn push_pop_and_negative_index() {
        let collector = Collector::new(GcConfig::default());
        let list = QList::new(&collector);
        list.push(Value::Int(1));
        list.push(Value::Int(2));
        list.push(Value::Int(3));
        assert_eq!(list.len(), 3);
        let last = list.get(&Value::Int(-1)).unwrap();
        assert!(matches!(last, Value::Int(3)));
        assert!(matches!(list.pop(), Some(Value::Int(3))));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn set_out_of_range_is_value_error() {
        let collector = Collector::new(GcConfig::default());
        let list = QList::new(&collector);
        list.push(Value::Int(1));
        let err = list.set(&Value::Int(4), Value::Int(0)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValueError);
    }
}
