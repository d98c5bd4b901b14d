//! The built-in `tuple` type : an immutable, fixed-size sequence.

use std::sync::{Arc, OnceLock};

use quill_gc::Trace;

use crate::error::{Error, VmResult};
use crate::object::{ArObject, Namespace};
use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};
use crate::value::{ObjectRef, Value};

/// An immutable, fixed-size sequence of values.
pub struct QTuple {
    data: Vec<Value>,
}

impl QTuple {
    /// Wrap an owned element vector.
    pub fn new(data: Vec<Value>) -> Arc<QTuple> {
        Arc::new(QTuple { data })
    }

    /// Borrow the elements.
    pub fn as_slice(&self) -> &[Value] {
        &self.data
    }
}

impl Trace for QTuple {
    fn trace(&self, visit: &mut dyn FnMut(*const quill_gc::GcHeader)) {
        for v in &self.data {
            v.trace(visit);
        }
    }
}

impl ArObject for QTuple {
    fn type_info(&self) -> Arc<TypeInfo> {
        tuple_type_info()
    }

    fn trace_values(&self, visit: &mut dyn FnMut(&Value)) {
        for v in &self.data {
            visit(v);
        }
    }
}

fn as_qtuple(v: &Value) -> &QTuple {
    match v {
        Value::Object(ObjectRef::Tuple(t)) => t,
        _ => unreachable!("tuple type slot invoked on a non-tuple value"),
    }
}

fn index_to_usize(index: &Value, len: usize) -> VmResult<usize> {
    let raw = match index {
        Value::Int(i) => *i,
        Value::UInt(u) => *u as i64,
        _ => return Err(Error::type_error("tuple index must be an integer")),
    };
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved as usize >= len {
        return Err(Error::value_error("tuple index out of range"));
    }
    Ok(resolved as usize)
}

fn tuple_get_item(v: &Value, index: &Value) -> VmResult<Value> {
    let t = as_qtuple(v);
    let i = index_to_usize(index, t.data.len())?;
    Ok(t.data[i].clone())
}

fn tuple_repr(v: &Value) -> String {
    let t = as_qtuple(v);
    let parts: Vec<String> = t.data.iter().map(crate::format::repr_value).collect();
    if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    }
}

/// The shared `TypeInfo` describing `tuple`.
pub fn tuple_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "tuple",
            qname: None,
            doc: Some("An immutable, fixed-size sequence of values."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None, // delegates to `crate::hash::hash_value`'s Tuple arm
                compare: None,
                truthy: None,
                repr: Some(tuple_repr),
                str: None,
            },
            object: ObjectSlots::default(),
            subscript: SubscriptSlots {
                length: Some(|v| Ok(as_qtuple(v).data.len())),
                get_item: Some(tuple_get_item),
                set_item: None,
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

    #[test]
    fn get_item_supports_negative_indexing() {
        let t = Value::Object(ObjectRef::Tuple(QTuple::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)])));
        let got = tuple_get_item(&t, &Value::Int(-1)).unwrap();
        assert!(matches!(got, Value::Int(3)));
    }

    #[test]
    fn out_of_range_index_is_value_error() {
        let t = Value::Object(ObjectRef::Tuple(QTuple::new(vec![Value::Int(1)])));
        let err = tuple_get_item(&t, &Value::Int(5)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValueError);
    }
}
