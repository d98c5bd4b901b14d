//! The built-in `bytes` type : an immutable byte string.

use std::sync::{Arc, OnceLock};

use quill_gc::Trace;

use crate::object::{ArObject, Namespace};
use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};
use crate::value::Value;

/// An immutable byte sequence.
pub struct QBytes {
    data: Vec<u8>,
}

impl QBytes {
    /// Wrap an owned byte vector.
    pub fn new(data: Vec<u8>) -> Arc<QBytes> {
        Arc::new(QBytes { data })
    }

    /// Borrow the contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Trace for QBytes {
    fn trace(&self, _visit: &mut dyn FnMut(*const quill_gc::GcHeader)) {}
}

impl ArObject for QBytes {
    fn type_info(&self) -> Arc<TypeInfo> {
        bytes_type_info()
    }

    fn trace_values(&self, _visit: &mut dyn FnMut(&Value)) {}
}

fn as_qbytes(v: &Value) -> &QBytes {
    match v {
        Value::Object(crate::value::ObjectRef::Bytes(b)) => b,
        _ => unreachable!("bytes type slot invoked on a non-bytes value"),
    }
}

/// The shared `TypeInfo` describing `bytes`.
pub fn bytes_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "bytes",
            qname: None,
            doc: Some("An immutable sequence of bytes."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None,
                compare: None,
                truthy: None,
                repr: Some(|v| format!("{:?}", as_qbytes(v).as_slice())),
                str: None,
            },
            object: ObjectSlots::default(),
            subscript: SubscriptSlots {
                length: Some(|v| Ok(as_qbytes(v).as_slice().len())),
                get_item: None,
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
