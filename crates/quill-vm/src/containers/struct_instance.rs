//! An instance of a user-defined `struct` (`TypeNew` results). Cycle-capable like every other mutable container, so it is
//! `Gc`-tracked.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use quill_gc::{Collector, GcHeader, Generation, Trace};

use crate::error::{Error, VmResult};
use crate::gcbox::Gc;
use crate::object::{ArObject, Namespace};
use crate::type_info::TypeInfo;
use crate::value::Value;

/// A heap instance of a user-defined `struct` type: a `TypeInfo` reference
/// plus its own field namespace.
pub struct StructInstance {
    type_info: Arc<TypeInfo>,
    fields: RwLock<Namespace>,
}

impl StructInstance {
    /// A fresh instance of `type_info` with no fields set, tracked by
    /// `collector`. Field initialization (default values, `init` bodies)
    /// happens afterward through `set_field`.
    pub fn new(type_info: Arc<TypeInfo>, collector: &Collector) -> Gc<StructInstance> {
        Gc::new(StructInstance { type_info, fields: RwLock::new(Namespace::new()) }, collector, Generation::Young)
    }

    /// Read a field's value without falling back to the type's `tp_map`.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    /// Set a field's value directly, bypassing `CONST` enforcement (used
    /// during construction and by `Expr::SetAttr`'s runtime dispatch).
    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.fields.write().set(name, value);
    }
}

impl Trace for StructInstance {
    fn trace(&self, visit: &mut dyn FnMut(*const GcHeader)) {
        self.fields.read().trace(visit);
    }
}

impl ArObject for StructInstance {
    fn type_info(&self) -> Arc<TypeInfo> {
        self.type_info.clone()
    }

    fn trace_values(&self, visit: &mut dyn FnMut(&Value)) {
        for (_, v) in self.fields.read().iter_all() {
            visit(v);
        }
    }

    fn get_attr(&self, name: &str) -> VmResult<Value> {
        if let Some(v) = self.field(name) {
            return Ok(v);
        }
        if let Some(v) = self.type_info.tp_map.get(name) {
            return Ok(v.clone());
        }
        for ancestor in &self.type_info.mro {
            if let Some(v) = ancestor.tp_map.get(name) {
                return Ok(v.clone());
            }
        }
        Err(Error::attribute_error(format!(
            "'{}' object has no attribute '{name}'",
            self.type_info.display_name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags};
    use quill_gc::GcConfig;

    fn sample_type() -> Arc<TypeInfo> {
        Arc::new(TypeInfo {
            name: "Point",
            qname: None,
            doc: None,
            flags: TypeFlags::STRUCT,
            core: CoreSlots::default(),
            object: ObjectSlots::default(),
            subscript: SubscriptSlots::default(),
            ops: OpsSlots::default(),
            iter: IterSlots::default(),
            mro: Vec::new(),
            tp_map: Namespace::new(),
        })
    }

    #[test]
    fn field_read_after_write() {
        let collector = Collector::new(GcConfig::default());
        let inst = StructInstance::new(sample_type(), &collector);
        inst.set_field("x", Value::Int(3));
        assert!(matches!(inst.field("x"), Some(Value::Int(3))));
        assert!(inst.field("y").is_none());
    }

    #[test]
    fn get_attr_falls_back_to_type_map() {
        let mut map = Namespace::new();
        map.set("origin", Value::Int(0));
        let ty = Arc::new(TypeInfo {
            name: "Point",
            qname: None,
            doc: None,
            flags: TypeFlags::STRUCT,
            core: CoreSlots::default(),
            object: ObjectSlots::default(),
            subscript: SubscriptSlots::default(),
            ops: OpsSlots::default(),
            iter: IterSlots::default(),
            mro: Vec::new(),
            tp_map: map,
        });
        let collector = Collector::new(GcConfig::default());
        let inst = StructInstance::new(ty, &collector);
        assert!(matches!(inst.get_attr("origin").unwrap(), Value::Int(0)));
    }
}
