//! The built-in `namespace` container: an ordered
//! name/value mapping usable as a first-class value, distinct from
//! [`crate::object::Namespace`] which every heap object embeds as its
//! private attribute table. `QNamespace` is `Gc`-tracked (a namespace can
//! hold a reference back to itself or to a container that holds it) and
//! wraps one in a lock for interior mutability.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use quill_gc::{Collector, GcHeader, Generation, Trace};

use crate::error::{Error, VmResult};
use crate::gcbox::Gc;
use crate::object::{ArObject, Namespace};
use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};
use crate::value::{ObjectRef, Value};

/// A mutable, ordered name → value mapping, usable as a plain value in
/// addition to backing object attribute tables.
pub struct QNamespace {
    inner: RwLock<Namespace>,
}

impl QNamespace {
    /// An empty namespace container, tracked by `collector`.
    pub fn new(collector: &Collector) -> Gc<QNamespace> {
        Gc::new(QNamespace { inner: RwLock::new(Namespace::new()) }, collector, Generation::Young)
    }

    /// Look up `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().get(name).cloned()
    }

    /// Declare or overwrite `name`.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.inner.write().set(name, value);
    }

    /// Remove `name`, returning its value if present.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.inner.write().remove(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the namespace holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Trace for QNamespace {
    fn trace(&self, visit: &mut dyn FnMut(*const GcHeader)) {
        self.inner.read().trace(visit);
    }
}

impl ArObject for QNamespace {
    fn type_info(&self) -> Arc<TypeInfo> {
        namespace_type_info()
    }

    fn trace_values(&self, visit: &mut dyn FnMut(&Value)) {
        for (_, v) in self.inner.read().iter_all() {
            visit(v);
        }
    }

    fn get_attr(&self, name: &str) -> VmResult<Value> {
        self.get(name).ok_or_else(|| Error::attribute_error(format!("no such attribute '{name}'")))
    }
}

fn as_qnamespace(v: &Value) -> &QNamespace {
    match v {
        Value::Object(ObjectRef::Namespace(n)) => n,
        _ => unreachable!("namespace type slot invoked on a non-namespace value"),
    }
}

fn namespace_key_as_str(key: &Value) -> VmResult<&str> {
    match key {
        Value::Object(ObjectRef::Str(s)) => Ok(s.as_str()),
        _ => Err(Error::type_error("namespace keys must be strings")),
    }
}

fn namespace_get_item(v: &Value, key: &Value) -> VmResult<Value> {
    let name = namespace_key_as_str(key)?;
    as_qnamespace(v).get(name).ok_or_else(|| Error::key_error(format!("key not found: '{name}'")))
}

fn namespace_set_item(v: &Value, key: &Value, value: Value) -> VmResult<()> {
    let name = namespace_key_as_str(key)?.to_string();
    as_qnamespace(v).set(name, value);
    Ok(())
}

fn namespace_contains(v: &Value, key: &Value) -> VmResult<bool> {
    let name = namespace_key_as_str(key)?;
    Ok(as_qnamespace(v).get(name).is_some())
}

fn namespace_repr(v: &Value) -> String {
    let ns = as_qnamespace(v);
    let inner = ns.inner.read();
    let parts: Vec<String> =
        inner.iter_visible().map(|(k, val)| format!("{k}={}", crate::format::repr_value(val))).collect();
    format!("namespace({})", parts.join(", "))
}

/// The shared `TypeInfo` describing `namespace`.
pub fn namespace_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "namespace",
            qname: None,
            doc: Some("A mutable, ordered name/value mapping."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None,
                compare: None,
                truthy: None,
                repr: Some(namespace_repr),
                str: None,
            },
            object: ObjectSlots::default(),
            subscript: SubscriptSlots {
                length: Some(|v| Ok(as_qnamespace(v).len())),
                get_item: Some(namespace_get_item),
                set_item: Some(namespace_set_item),
                contains: Some(namespace_contains),
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
    fn set_get_and_remove_round_trip() {
        let collector = Collector::new(GcConfig::default());
        let ns = QNamespace::new(&collector);
        ns.set("a", Value::Int(1));
        assert!(matches!(ns.get("a"), Some(Value::Int(1))));
        assert!(matches!(ns.remove("a"), Some(Value::Int(1))));
        assert!(ns.get("a").is_none());
    }
}
