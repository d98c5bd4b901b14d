//! The object model's attribute layer : every heap object
//! carries a [`Namespace`] of attribute slots, and [`ArObject`] is the
//! trait every heap-allocated runtime value implements so the interpreter
//! can reach its `TypeInfo` and participate in tracing.

use std::sync::Arc;

use quill_gc::Trace;

use crate::error::{Error, VmResult};
use crate::map::OrderedMap;
use crate::type_info::TypeInfo;
use crate::value::Value;

/// Per-attribute visibility/mutability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeFlags(u8);

impl AttributeFlags {
    /// No flags set.
    pub const NONE: AttributeFlags = AttributeFlags(0);
    /// Declared `const`: `SetAttr` on it is an `UnassignableError`.
    pub const CONST: AttributeFlags = AttributeFlags(1 << 0);
    /// Hidden from iteration/`dir()`-style reflection, but still reachable
    /// by direct name (used for dunder-ish internal slots).
    pub const HIDDEN: AttributeFlags = AttributeFlags(1 << 1);

    /// Whether `other`'s bits are all set.
    pub fn contains(self, other: AttributeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AttributeFlags {
    type Output = AttributeFlags;
    fn bitor(self, rhs: AttributeFlags) -> AttributeFlags {
        AttributeFlags(self.0 | rhs.0)
    }
}

/// A single stored attribute: its value plus the flags governing mutation.
#[derive(Clone)]
struct Slot {
    value: Value,
    flags: AttributeFlags,
}

/// An ordered name → value mapping backing every object's attribute
/// table, module globals, and the `namespace` container type itself.
/// Insertion order is preserved on iteration.
#[derive(Clone, Default)]
pub struct Namespace {
    entries: OrderedMap<String, Slot>,
}

impl Namespace {
    /// An empty namespace.
    pub fn new() -> Self {
        Namespace { entries: OrderedMap::new() }
    }

    /// Look up `name`, ignoring `HIDDEN`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|slot| &slot.value)
    }

    /// Declare or overwrite `name` with default (mutable, visible) flags.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.set_with_flags(name, value, AttributeFlags::NONE);
    }

    /// Declare or overwrite `name` with explicit flags. Overwriting
    /// preserves the slot's existing flags unless `flags` is non-empty,
    /// matching `const` declarations staying `const` across re-`Let`.
    pub fn set_with_flags(&mut self, name: impl Into<String>, value: Value, flags: AttributeFlags) {
        let name = name.into();
        if let Some(existing) = self.entries.get_mut(&name) {
            existing.value = value;
            if flags != AttributeFlags::NONE {
                existing.flags = flags;
            }
        } else {
            self.entries.insert(name, Slot { value, flags });
        }
    }

    /// Assign to an existing attribute, honoring `CONST` ( assigning to a `const` attribute is an `UnassignableError`).
    pub fn assign(&mut self, name: &str, value: Value) -> VmResult<()> {
        match self.entries.get_mut(name) {
            Some(slot) if slot.flags.contains(AttributeFlags::CONST) => {
                Err(Error::unassignable(format!("cannot assign to const attribute '{name}'")))
            }
            Some(slot) => {
                slot.value = value;
                Ok(())
            }
            None => Err(Error::attribute_error(format!("no such attribute '{name}'"))),
        }
    }

    /// Remove an attribute, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name).map(|slot| slot.value)
    }

    /// Number of attributes, including hidden ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the namespace holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs visible to reflection, in insertion order.
    pub fn iter_visible(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .filter(|(_, slot)| !slot.flags.contains(AttributeFlags::HIDDEN))
            .map(|(k, slot)| (k.as_str(), &slot.value))
    }

    /// Iterate every `(name, value)` pair, hidden or not (used by tracing).
    pub fn iter_all(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, slot)| (k.as_str(), &slot.value))
    }

    /// Copy every entry of `other` into `self`, overwriting any name
    /// already present ("a clone with filter mask selectively copies entries for trait composition"; `TypeInit` calls this once per ancestor, nearest-first, so the type's own members always win).
    pub fn merge_from(&mut self, other: &Namespace) {
        for (name, slot) in other.entries.iter() {
            self.entries.insert(name.clone(), slot.clone());
        }
    }
}

impl Trace for Namespace {
    fn trace(&self, visit: &mut dyn FnMut(*const quill_gc::GcHeader)) {
        for (_, slot) in self.entries.iter() {
            slot.value.trace(visit);
        }
    }
}

/// A heap-allocated runtime object: anything reachable as `Value::Object`.
///
/// Every concrete container (`List`, `Dict`, `Set`, user-defined struct
/// instance, etc.) implements this trait; the interpreter and the garbage
/// collector only ever see it through `&dyn ArObject`.
pub trait ArObject: Send + Sync {
    /// The type descriptor this instance was constructed from.
    fn type_info(&self) -> Arc<TypeInfo>;

    /// Visit every `Value` this object directly holds, for GC tracing and
    /// for the default attribute-lookup path. Containers with no nested
    /// values (`String`, `Bytes`) return without visiting anything.
    fn trace_values(&self, visit: &mut dyn FnMut(&Value));

    /// Default attribute lookup: consult the instance's own namespace,
    /// then the type's `tp_map`, then each ancestor in MRO order. Types
    /// with an `object.get_attr` slot should call that instead of this
    /// default.
    fn get_attr(&self, name: &str) -> VmResult<Value> {
        if let Some(ns) = self.namespace() {
            if let Some(v) = ns.get(name) {
                return Ok(v.clone());
            }
        }
        let ty = self.type_info();
        if let Some(v) = ty.tp_map.get(name) {
            return Ok(v.clone());
        }
        for ancestor in &ty.mro {
            if let Some(v) = ancestor.tp_map.get(name) {
                return Ok(v.clone());
            }
        }
        Err(Error::attribute_error(format!(
            "'{}' object has no attribute '{name}'",
            ty.display_name()
        )))
    }

    /// The instance's own attribute namespace, if it has one (most
    /// built-in containers other than `Namespace` itself do not).
    fn namespace(&self) -> Option<&Namespace> {
        None
    }

    /// Mutable access to the instance's own namespace, for `SetAttr`.
    fn namespace_mut(&mut self) -> Option<&mut Namespace> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_preserves_insertion_order() {
        let mut ns = Namespace::new();
        ns.set("z", Value::Int(1));
        ns.set("a", Value::Int(2));
        ns.set("m", Value::Int(3));
        let names: Vec<&str> = ns.iter_visible().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn const_attribute_rejects_assignment() {
        let mut ns = Namespace::new();
        ns.set_with_flags("pi", Value::Decimal(3.14), AttributeFlags::CONST);
        let err = ns.assign("pi", Value::Int(0)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnassignableError);
    }

    #[test]
    fn hidden_attribute_excluded_from_visible_iteration() {
        let mut ns = Namespace::new();
        ns.set("visible", Value::Nil);
        ns.set_with_flags("secret", Value::Nil, AttributeFlags::HIDDEN);
        let names: Vec<&str> = ns.iter_visible().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["visible"]);
        assert_eq!(ns.iter_all().count(), 2);
    }
}
