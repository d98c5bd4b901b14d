//! `TypeNew`/`TraitNew`/`TypeInit`.
//!
//! A `TypeInfo` is built in two steps: allocate it with its own slots
//! and an empty `mro`, then call `TypeInit`, which
//! computes the C3 linearization of its declared bases, flattens every
//! ancestor's method table into `tp_map`, and sets the `INITIALIZED` flag
//! — guarded so a second `TypeInit` call on the same pointer is a no-op.
//!
//! `TypeInfo` here is an immutable, `Arc`-shared capability descriptor —
//! no raw pointers, no slot table to mutate in place — so there is
//! nothing left to do a second time: [`type_init`] builds the
//! finished, `INITIALIZED` descriptor in a single pass. It is idempotent
//! in the Rust-native sense — calling it twice with equal inputs produces
//! two equal (if not identical) descriptors — rather than by mutating a
//! shared pointer and checking a flag.

use std::sync::Arc;

use crate::error::{Error, VmResult};
use crate::object::Namespace;
use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};

/// Everything needed to finalize a user-defined `struct`/`trait`
/// via `TypeNew`/`TraitNew`.
pub struct TypeDraft {
    /// The type's bare name.
    pub name: &'static str,
    /// Fully qualified name, if distinct from `name`.
    pub qname: Option<&'static str>,
    /// Documentation string, if any.
    pub doc: Option<&'static str>,
    /// `STRUCT` for a `struct` declaration, `TRAIT` for a `trait`
    /// declaration (`flags`); `INITIALIZED` is added by
    /// [`type_init`] and should not be passed in here.
    pub kind: TypeFlags,
    /// Direct base traits, in declaration order ("base traits list"). Empty for a type with no `: Trait1, Trait2` clause.
    pub bases: Vec<Arc<TypeInfo>>,
    /// The type's own methods and static members, which take precedence
    /// over anything inherited from `bases` with the same name.
    pub own_members: Namespace,
}

/// Compute the C3 linearization of a type with direct bases `bases`
/// (`mro`).
///
/// Standard C3 merge: `L[C] = C + merge(L[B1], ..., L[Bn], [B1, ..., Bn])`,
/// repeatedly taking the head of the first list whose head does not occur
/// in the tail of any other list. A hierarchy with no consistent
/// linearization (e.g. two bases that disagree on a shared ancestor's
/// relative order) is a `TypeError`, not a panic — `TypeNew` is something
/// user code can trigger with an ordinary `struct` declaration.
pub fn c3_linearize(name: &'static str, bases: &[Arc<TypeInfo>]) -> VmResult<Vec<Arc<TypeInfo>>> {
    if bases.is_empty() {
        return Ok(Vec::new());
    }

    let mut sequences: Vec<Vec<Arc<TypeInfo>>> = bases
        .iter()
        .map(|base| {
            let mut seq = vec![base.clone()];
            seq.extend(base.mro.iter().cloned());
            seq
        })
        .collect();
    sequences.push(bases.to_vec());

    let mut mro = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            break;
        }

        let head = sequences.iter().map(|seq| &seq[0]).find(|candidate| {
            !sequences.iter().any(|seq| seq[1..].iter().any(|t| Arc::ptr_eq(t, candidate)))
        });

        let Some(head) = head.cloned() else {
            return Err(Error::type_error(format!(
                "cannot linearize '{name}': inconsistent trait hierarchy"
            )));
        };

        for seq in sequences.iter_mut() {
            seq.retain(|t| !Arc::ptr_eq(t, &head));
        }
        mro.push(head);
    }

    Ok(mro)
}

/// Finalize `draft` into an immutable, `INITIALIZED` `TypeInfo`.
///
/// Ancestors contribute their `tp_map` entries to the composed type in
/// reverse-MRO order (farthest ancestor first) so that nearer ancestors
/// override farther ones, and the type's own members are applied last so
/// they always win — "traits are composed by flattening their method
/// tables at type-init, never by runtime-object inheritance".
pub fn type_init(draft: TypeDraft) -> VmResult<Arc<TypeInfo>> {
    let mro = c3_linearize(draft.name, &draft.bases)?;

    let mut tp_map = Namespace::new();
    for ancestor in mro.iter().rev() {
        tp_map.merge_from(&ancestor.tp_map);
    }
    tp_map.merge_from(&draft.own_members);

    Ok(Arc::new(TypeInfo {
        name: draft.name,
        qname: draft.qname,
        doc: draft.doc,
        flags: draft.kind.union(TypeFlags::INITIALIZED),
        core: CoreSlots::default(),
        object: ObjectSlots::default(),
        subscript: SubscriptSlots::default(),
        ops: OpsSlots::default(),
        iter: IterSlots::default(),
        mro,
        tp_map,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &'static str, bases: Vec<Arc<TypeInfo>>) -> Arc<TypeInfo> {
        let mut members = Namespace::new();
        members.set("marker", crate::value::Value::Int(name.len() as i64));
        type_init(TypeDraft { name, qname: None, doc: None, kind: TypeFlags::TRAIT, bases, own_members: members }).unwrap()
    }

    #[test]
    fn single_inheritance_linearizes_to_base_then_ancestors() {
        let grandparent = leaf("Grandparent", Vec::new());
        let parent = leaf("Parent", vec![grandparent.clone()]);
        let child = type_init(TypeDraft {
            name: "Child",
            qname: None,
            doc: None,
            kind: TypeFlags::STRUCT,
            bases: vec![parent.clone()],
            own_members: Namespace::new(),
        })
        .unwrap();

        let names: Vec<&str> = child.mro.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Parent", "Grandparent"]);
        assert!(child.is_initialized());
    }

    #[test]
    fn diamond_hierarchy_linearizes_without_duplicates() {
        let top = leaf("Top", Vec::new());
        let left = leaf("Left", vec![top.clone()]);
        let right = leaf("Right", vec![top.clone()]);
        let bottom = type_init(TypeDraft {
            name: "Bottom",
            qname: None,
            doc: None,
            kind: TypeFlags::STRUCT,
            bases: vec![left, right],
            own_members: Namespace::new(),
        })
        .unwrap();

        let names: Vec<&str> = bottom.mro.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Left", "Right", "Top"]);
    }

    #[test]
    fn own_members_override_inherited_ones_of_the_same_name() {
        let base = leaf("Base", Vec::new());
        let mut own = Namespace::new();
        own.set("marker", crate::value::Value::Int(-1));
        let derived =
            type_init(TypeDraft { name: "Derived", qname: None, doc: None, kind: TypeFlags::STRUCT, bases: vec![base], own_members: own })
                .unwrap();

        assert!(matches!(derived.tp_map.get("marker"), Some(crate::value::Value::Int(-1))));
    }

    #[test]
    fn inconsistent_hierarchy_reports_a_type_error() {
        // A declares [B, C]; D declares [C, B] -- no consistent order for B/C.
        let a = leaf("A", Vec::new());
        let b = leaf("B", vec![a.clone()]);
        let c = leaf("C", vec![a.clone()]);
        let bc = leaf("BC", vec![b.clone(), c.clone()]);
        let cb = leaf("CB", vec![c, b]);
        let err = c3_linearize("Bad", &[bc, cb]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }
}
