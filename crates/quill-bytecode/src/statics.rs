//! The bytecode-level static-constant pool.
//!
//! `StaticValue` is deliberately poorer than the runtime object model in
//! `quill-vm`: the compiler only ever needs to describe a handful of
//! literal shapes (plus nested function constants for closures), so the
//! bytecode crate doesn't depend on the full object model at all.
//! `quill-vm`'s loader is responsible for materializing each
//! `StaticValue` into a real heap object the first time a `Code` is
//! loaded.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::code::Code;

/// One entry in a `Code` object's static pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StaticValue {
    /// The nil literal.
    Nil,
    /// A boolean literal.
    Bool(bool),
    /// A signed integer literal.
    Int(i64),
    /// An unsigned integer literal.
    UInt(u64),
    /// A decimal (floating point) literal.
    Decimal(f64),
    /// A UTF-8 string literal.
    String(Box<str>),
    /// A byte-string literal.
    Bytes(Vec<u8>),
    /// A nested function's compiled code (closures reference their body
    /// through the enclosing function's static pool).
    Code(Arc<Code>),
}

impl StaticValue {
    /// A short, type-name-only label, useful for disassembly listings.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StaticValue::Nil => "nil",
            StaticValue::Bool(_) => "bool",
            StaticValue::Int(_) => "int",
            StaticValue::UInt(_) => "uint",
            StaticValue::Decimal(_) => "decimal",
            StaticValue::String(_) => "string",
            StaticValue::Bytes(_) => "bytes",
            StaticValue::Code(_) => "code",
        }
    }
}

/// The append-only builder side of a static pool, used by the compiler
/// while emitting a function (constant folding needs to intern results and decrement retired operands' usage counts).
#[derive(Debug, Clone, Default)]
pub struct StaticsPool {
    values: Vec<StaticValue>,
    /// Usage (reference) count per slot, so the optimizer can tell when a
    /// constant folded away has become dead and free its slot.
    usage: Vec<u32>,
}

impl StaticsPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        StaticsPool::default()
    }

    /// Intern a value, returning its index. Does not deduplicate: callers
    /// that want interning (e.g. small-integer/short-string reuse) look
    /// up an existing index themselves first.
    pub fn push(&mut self, value: StaticValue) -> u32 {
        self.values.push(value);
        self.usage.push(1);
        (self.values.len() - 1) as u32
    }

    /// Increment a slot's usage count (another instruction now references it).
    pub fn retain(&mut self, idx: u32) {
        self.usage[idx as usize] += 1;
    }

    /// Decrement a slot's usage count; returns the new count.
    pub fn release(&mut self, idx: u32) -> u32 {
        let u = &mut self.usage[idx as usize];
        *u = u.saturating_sub(1);
        *u
    }

    /// Current usage count of a slot.
    pub fn usage_of(&self, idx: u32) -> u32 {
        self.usage[idx as usize]
    }

    /// Value at `idx`.
    pub fn get(&self, idx: u32) -> &StaticValue {
        &self.values[idx as usize]
    }

    /// Number of entries, live or dead.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the pool has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compact the pool, dropping zero-usage slots and returning the
    /// `old_index -> new_index` remap the caller must apply to every
    /// instruction argument that indexes the static pool ( "compact the static pool and rewrite every instruction whose argument indexes it").
    pub fn compact(&mut self) -> Vec<Option<u32>> {
        let mut remap = Vec::with_capacity(self.values.len());
        let mut new_values = Vec::new();
        let mut new_usage = Vec::new();
        for (value, usage) in self.values.drain(..).zip(self.usage.drain(..)) {
            if usage == 0 {
                remap.push(None);
            } else {
                remap.push(Some(new_values.len() as u32));
                new_values.push(value);
                new_usage.push(usage);
            }
        }
        self.values = new_values;
        self.usage = new_usage;
        remap
    }

    /// Freeze into the immutable `Vec<StaticValue>` a finished `Code` stores.
    pub fn into_values(self) -> Vec<StaticValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_drops_dead_slots_and_remaps() {
        let mut pool = StaticsPool::new();
        let a = pool.push(StaticValue::Int(1));
        let b = pool.push(StaticValue::Int(2));
        let c = pool.push(StaticValue::Int(3));
        pool.release(b); // b becomes dead (usage 1 -> 0)
        assert_eq!(pool.usage_of(a), 1);
        assert_eq!(pool.usage_of(b), 0);

        let remap = pool.compact();
        assert_eq!(remap[a as usize], Some(0));
        assert_eq!(remap[b as usize], None);
        assert_eq!(remap[c as usize], Some(1));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn retain_and_release_track_usage() {
        let mut pool = StaticsPool::new();
        let a = pool.push(StaticValue::Bool(true));
        pool.retain(a);
        assert_eq!(pool.usage_of(a), 2);
        assert_eq!(pool.release(a), 1);
        assert_eq!(pool.release(a), 0);
    }
}
