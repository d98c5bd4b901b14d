//! The `Code` object: a fully linearized, assembled function body.
//!
//! No register count, no upvalue-capture descriptors beyond a flat
//! enclosed-names tuple, and a packed line-map rather than a
//! per-instruction source-offset table.

use serde::{Deserialize, Serialize};

use crate::instruction::{decode, Opcode};
use crate::linemap::{self, LineEntry};
use crate::statics::StaticValue;

/// Per-function flags (frame fields / call shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFlags {
    /// Accepts a variadic trailing positional list.
    pub variadic: bool,
    /// Accepts a trailing keyword-argument dict.
    pub kwargs: bool,
    /// Defined with `async`/generator semantics (frame may float).
    pub generator: bool,
    /// Top-level module code rather than a function body.
    pub is_module: bool,
}

/// One `trap` body's exception-dispatch range : a byte-offset
/// half-open range `[start, end)` within `instructions`, and the byte
/// offset of the first handler to try when an error escapes an
/// instruction inside that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapEntry {
    /// First covered byte offset, inclusive.
    pub start: u32,
    /// First uncovered byte offset, exclusive.
    pub end: u32,
    /// Byte offset of the handler chain's first block.
    pub handler: u32,
}

/// A compiled function body, fully assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Code {
    /// Source name, for diagnostics (`<anonymous>` if unset).
    pub name: Option<String>,
    /// Linearized instruction stream.
    pub instructions: Vec<u8>,
    /// Static constant pool (literals and nested `Code` closures).
    pub statics: Vec<StaticValue>,
    /// Global (module-level) name table, indexed by `LDGBL`/`LDATTR`/etc.
    pub globals: Vec<String>,
    /// Local variable name table, indexed by `LDLC`.
    pub locals: Vec<String>,
    /// Enclosed (closure-captured) name table, indexed by `LDENC`.
    pub enclosed: Vec<String>,
    /// Parameter names, a prefix of `locals`.
    pub params: Vec<String>,
    /// Maximum operand stack depth this function requires.
    pub stack_size: u32,
    /// Maximum sync-key (monitor handle) stack depth (`sync` block nesting).
    pub sync_stack_size: u32,
    /// Number of local variable slots (`locals.len()`, kept explicit since
    /// the compiler computes it before the name table is finalized).
    pub locals_count: u32,
    /// Packed line-mapping stream (see [`crate::linemap`]).
    pub line_map: Vec<u8>,
    /// Source line the function begins on, the line-map's decode anchor.
    pub start_line: u32,
    /// Behavioral flags.
    pub flags: CodeFlags,
    /// `trap` body ranges and their handler entry points ,
    /// outermost-declared first. Checked innermost-first by the
    /// interpreter, so entries whose range nests inside another entry's
    /// range must appear after it in this vector.
    pub trap_table: Vec<TrapEntry>,
}

impl Code {
    /// Iterate decoded `(opcode, arg, offset)` triples over the whole body.
    pub fn instructions_iter(&self) -> InstructionIter<'_> {
        InstructionIter { code: &self.instructions, offset: 0 }
    }

    /// The innermost [`TrapEntry`] covering `offset`, if any ( an error raised mid-frame is dispatched to the nearest enclosing handler). Entries are scanned in reverse so a nested trap's
    /// narrower range wins over an outer one that also covers `offset`.
    pub fn trap_entry_for(&self, offset: u32) -> Option<&TrapEntry> {
        self.trap_table.iter().rev().find(|t| offset >= t.start && offset < t.end)
    }

    /// Decode the line-map stream into `(offset, line)` breakpoints.
    pub fn line_entries(&self) -> Vec<LineEntry> {
        linemap::decode(&self.line_map, self.start_line)
    }

    /// Source line active at a given bytecode offset.
    pub fn line_at(&self, offset: u32) -> u32 {
        linemap::line_for_offset(&self.line_entries(), self.start_line, offset)
    }

    /// Display name, falling back to `<anonymous>` (diagnostics).
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

/// Iterator over a `Code`'s decoded instructions.
pub struct InstructionIter<'c> {
    code: &'c [u8],
    offset: usize,
}

impl Iterator for InstructionIter<'_> {
    type Item = (Opcode, u32, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (op, arg, len) = decode(self.code, self.offset)?;
        let at = self.offset;
        self.offset += len;
        Some((op, arg, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::encode;

    fn sample_code() -> Code {
        let mut instructions = Vec::new();
        encode(Opcode::LStatic, 0, &mut instructions);
        encode(Opcode::LStatic, 1, &mut instructions);
        encode(Opcode::Add, 0, &mut instructions);
        encode(Opcode::Ret, 0, &mut instructions);

        Code {
            name: Some("add_two".to_string()),
            instructions,
            statics: vec![StaticValue::Int(1), StaticValue::Int(2)],
            globals: vec![],
            locals: vec![],
            enclosed: vec![],
            params: vec![],
            stack_size: 2,
            sync_stack_size: 0,
            locals_count: 0,
            line_map: Vec::new(),
            start_line: 1,
            flags: CodeFlags::default(),
            trap_table: Vec::new(),
        }
    }

    #[test]
    fn instructions_iter_decodes_full_body() {
        let code = sample_code();
        let ops: Vec<Opcode> = code.instructions_iter().map(|(op, _, _)| op).collect();
        assert_eq!(ops, vec![Opcode::LStatic, Opcode::LStatic, Opcode::Add, Opcode::Ret]);
    }

    #[test]
    fn display_name_falls_back_to_anonymous() {
        let mut code = sample_code();
        code.name = None;
        assert_eq!(code.display_name(), "<anonymous>");
    }

    #[test]
    fn line_at_uses_start_line_before_any_entry() {
        let code = sample_code();
        assert_eq!(code.line_at(0), 1);
    }

    #[test]
    fn trap_entry_for_prefers_innermost_nested_range() {
        let mut code = sample_code();
        code.trap_table =
            vec![TrapEntry { start: 0, end: 20, handler: 100 }, TrapEntry { start: 4, end: 8, handler: 200 }];
        assert_eq!(code.trap_entry_for(5).unwrap().handler, 200);
        assert_eq!(code.trap_entry_for(10).unwrap().handler, 100);
        assert!(code.trap_entry_for(25).is_none());
    }
}
