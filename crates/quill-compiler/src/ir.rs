//! Basic-block graph IR built by [`crate::codegen`], consumed
//! by [`crate::optimizer`], and linearized by [`crate::assemble`].
//!
//! Blocks hold a list of
//! `Instr` records, jumps reference destination blocks rather than byte
//! offsets until assembly, and a `JBlock` stack tracks loop/label scopes.

use quill_bytecode::Opcode;

/// Index of a [`BasicBlock`] within a [`TranslationUnit`].
pub type BlockId = usize;

/// One not-yet-linearized instruction: an opcode, its 24-bit argument, an
/// optional jump target, and the source line it came from.
#[derive(Debug, Clone)]
pub struct Instr {
    /// The opcode.
    pub op: Opcode,
    /// Immediate argument (meaning depends on `op`; ignored for jumps,
    /// which address `jump_target` instead).
    pub arg: u32,
    /// For jump opcodes, the destination block.
    pub jump_target: Option<BlockId>,
    /// Source line, for the line-mapping table.
    pub line: u32,
}

impl Instr {
    /// Construct a non-jump instruction.
    pub fn new(op: Opcode, arg: u32, line: u32) -> Self {
        Instr { op, arg, jump_target: None, line }
    }

    /// Construct a jump instruction targeting `target`.
    pub fn jump(op: Opcode, target: BlockId, line: u32) -> Self {
        Instr { op, arg: 0, jump_target: Some(target), line }
    }
}

/// A basic block: a straight-line instruction sequence with at most one
/// exit jump, falling through to the next block in layout order
/// otherwise.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    /// This block's instructions, in order.
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    /// Whether this block's only content is a single unconditional jump
    /// (jump-threading: these blocks are elided, retargeting through them).
    pub fn is_trivial_jump(&self) -> Option<BlockId> {
        if let [Instr { op: Opcode::Jmp, jump_target: Some(target), .. }] = self.instrs.as_slice() {
            Some(*target)
        } else {
            None
        }
    }

    /// Whether this block has no instructions at all (also elided during
    /// jump threading).
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }
}

/// Why a [`JBlock`] scope was pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JBlockKind {
    /// A `while`/`loop` body.
    Loop,
    /// A `sync` block (needs a sync-key pop on unwind).
    Sync,
    /// A `trap` block (needs exception-scope bookkeeping on unwind).
    Trap,
}

/// One entry of the translation unit's jump-scope stack ( "loop/label scopes for break/continue resolution and deferred-cleanup bookkeeping").
#[derive(Debug, Clone)]
pub struct JBlock {
    /// What introduced this scope.
    pub kind: JBlockKind,
    /// Block a `break` inside this scope jumps to.
    pub break_target: BlockId,
    /// Block a `continue` inside this scope jumps to (loops only).
    pub continue_target: Option<BlockId>,
    /// Number of `POPGT` cleanup slots (sync-key releases, pending defers)
    /// a `break`/`continue`/`return` crossing this scope's boundary must
    /// emit before jumping out.
    pub pops_on_exit: u32,
}

/// Tracks the operand stack's current depth and running-maximum
/// requirement as instructions are emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackTracker {
    /// Current simulated depth.
    pub current: i32,
    /// Maximum depth seen so far.
    pub required: u32,
}

impl StackTracker {
    /// Apply a net stack-depth delta, updating the running maximum.
    pub fn apply(&mut self, delta: i32) {
        self.current += delta;
        debug_assert!(self.current >= 0, "operand stack underflow during codegen");
        if self.current as u32 > self.required {
            self.required = self.current as u32;
        }
    }
}

/// An append-only, order-preserving name table (globals/locals/enclosed).
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: Vec<String>,
}

impl NameTable {
    /// Intern `name`, returning its index (reuses an existing entry).
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return i as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    /// Freeze into the `Vec<String>` a `Code` object stores.
    pub fn into_vec(self) -> Vec<String> {
        self.names
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// One function (or the module body) being compiled: owns the
/// basic-block graph, the jump-scope stack, and the per-function name
/// tables and stack trackers.
pub struct TranslationUnit {
    /// Blocks in layout order; block 0 is the entry block.
    pub blocks: Vec<BasicBlock>,
    /// Currently-open block instructions are appended to.
    pub current: BlockId,
    /// Open loop/sync/trap scopes, innermost last.
    pub jblocks: Vec<JBlock>,
    /// Static constant pool (literals, nested `Code`).
    pub statics: quill_bytecode::StaticsPool,
    /// Global (module-level) name table.
    pub globals: NameTable,
    /// Local variable name table.
    pub locals: NameTable,
    /// Enclosed (closure-captured) name table.
    pub enclosed: NameTable,
    /// Operand stack tracker.
    pub stack: StackTracker,
    /// Sync-key stack tracker (monitor handles held across `sync` blocks).
    pub sync_stack: StackTracker,
    /// Next local slot to assign.
    pub next_local_slot: u32,
    /// Recorded `trap` scopes: `(body_start, body_end, handler_entry)`
    /// block triples, resolved to byte offsets during assembly.
    /// `body_end` is the first block *after* the trap body (exclusive),
    /// matching `TrapEntry`'s half-open range.
    pub trap_entries: Vec<(BlockId, BlockId, BlockId)>,
}

impl TranslationUnit {
    /// Start a unit with a single empty entry block.
    pub fn new() -> Self {
        TranslationUnit {
            blocks: vec![BasicBlock::default()],
            current: 0,
            jblocks: Vec::new(),
            statics: quill_bytecode::StaticsPool::new(),
            globals: NameTable::default(),
            locals: NameTable::default(),
            enclosed: NameTable::default(),
            stack: StackTracker::default(),
            sync_stack: StackTracker::default(),
            next_local_slot: 0,
            trap_entries: Vec::new(),
        }
    }

    /// Record a `trap` scope spanning blocks `[body_start, body_end)`,
    /// dispatching to `handler_entry` on an error raised inside.
    pub fn record_trap(&mut self, body_start: BlockId, body_end: BlockId, handler_entry: BlockId) {
        self.trap_entries.push((body_start, body_end, handler_entry));
    }

    /// Allocate a fresh, empty block (not yet reachable from anywhere).
    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::default());
        self.blocks.len() - 1
    }

    /// Switch the emission cursor to `block`.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Emit a non-jump instruction into the current block, applying its
    /// fixed stack effect if it has one.
    pub fn emit(&mut self, op: Opcode, arg: u32, line: u32) {
        if let Some(delta) = quill_bytecode::fixed_stack_effect(op) {
            self.stack.apply(delta);
        }
        self.blocks[self.current].instrs.push(Instr::new(op, arg, line));
    }

    /// Emit an instruction with an explicit stack-depth delta (used for
    /// argument-dependent opcodes: `CALL`, `MKDT`, `MKLT`, `MKST`, `MKTP`, `POPGT`).
    pub fn emit_with_effect(&mut self, op: Opcode, arg: u32, line: u32, delta: i32) {
        self.stack.apply(delta);
        self.blocks[self.current].instrs.push(Instr::new(op, arg, line));
    }

    /// Emit a jump instruction into the current block.
    pub fn emit_jump(&mut self, op: Opcode, target: BlockId, line: u32) {
        if let Some(delta) = quill_bytecode::fixed_stack_effect(op) {
            self.stack.apply(delta);
        }
        self.blocks[self.current].instrs.push(Instr::jump(op, target, line));
    }

    /// Push a loop scope.
    pub fn push_loop(&mut self, break_target: BlockId, continue_target: BlockId) {
        self.jblocks.push(JBlock {
            kind: JBlockKind::Loop,
            break_target,
            continue_target: Some(continue_target),
            pops_on_exit: 0,
        });
    }

    /// Push a `sync`/`trap` scope that only `break`s through via unwinding
    /// (no direct break target of its own, but cleanup is owed on exit).
    pub fn push_cleanup_scope(&mut self, kind: JBlockKind, pops: u32) {
        let break_target = self.jblocks.last().map(|j| j.break_target).unwrap_or(0);
        self.jblocks.push(JBlock { kind, break_target, continue_target: None, pops_on_exit: pops });
    }

    /// Pop the innermost jump scope.
    pub fn pop_jblock(&mut self) -> Option<JBlock> {
        self.jblocks.pop()
    }

    /// Nearest enclosing loop scope, for `break`/`continue` resolution.
    pub fn innermost_loop(&self) -> Option<&JBlock> {
        self.jblocks.iter().rev().find(|j| j.kind == JBlockKind::Loop)
    }

    /// Total pending cleanup slots between the current point and the
    /// nearest enclosing loop, used to emit `POPGT` before a
    /// `break`/`continue` jumps out.
    pub fn pops_until_loop(&self) -> u32 {
        self.jblocks.iter().rev().take_while(|j| j.kind != JBlockKind::Loop).map(|j| j.pops_on_exit).sum()
    }
}

impl Default for TranslationUnit {
    fn default() -> Self {
        Self::new()
    }
}
