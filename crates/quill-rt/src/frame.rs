//! Per-fiber call-chain bookkeeping.
//!
//! `quill_vm::interpreter::Frame` already owns the fields the interpreter
//! touches every opcode (operand stack, locals, instruction pointer); it
//! is deliberately private to that crate so `quill-vm` stays usable
//! without a scheduler. What lives here is the *fiber-level* metadata
//! additionally calls for that only matters once multiple
//! fibers and monitors are in the picture: a lightweight [`FrameInfo`]
//! stack per fiber (for tracebacks and `--pst`) and the sync-key stack
//! `sync` blocks push their monitor guard onto, so `defer`/unwind can
//! release every monitor a frame is still holding regardless of which
//! statement it unwound from.

use std::sync::Arc;

use crate::sync::monitor::MonitorGuard;

/// One call-chain entry, pushed when a fiber enters a closure and popped
/// on return/unwind. Carries just enough to reconstruct a stack trace
/// without duplicating the interpreter's own frame state.
#[derive(Clone)]
pub struct FrameInfo {
    /// The callee's display name (`Code::display_name`), for `--pst`.
    pub function_name: Arc<str>,
    /// Current source line, updated as the interpreter advances from
    /// the code object's line-mapping table.
    pub line: u32,
}

impl FrameInfo {
    /// A fresh entry at `function_name`'s first line.
    pub fn new(function_name: impl Into<Arc<str>>, line: u32) -> Self {
        FrameInfo { function_name: function_name.into(), line }
    }
}

/// The monitor-handle stack a fiber's active `sync` blocks push onto,
/// holding monitor handles across nested `sync` blocks. A
/// `sync EXPR { ... }` statement compiles to: acquire
/// EXPR's monitor, push the guard here, run the body, pop-and-release on
/// every exit path (normal, `break`/`continue`/`return`, or an escaping
/// panic) — the stack shape is what lets unwinding release every
/// still-held monitor in one pass regardless of how many nested `sync`
/// blocks were open.
#[derive(Default)]
pub struct SyncStack {
    guards: Vec<MonitorGuard>,
}

impl SyncStack {
    /// An empty sync-key stack, as every fresh frame starts with.
    pub fn new() -> Self {
        SyncStack::default()
    }

    /// Push a newly acquired monitor guard (on entering a `sync` block).
    pub fn push(&mut self, guard: MonitorGuard) {
        self.guards.push(guard);
    }

    /// How many monitors are currently held, for `sync` blocks to save a
    /// mark on entry and truncate back to on a `break`/`continue` that
    /// exits more than one nested block at once.
    pub fn depth(&self) -> usize {
        self.guards.len()
    }

    /// Release every monitor held above `mark`, most-recently-acquired
    /// first, regardless of whether the frame is unwinding normally or
    /// via an escaping panic.
    pub fn unwind_to(&mut self, mark: usize) {
        while self.guards.len() > mark {
            self.guards.pop();
        }
    }
}

/// A fiber's call chain: a stack of [`FrameInfo`] plus one [`SyncStack`]
/// per active frame, indexed in lock-step.
#[derive(Default)]
pub struct CallChain {
    frames: Vec<FrameInfo>,
    sync_stacks: Vec<SyncStack>,
}

impl CallChain {
    /// An empty call chain, as a freshly spawned fiber starts with.
    pub fn new() -> Self {
        CallChain::default()
    }

    /// Enter a new frame.
    pub fn push(&mut self, info: FrameInfo) {
        self.frames.push(info);
        self.sync_stacks.push(SyncStack::new());
    }

    /// Leave the innermost frame, releasing any monitors it still held
    /// (an escaping panic skips straight to this without running every
    /// intermediate `defer`'s own cleanup twice).
    pub fn pop(&mut self) {
        self.frames.pop();
        if let Some(mut stack) = self.sync_stacks.pop() {
            stack.unwind_to(0);
        }
    }

    /// The innermost frame's sync-key stack, for the current `sync` block
    /// codegen to push/pop against.
    pub fn current_sync_stack(&mut self) -> Option<&mut SyncStack> {
        self.sync_stacks.last_mut()
    }

    /// A snapshot of the current call chain, most recent frame first, for
    /// `--pst` traceback printing.
    pub fn trace(&self) -> Vec<FrameInfo> {
        self.frames.iter().rev().cloned().collect()
    }

    /// Update the innermost frame's current line, advanced alongside
    /// the code object's line-mapping table.
    pub fn set_current_line(&mut self, line: u32) {
        if let Some(top) = self.frames.last_mut() {
            top.line = line;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_lists_innermost_frame_first() {
        let mut chain = CallChain::new();
        chain.push(FrameInfo::new("outer", 1));
        chain.push(FrameInfo::new("inner", 5));
        let trace = chain.trace();
        assert_eq!(trace[0].function_name.as_ref(), "inner");
        assert_eq!(trace[1].function_name.as_ref(), "outer");
    }

    #[test]
    fn popping_a_frame_releases_its_monitors() {
        let mut chain = CallChain::new();
        chain.push(FrameInfo::new("f", 1));
        assert_eq!(chain.current_sync_stack().unwrap().depth(), 0);
        chain.pop();
        assert!(chain.current_sync_stack().is_none());
    }
}
