//! # Quill Bytecode
//!
//! The linearized, stack-based instruction format produced by
//! `quill-compiler` and executed by `quill-vm`.
//!
//! Module layout: `instruction` (opcodes and variable-length encoding),
//! `statics` (the constant pool), `code` (the assembled function
//! object), `linemap` (packed source-line deltas), `error` (decode-time
//! failures).

#![warn(missing_docs)]

pub mod code;
pub mod error;
pub mod instruction;
pub mod linemap;
pub mod statics;

pub use code::{Code, CodeFlags, TrapEntry};
pub use error::BytecodeError;
pub use instruction::{decode, encode, fixed_stack_effect, InstrWidth, Opcode, OpCodeCallMode};
pub use linemap::{LineEntry, LineMapBuilder};
pub use statics::{StaticValue, StaticsPool};
