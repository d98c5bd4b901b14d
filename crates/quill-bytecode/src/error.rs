//! Errors surfaced while decoding or validating bytecode.

use thiserror::Error;

/// Errors raised while decoding or inspecting a [`crate::code::Code`] body.
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// A byte did not match any known [`crate::instruction::Opcode`].
    #[error("invalid opcode 0x{0:02X} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// The instruction stream ended mid-instruction.
    #[error("truncated instruction stream at offset {0}")]
    UnexpectedEnd(usize),

    /// An instruction argument indexed past the end of a name/static table.
    #[error("{table} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// Which table was indexed (`"statics"`, `"globals"`, `"locals"`, `"enclosed"`).
        table: &'static str,
        /// The offending index.
        index: u32,
        /// The table's actual length.
        len: usize,
    },

    /// A jump target did not land on an instruction boundary.
    #[error("jump target {0} does not land on an instruction boundary")]
    MisalignedJump(u32),
}

/// Result alias for bytecode-layer operations.
pub type Result<T> = std::result::Result<T, BytecodeError>;
