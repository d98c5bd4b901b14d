//! Compilation errors, returned rather than thrown: every early-return
//! path carries a typed [`CompileError`] with source location, via
//! helper constructors (`syntax`, `unsupported`, `internal`, ...).

use quill_ast::Span;
use thiserror::Error;

/// Errors raised while lowering, optimizing, or assembling a module.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A name was referenced that no enclosing scope declares.
    #[error("undeclared name '{name}' at {span}")]
    UndeclaredName {
        /// The offending identifier.
        name: String,
        /// Where it was referenced.
        span: Span,
    },

    /// A name was declared twice in the same scope with a different kind.
    #[error("'{name}' at {span} redeclares an existing {existing_kind:?} as {new_kind:?}")]
    Redeclaration {
        /// The offending identifier.
        name: String,
        /// The kind it already had.
        existing_kind: crate::symtab::SymbolKind,
        /// The kind this declaration tried to give it.
        new_kind: crate::symtab::SymbolKind,
        /// Where the redeclaration occurred.
        span: Span,
    },

    /// `break`/`continue` outside of any loop.
    #[error("'{0}' outside of a loop at {1}")]
    LoopControlOutsideLoop(&'static str, Span),

    /// An assignment target was not an lvalue (identifier, attribute, or subscript).
    #[error("invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),

    /// A function body exceeded the fixed-width tables' capacity.
    #[error("too many {0} (max {1})")]
    TableOverflow(&'static str, u64),

    /// Something the compiler's current feature set doesn't lower yet.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An invariant the compiler itself should have upheld was violated.
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Construct an [`CompileError::Unsupported`].
    pub fn unsupported(feature: impl Into<String>) -> Self {
        CompileError::Unsupported(feature.into())
    }

    /// Construct an [`CompileError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}

/// Result alias for compiler operations.
pub type CompileResult<T> = std::result::Result<T, CompileError>;
