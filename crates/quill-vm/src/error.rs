//! Runtime error values.
//!
//! A kind-tagged error enum; `ErrorKind` enumerates this language's own
//! error taxonomy. An `Error` is itself a first-class `Value` (it can be
//! caught, stored, re-raised), so this type also backs the panic object
//! a fiber carries.

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// The fixed set of error kinds names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation applied to a value of the wrong type.
    TypeError,
    /// A value was outside its accepted domain.
    ValueError,
    /// A failure with no more specific kind.
    RuntimeError,
    /// Arithmetic over/underflowed.
    OverflowError,
    /// Mapping lookup found no such key.
    KeyError,
    /// Attribute lookup/assignment found no such name.
    AttributeError,
    /// An assignment target cannot be written (e.g. a `CONST` attribute).
    UnassignableError,
    /// Raised by the `exit` builtin; terminates the process rather than
    /// propagating to a caller.
    RuntimeExit,
    /// A module failed to resolve or load (including cyclic imports).
    ModuleImportError,
    /// A string operation encountered invalid UTF-8/codepoint data.
    UnicodeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::OverflowError => "OverflowError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::UnassignableError => "UnassignableError",
            ErrorKind::RuntimeExit => "RuntimeExit",
            ErrorKind::ModuleImportError => "ModuleImportError",
            ErrorKind::UnicodeError => "UnicodeError",
        };
        f.write_str(s)
    }
}

struct Inner {
    kind: ErrorKind,
    message: String,
    cause: Option<Error>,
}

/// A runtime error, cheaply cloneable (panics propagate through `Value`
/// clones as the interpreter unwinds frames).
///
/// Destructors that themselves panic during unwinding chain the older
/// panic as `cause` : catch the new panic, attach the one
/// already in flight, and keep unwinding with the combined value.
#[derive(Clone)]
pub struct Error(Arc<Inner>);

impl Error {
    /// Construct a new error with no cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error(Arc::new(Inner { kind, message: message.into(), cause: None }))
    }

    /// Construct an error caused by an earlier one (destructor- during-unwind chaining).
    pub fn with_cause(kind: ErrorKind, message: impl Into<String>, cause: Error) -> Self {
        Error(Arc::new(Inner { kind, message: message.into(), cause: Some(cause) }))
    }

    /// This error's kind tag.
    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    /// The formatted message.
    pub fn message(&self) -> &str {
        &self.0.message
    }

    /// The error that caused this one, if any.
    pub fn cause(&self) -> Option<&Error> {
        self.0.cause.as_ref()
    }

    /// Whether this is the special `RuntimeExit` kind, which terminates
    /// the process rather than propagating.
    pub fn is_exit(&self) -> bool {
        self.0.kind == ErrorKind::RuntimeExit
    }

    /// Convenience constructors, one per kind.
    pub fn type_error(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::TypeError, msg)
    }
    /// Construct a `ValueError`.
    pub fn value_error(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::ValueError, msg)
    }
    /// Construct an `OverflowError`.
    pub fn overflow_error(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::OverflowError, msg)
    }
    /// Construct a `KeyError`.
    pub fn key_error(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::KeyError, msg)
    }
    /// Construct an `AttributeError`.
    pub fn attribute_error(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::AttributeError, msg)
    }
    /// Construct an `UnassignableError`.
    pub fn unassignable(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::UnassignableError, msg)
    }
    /// Construct a `ModuleImportError`.
    pub fn module_import(msg: impl Into<String>) -> Self {
        Error::new(ErrorKind::ModuleImportError, msg)
    }
    /// Construct a `RuntimeExit` carrying the process exit code as its message.
    pub fn exit(code: i32) -> Self {
        Error::new(ErrorKind::RuntimeExit, code.to_string())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.kind, self.0.message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.kind, self.0.message)?;
        if let Some(cause) = &self.0.cause {
            write!(f, "\ncaused by: {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Result alias for interpreter/object-model operations.
pub type VmResult<T> = Result<T, Error>;

/// An error object is itself representable as a `Value` for `trap`
/// handlers to bind and inspect.
impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Value::Error(err)
    }
}
