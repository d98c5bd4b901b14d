//! # Quill VM
//!
//! The object model, built-in containers, and bytecode interpreter. Built
//! atop `quill-gc`'s refcount/tracing primitives and `quill-bytecode`'s
//! instruction/`Code` format; independent of fiber scheduling,
//! synchronization primitives, and the event loop, all of which live one
//! layer up in `quill-rt` and reach into the interpreter only through the
//! [`interpreter::Host`] trait.
//!
//! Module layout: `value`/`object`/`type_info` (the object model),
//! `containers` (the built-in types), `hash`/`compare`/`arithmetic`/
//! `format` (the universal operations), `gcbox`/`heap` (the `Gc<T>` smart
//! pointer and the shared collector), `interpreter` (opcode dispatch),
//! `native` (the native-function call convention), `error` (first-class
//! `Error` values).

#![warn(missing_docs)]

pub mod arithmetic;
pub mod compare;
pub mod containers;
pub mod error;
pub mod format;
pub mod gcbox;
pub mod hash;
pub mod heap;
pub mod interpreter;
pub mod map;
pub mod native;
pub mod object;
pub mod type_info;
pub mod type_init;
pub mod value;

pub use error::{Error, ErrorKind, VmResult};
pub use gcbox::Gc;
pub use heap::Heap;
pub use interpreter::{Frame, Host, Interpreter};
pub use map::OrderedMap;
pub use native::{NativeCall, NativeFunction, PCheck, Param};
pub use object::{ArObject, AttributeFlags, Namespace};
pub use type_info::TypeInfo;
pub use type_init::{c3_linearize, type_init, TypeDraft};
pub use value::{ObjectRef, Value};
