//! # Quill GC
//!
//! Hybrid memory manager: an inline/out-of-line reference counter on
//! every object header, a size-class slab allocator, and a tri-color
//! tracing collector that only walks objects whose type opts into it.
//! The two halves are orthogonal — an object that is never part of a
//! cycle lives and dies by refcount alone; the tracer exists solely to
//! reclaim cycles among GC-tracked objects.
//!
//! Module layout: `object` (header + mark state), `allocator` (slab
//! allocator), `refcount` (strong/weak counting + SideTable), `gc` (the
//! collector and its generations), `weak` (weak reference cells).

#![warn(missing_docs)]

pub mod allocator;
pub mod gc;
pub mod object;
pub mod refcount;
pub mod stats;
pub mod weak;

pub use allocator::{Allocator, ALLOC_LARGE_THRESHOLD};
pub use gc::{Collector, GcConfig, GcVTable, Generation};
pub use object::{current_mark_version, GcHeader, MarkColor, Trace};
pub use refcount::{RCType, RefCount, SideTable};
pub use stats::GcStats;
pub use weak::WeakRef;
