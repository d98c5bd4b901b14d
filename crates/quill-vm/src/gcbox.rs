//! `Gc<T>`: a refcounted, trace-registered smart pointer for the
//! container types that can participate in reference cycles (`list`,
//! `dict`, `set`, `namespace`, and user `struct` instances).
//!
//! `quill_gc` supplies the low-level primitives — a packed [`RefCount`],
//! a [`GcHeader`], and a [`Collector`] that finds and breaks cycles among
//! whatever objects it is told to `track` — but it deliberately stays
//! generic over the object layout (it operates through an unsafe
//! [`GcVTable`] of raw function pointers over `NonNull<u8>`). `Gc<T>` is
//! the concrete smart pointer quill-vm builds on top, the same way a
//! language runtime built on `quill_gc`'s primitives would: one
//! [`GcBox<T>`] allocation per object, one static `GcVTable` per `T`,
//! `Clone`/`Drop` wired to the packed strong count instead of libstd's
//! `Arc`.
//!
//! Acyclic, immutable leaf values (`string`, `bytes`, `tuple`) don't need
//! any of this and use plain [`std::sync::Arc`] instead — tracing an
//! object that can never participate in a cycle only adds collector
//! overhead.

use std::alloc::{alloc, dealloc, Layout};
use std::ops::Deref;
use std::ptr::NonNull;

use quill_gc::{Collector, GcHeader, GcVTable, Generation, RCType, RefCount, Trace};

#[repr(C)]
struct GcBox<T> {
    header: GcHeader,
    rc: RefCount,
    body: T,
}

/// A cycle-collectible smart pointer to a `T: Trace`.
///
/// Behaves like `Arc<T>` for ordinary ownership (`Clone` bumps the strong
/// count, `Drop` decrements it and frees at zero) but additionally
/// registers the allocation with a [`Collector`] so that cycles of
/// `Gc<T>`s unreachable from any external root are still reclaimed.
pub struct Gc<T: Trace + 'static> {
    ptr: NonNull<GcBox<T>>,
}

unsafe impl<T: Trace + Send + Sync> Send for Gc<T> {}
unsafe impl<T: Trace + Send + Sync> Sync for Gc<T> {}

impl<T: Trace + 'static> Gc<T> {
    /// Allocate `value` on the heap, register it with `collector`, and
    /// return a handle to it with one strong reference.
    pub fn new(value: T, collector: &Collector, generation: Generation) -> Self {
        let layout = Layout::new::<GcBox<T>>();
        let raw = unsafe { alloc(layout) } as *mut GcBox<T>;
        assert!(!raw.is_null(), "allocation failure in Gc::new");
        unsafe {
            raw.write(GcBox {
                header: GcHeader::new(generation as u8),
                rc: RefCount::new(RCType::Gc),
                body: value,
            });
        }
        let ptr = unsafe { NonNull::new_unchecked(raw) };
        unsafe {
            let header = NonNull::from(&(*ptr.as_ptr()).header);
            collector.track(header, ptr.cast::<u8>(), vtable_for::<T>());
        }
        Gc { ptr }
    }

    fn gcbox(&self) -> &GcBox<T> {
        unsafe { self.ptr.as_ref() }
    }

    /// The object's GC header, for collector bookkeeping.
    pub fn header(&self) -> &GcHeader {
        &self.gcbox().header
    }

    /// Current strong-reference count.
    pub fn strong_count(&self) -> usize {
        self.gcbox().rc.strong_count()
    }

    /// Pointer identity, for use as a map key (e.g. the collector's
    /// in-generation edge index).
    pub fn as_ptr(&self) -> *const () {
        self.ptr.as_ptr() as *const ()
    }
}

impl<T: Trace + 'static> Clone for Gc<T> {
    fn clone(&self) -> Self {
        self.gcbox().rc.inc_strong();
        Gc { ptr: self.ptr }
    }
}

impl<T: Trace + 'static> Drop for Gc<T> {
    fn drop(&mut self) {
        if self.gcbox().rc.dec_strong() {
            unsafe {
                std::ptr::drop_in_place(&mut (*self.ptr.as_ptr()).body);
                dealloc(self.ptr.as_ptr() as *mut u8, Layout::new::<GcBox<T>>());
            }
        }
    }
}

impl<T: Trace + 'static> Deref for Gc<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.gcbox().body
    }
}

unsafe fn vtable_strong_count<T: Trace>(body: NonNull<u8>) -> usize {
    let gcbox = body.cast::<GcBox<T>>();
    gcbox.as_ref().rc.strong_count()
}

unsafe fn vtable_trace<T: Trace>(body: NonNull<u8>, visit: &mut dyn FnMut(*const GcHeader)) {
    let gcbox = body.cast::<GcBox<T>>();
    gcbox.as_ref().body.trace(visit);
}

unsafe fn vtable_finalize<T: Trace>(_body: NonNull<u8>) {
    // Built-in container types have no user-visible finalizers (destructors
    // for user-defined struct instances are out of scope for this layer).
}

unsafe fn vtable_dealloc<T: Trace>(body: NonNull<u8>) {
    let gcbox = body.cast::<GcBox<T>>();
    std::ptr::drop_in_place(&mut (*gcbox.as_ptr()).body);
    dealloc(gcbox.as_ptr() as *mut u8, Layout::new::<GcBox<T>>());
}

trait HasVTable {
    const VTABLE: GcVTable;
}

impl<T: Trace> HasVTable for T {
    const VTABLE: GcVTable = GcVTable {
        strong_count: vtable_strong_count::<T>,
        trace: vtable_trace::<T>,
        finalize: vtable_finalize::<T>,
        dealloc: vtable_dealloc::<T>,
    };
}

fn vtable_for<T: Trace>() -> &'static GcVTable {
    // One vtable instance per monomorphization of `T`; referencing an
    // associated const this way is guaranteed to promote to `'static`.
    &T::VTABLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_gc::{GcConfig, Generation};

    struct Leaf(i64);
    impl Trace for Leaf {
        fn trace(&self, _visit: &mut dyn FnMut(*const GcHeader)) {}
    }

    #[test]
    fn clone_and_drop_manage_strong_count() {
        let collector = Collector::new(GcConfig::default());
        let a = Gc::new(Leaf(42), &collector, Generation::Young);
        assert_eq!(a.strong_count(), 1);
        let b = a.clone();
        assert_eq!(a.strong_count(), 2);
        drop(b);
        assert_eq!(a.strong_count(), 1);
        assert_eq!(a.0, 42);
    }
}
