//! Packed strong/weak reference counter.
//!
//! A single machine word holds STATIC, INLINE and GC flag bits plus
//! either an inline strong counter (with a carry-detectable overflow
//! guard bit) or, once a weak reference is ever taken or the inline
//! counter overflows, a pointer to a heap-allocated [`SideTable`]. Bit
//! positions are this module's own layout choice. Invariants preserved:
//! STATIC objects are no-ops, promoting to a SideTable is the only
//! fallible path, and weak references always force a SideTable.

use std::alloc::{alloc, dealloc, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

const STATIC_BIT: usize = 1 << 0;
const INLINE_BIT: usize = 1 << 1;
const GC_BIT: usize = 1 << 2;
const FLAG_MASK: usize = STATIC_BIT | INLINE_BIT | GC_BIT;

/// Counter field occupies bits [3, BITS-1); the top bit is a carry guard
/// that `Increment` uses to detect inline-counter overflow in one add.
const STRONG_SHIFT: u32 = 3;
const OVERFLOW_BIT: usize = 1 << (usize::BITS - 1);
const STRONG_MASK: usize = !(FLAG_MASK | OVERFLOW_BIT);

/// The three "ways to be born" for an [`ObjHeader`](crate::object::GcHeader)'s counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RCType {
    /// Ordinary heap object: starts with an inline strong count of 1.
    Inline,
    /// Immortal object (program-lifetime constant): refcount ops are no-ops.
    Static,
    /// Ordinary heap object additionally tracked by the tracing GC.
    Gc,
}

/// Out-of-line strong/weak counters, allocated when the inline counter
/// overflows or the first weak reference is taken.
pub struct SideTable {
    pub strong: AtomicUsize,
    pub weak: AtomicUsize,
}

impl SideTable {
    fn alloc(initial_strong: usize) -> *mut SideTable {
        let layout = Layout::new::<SideTable>();
        unsafe {
            let ptr = alloc(layout) as *mut SideTable;
            assert!(!ptr.is_null(), "out of memory allocating SideTable");
            ptr.write(SideTable {
                strong: AtomicUsize::new(initial_strong),
                weak: AtomicUsize::new(1),
            });
            ptr
        }
    }

    unsafe fn free(ptr: *mut SideTable) {
        std::ptr::drop_in_place(ptr);
        dealloc(ptr as *mut u8, Layout::new::<SideTable>());
    }
}

/// The packed reference counter embedded in every object header.
pub struct RefCount {
    bits: AtomicUsize,
}

impl RefCount {
    /// Construct a fresh counter of the given kind.
    pub fn new(kind: RCType) -> Self {
        let bits = match kind {
            RCType::Inline => INLINE_BIT | (1 << STRONG_SHIFT),
            RCType::Static => STATIC_BIT,
            RCType::Gc => GC_BIT | INLINE_BIT | (1 << STRONG_SHIFT),
        };
        RefCount { bits: AtomicUsize::new(bits) }
    }

    #[inline]
    fn is_static(bits: usize) -> bool {
        bits & STATIC_BIT != 0
    }

    #[inline]
    fn is_inline(bits: usize) -> bool {
        bits & INLINE_BIT != 0
    }

    /// Whether this object is managed by the tracing collector.
    pub fn is_gc_object(&self) -> bool {
        self.bits.load(Ordering::Acquire) & GC_BIT != 0
    }

    /// Whether this object is immortal.
    pub fn is_static(&self) -> bool {
        Self::is_static(self.bits.load(Ordering::Acquire))
    }

    /// Whether the counter has already been promoted to a [`SideTable`].
    pub fn has_side_table(&self) -> bool {
        let bits = self.bits.load(Ordering::Acquire);
        !Self::is_static(bits) && !Self::is_inline(bits)
    }

    #[inline]
    fn side_table(bits: usize) -> *mut SideTable {
        (bits & !FLAG_MASK) as *mut SideTable
    }

    fn alloc_or_get_side_table(&self) -> *mut SideTable {
        loop {
            let current = self.bits.load(Ordering::Acquire);
            debug_assert!(!Self::is_static(current));

            if !Self::is_inline(current) {
                return Self::side_table(current);
            }

            let strong = current >> STRONG_SHIFT;
            let side = SideTable::alloc(strong);
            let mut desired = side as usize;
            if current & GC_BIT != 0 {
                desired |= GC_BIT;
            }

            match self.bits.compare_exchange_weak(
                current,
                desired,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return side,
                Err(_) => unsafe { SideTable::free(side) },
            }
        }
    }

    /// Acquire a strong reference. Fails only if promoting an overflowed
    /// inline counter to a [`SideTable`] runs out of memory.
    pub fn inc_strong(&self) -> bool {
        loop {
            let current = self.bits.load(Ordering::Acquire);
            if Self::is_static(current) {
                return true;
            }

            if !Self::is_inline(current) {
                let side = unsafe { &*Self::side_table(current) };
                side.strong.fetch_add(1, Ordering::Relaxed);
                return true;
            }

            let desired = current + (1 << STRONG_SHIFT);
            if desired & OVERFLOW_BIT != 0 {
                let side = self.alloc_or_get_side_table();
                unsafe { &*side }.strong.fetch_add(1, Ordering::Relaxed);
                return true;
            }

            if self
                .bits
                .compare_exchange_weak(current, desired, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Release a strong reference. Returns `true` if this was the last
    /// one (the caller must now run the destructor).
    pub fn dec_strong(&self) -> bool {
        loop {
            let current = self.bits.load(Ordering::Acquire);
            if Self::is_static(current) {
                return false;
            }

            if !Self::is_inline(current) {
                let side = unsafe { &*Self::side_table(current) };
                if side.strong.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if side.weak.fetch_sub(1, Ordering::AcqRel) == 1 {
                        unsafe { SideTable::free(Self::side_table(current)) };
                    }
                    return true;
                }
                return false;
            }

            debug_assert!((current & STRONG_MASK) >> STRONG_SHIFT > 0);
            let desired = current - (1 << STRONG_SHIFT);
            if self
                .bits
                .compare_exchange_weak(current, desired, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return (desired & STRONG_MASK) >> STRONG_SHIFT == 0;
            }
        }
    }

    /// Acquire a weak reference, forcing promotion to a [`SideTable`].
    pub fn inc_weak(&self) {
        let side = self.alloc_or_get_side_table();
        unsafe { &*side }.weak.fetch_add(1, Ordering::AcqRel);
    }

    /// Attempt to acquire a strong reference from a weak one. Fails (and
    /// acquires nothing) once the strong count has already reached zero,
    /// even though the [`SideTable`] itself may briefly outlive the object
    /// while the last weak reference is still being dropped.
    pub fn upgrade(&self) -> bool {
        let current = self.bits.load(Ordering::Acquire);
        debug_assert!(!Self::is_inline(current) && !Self::is_static(current));
        let side = unsafe { &*Self::side_table(current) };
        let mut strong = side.strong.load(Ordering::Acquire);
        loop {
            if strong == 0 {
                return false;
            }
            match side.strong.compare_exchange_weak(
                strong,
                strong + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => strong = observed,
            }
        }
    }

    /// Release a weak reference. Returns `true` if the [`SideTable`] was
    /// just freed (i.e. this was the last weak ref and strong was already 0).
    pub fn dec_weak(&self) -> bool {
        let current = self.bits.load(Ordering::Acquire);
        debug_assert!(!Self::is_inline(current) && !Self::is_static(current));
        let side = Self::side_table(current);
        let prev = unsafe { &*side }.weak.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            unsafe { SideTable::free(side) };
            true
        } else {
            false
        }
    }

    /// Current strong count (best-effort, racy if concurrent mutators exist).
    pub fn strong_count(&self) -> usize {
        let current = self.bits.load(Ordering::Acquire);
        if Self::is_static(current) {
            return usize::MAX;
        }
        if Self::is_inline(current) {
            (current & STRONG_MASK) >> STRONG_SHIFT
        } else {
            unsafe { &*Self::side_table(current) }.strong.load(Ordering::Acquire)
        }
    }

    /// Current weak count, or 0 if no SideTable has ever been allocated.
    pub fn weak_count(&self) -> usize {
        let current = self.bits.load(Ordering::Acquire);
        if Self::is_static(current) || Self::is_inline(current) {
            return 0;
        }
        unsafe { &*Self::side_table(current) }.weak.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[test]
    fn inline_inc_dec_destroys_once() {
        let rc = RefCount::new(RCType::Inline);
        static DESTROYED: StdAtomicUsize = StdAtomicUsize::new(0);

        for _ in 0..100 {
            rc.inc_strong();
        }
        let mut last = false;
        for _ in 0..101 {
            last = rc.dec_strong();
            if last {
                DESTROYED.fetch_add(1, Ordering::SeqCst);
            }
        }
        assert!(last);
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn static_refs_are_noop() {
        let rc = RefCount::new(RCType::Static);
        assert!(rc.is_static());
        assert!(rc.inc_strong());
        assert!(!rc.dec_strong());
        assert_eq!(rc.strong_count(), usize::MAX);
    }

    #[test]
    fn overflow_promotes_to_side_table() {
        let rc = RefCount::new(RCType::Inline);
        let max_inline = STRONG_MASK >> STRONG_SHIFT;
        for _ in 0..max_inline {
            rc.inc_strong();
        }
        assert!(!rc.has_side_table());
        rc.inc_strong();
        assert!(rc.has_side_table());
        assert_eq!(rc.strong_count(), max_inline + 2);
    }

    #[test]
    fn weak_upgrade_after_last_strong_drop() {
        let rc = RefCount::new(RCType::Inline);
        rc.inc_weak();
        assert!(rc.has_side_table());
        assert!(rc.dec_strong());
        assert_eq!(rc.strong_count(), 0);
        assert!(!rc.dec_weak());
    }

    #[test]
    fn weak_upgrade_succeeds_while_strong_alive() {
        let rc = RefCount::new(RCType::Inline);
        rc.inc_weak();
        assert!(rc.upgrade());
        assert_eq!(rc.strong_count(), 2);
    }

    #[test]
    fn weak_upgrade_fails_after_strong_reaches_zero() {
        let rc = RefCount::new(RCType::Inline);
        rc.inc_weak();
        assert!(rc.dec_strong());
        assert!(!rc.upgrade());
    }

    #[test]
    fn gc_bit_preserved_across_promotion() {
        let rc = RefCount::new(RCType::Gc);
        assert!(rc.is_gc_object());
        rc.inc_weak();
        assert!(rc.is_gc_object());
        assert!(rc.has_side_table());
    }
}
