//! Weak references ("a weak reference yields nil when upgraded after the target is destroyed").
//!
//! Upgrading goes through [`crate::refcount::RefCount::upgrade`] rather
//! than a boolean flag, so a weak reference taken concurrently with the
//! last strong drop can never resurrect a half-destroyed object.

use crate::refcount::RefCount;
use std::ptr::NonNull;

/// A non-owning reference to a [`RefCount`]-counted object.
///
/// `WeakRef` does not know the pointee's concrete type; callers downcast
/// the upgraded pointer themselves, the same way `quill-vm`'s object
/// model downcasts any other untyped object pointer.
pub struct WeakRef {
    target: NonNull<RefCount>,
    object: NonNull<u8>,
}

// A WeakRef only ever touches its target through `RefCount`'s atomic
// operations, so it's safe to move and share across threads.
unsafe impl Send for WeakRef {}
unsafe impl Sync for WeakRef {}

impl WeakRef {
    /// Construct a weak reference to `object`, whose header's counter is
    /// `refcount`. Takes a weak reference immediately (forcing the
    /// counter's [`crate::refcount::SideTable`] promotion), mirroring the
    /// original's `inc_weak`-on-construction convention.
    ///
    /// # Safety
    /// `refcount` must be the `RefCount` embedded in `object`'s header,
    /// and both must outlive this `WeakRef` or every weak reference to
    /// them; object memory is only freed once the side table's weak
    /// count reaches zero.
    pub unsafe fn new(refcount: NonNull<RefCount>, object: NonNull<u8>) -> Self {
        unsafe { refcount.as_ref() }.inc_weak();
        WeakRef { target: refcount, object }
    }

    /// Attempt to acquire a strong reference to the target. Returns the
    /// object pointer with a strong reference now held on the caller's
    /// behalf, or `None` if the target's strong count already reached
    /// zero (this module's "yields nil").
    pub fn upgrade(&self) -> Option<NonNull<u8>> {
        if unsafe { self.target.as_ref() }.upgrade() {
            Some(self.object)
        } else {
            None
        }
    }

    /// Whether the target is still alive, without taking a strong
    /// reference. Racy by nature: the answer may be stale the instant it
    /// is observed.
    pub fn is_alive(&self) -> bool {
        unsafe { self.target.as_ref() }.strong_count() > 0
    }
}

impl Drop for WeakRef {
    fn drop(&mut self) {
        unsafe { self.target.as_ref() }.dec_weak();
    }
}

impl Clone for WeakRef {
    fn clone(&self) -> Self {
        unsafe { self.target.as_ref() }.inc_weak();
        WeakRef { target: self.target, object: self.object }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refcount::RCType;

    #[test]
    fn upgrade_succeeds_while_strong_alive() {
        let rc = Box::new(RefCount::new(RCType::Inline));
        let rc_ptr = NonNull::from(rc.as_ref());
        let body = NonNull::<u8>::dangling();

        let weak = unsafe { WeakRef::new(rc_ptr, body) };
        assert!(weak.is_alive());
        assert!(weak.upgrade().is_some());
        // Upgrade took a strong ref; release it and the original.
        assert!(!rc.dec_strong());
        assert!(rc.dec_strong());
    }

    #[test]
    fn upgrade_fails_after_target_destroyed() {
        let rc = Box::new(RefCount::new(RCType::Inline));
        let rc_ptr = NonNull::from(rc.as_ref());
        let body = NonNull::<u8>::dangling();

        let weak = unsafe { WeakRef::new(rc_ptr, body) };
        assert!(rc.dec_strong());
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn clone_keeps_side_table_alive_independently() {
        let rc = Box::new(RefCount::new(RCType::Inline));
        let rc_ptr = NonNull::from(rc.as_ref());
        let body = NonNull::<u8>::dangling();

        let weak1 = unsafe { WeakRef::new(rc_ptr, body) };
        let weak2 = weak1.clone();
        drop(weak1);
        assert!(weak2.is_alive());
    }
}
