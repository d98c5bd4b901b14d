//! `RecursiveSharedMutex` : the primitive object [`monitor`]
//! monitors are built on. Supports recursive unique (writer) acquisition
//! by the *same* owning fiber, and shared (reader) acquisition by any
//! number of fibers; a writer excludes readers and other writers.
//! Reentrant unique acquisitions must be matched by an equal number of
//! releases before readers/other writers are let back in.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::sync::mutex::RWMutex;

const NO_OWNER: u64 = 0;

/// A reader/writer lock with recursive writer acquisition, keyed by an
/// owning fiber id.
pub struct RecursiveSharedMutex {
    inner: RWMutex,
    owner: AtomicU64,
    depth: AtomicU32,
}

impl Default for RecursiveSharedMutex {
    fn default() -> Self {
        RecursiveSharedMutex::new()
    }
}

impl RecursiveSharedMutex {
    /// An unlocked mutex.
    pub fn new() -> Self {
        RecursiveSharedMutex { inner: RWMutex::new(), owner: AtomicU64::new(NO_OWNER), depth: AtomicU32::new(0) }
    }

    /// Acquire (or re-acquire, if `fiber_id` already owns it) the unique
    /// lock.
    pub fn lock(&self, fiber_id: u64) {
        if self.owner.load(Ordering::Acquire) == fiber_id && self.depth.load(Ordering::Acquire) > 0 {
            self.depth.fetch_add(1, Ordering::AcqRel);
            return;
        }
        self.inner.lock();
        self.owner.store(fiber_id, Ordering::Release);
        self.depth.store(1, Ordering::Release);
    }

    /// Release one level of unique acquisition; only once `depth` returns
    /// to zero is the underlying lock actually released for others.
    pub fn unlock(&self, fiber_id: u64) -> quill_vm::VmResult<()> {
        if self.owner.load(Ordering::Acquire) != fiber_id || self.depth.load(Ordering::Acquire) == 0 {
            return Err(quill_vm::Error::new(quill_vm::ErrorKind::RuntimeError, "unlock of a monitor not held by this fiber"));
        }
        if self.depth.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.owner.store(NO_OWNER, Ordering::Release);
            self.inner.unlock()?;
        }
        Ok(())
    }

    /// Acquire a shared (reader) lock. Readers don't participate in the
    /// owner/depth bookkeeping above — only unique acquisition recurses.
    pub fn rlock(&self) {
        self.inner.rlock();
    }

    /// Release a shared (reader) lock.
    pub fn runlock(&self) -> quill_vm::VmResult<()> {
        self.inner.runlock()
    }

    /// Whether `fiber_id` currently holds the unique lock, for `sync`
    /// reentrancy checks.
    pub fn is_held_by(&self, fiber_id: u64) -> bool {
        self.owner.load(Ordering::Acquire) == fiber_id && self.depth.load(Ordering::Acquire) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fiber_can_reacquire_recursively() {
        let m = RecursiveSharedMutex::new();
        m.lock(1);
        m.lock(1);
        assert!(m.is_held_by(1));
        m.unlock(1).unwrap();
        assert!(m.is_held_by(1));
        m.unlock(1).unwrap();
        assert!(!m.is_held_by(1));
    }

    #[test]
    fn unlock_by_a_non_owner_is_a_runtime_error() {
        let m = RecursiveSharedMutex::new();
        m.lock(1);
        let err = m.unlock(2).unwrap_err();
        assert_eq!(err.kind(), quill_vm::ErrorKind::RuntimeError);
        m.unlock(1).unwrap();
    }
}
