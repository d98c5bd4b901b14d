//! Per-object monitors: a lazily allocated per-object mutex + wait
//! queue, installed on first `sync`/`lock`.
//!
//! Every `ArObject` header carries room for one; it stays `None` until a
//! `sync EXPR { ... }` block (or explicit `.lock()`-style native call)
//! first touches that object, at which point a [`Monitor`] is allocated
//! and installed exactly once (races on the install are resolved with a
//! compare-and-swap, so two fibers racing to enter `sync` on the same
//! fresh object never allocate two monitors for it).

use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::sync::recursive_shared_mutex::RecursiveSharedMutex;

/// A lazily allocated per-object mutex + wait queue.
pub struct Monitor {
    lock: RecursiveSharedMutex,
}

impl Monitor {
    fn new() -> Arc<Monitor> {
        Arc::new(Monitor { lock: RecursiveSharedMutex::new() })
    }

    /// Enter the monitor on behalf of `fiber_id`, returning a guard that
    /// releases it on drop (or when explicitly pushed onto / popped from
    /// a [`crate::frame::SyncStack`]).
    pub fn enter(self: &Arc<Self>, fiber_id: u64) -> MonitorGuard {
        self.lock.lock(fiber_id);
        MonitorGuard { monitor: self.clone(), fiber_id }
    }
}

/// A RAII handle on a held monitor; also the element type
/// [`crate::frame::SyncStack`] stacks up across nested `sync` blocks.
pub struct MonitorGuard {
    monitor: Arc<Monitor>,
    fiber_id: u64,
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        // A double-release (e.g. the frame's defer-unwind path racing an
        // explicit early exit) would be a logic error in codegen, not a
        // recoverable runtime condition, so this intentionally discards
        // the "not held" error `unlock` can return.
        let _ = self.monitor.lock.unlock(self.fiber_id);
    }
}

/// The `AtomicPtr<Monitor>` slot embedded in every `ArObject` header
/// . `None` until first touched.
#[derive(Default)]
pub struct MonitorSlot {
    ptr: AtomicPtr<Monitor>,
}

impl MonitorSlot {
    /// An object header with no monitor allocated yet.
    pub fn new() -> Self {
        MonitorSlot { ptr: AtomicPtr::new(std::ptr::null_mut()) }
    }

    /// Return the installed monitor, allocating and installing one on
    /// first use. Racing callers agree on exactly one winner.
    pub fn get_or_init(&self) -> Arc<Monitor> {
        let existing = self.ptr.load(Ordering::Acquire);
        if !existing.is_null() {
            unsafe { Arc::increment_strong_count(existing) };
            return unsafe { Arc::from_raw(existing) };
        }

        let fresh = Arc::into_raw(Monitor::new()) as *mut Monitor;
        match self.ptr.compare_exchange(std::ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => unsafe { Arc::from_raw(fresh) },
            Err(installed) => {
                // Lost the race: drop our extra allocation, adopt theirs.
                unsafe { drop(Arc::from_raw(fresh)) };
                unsafe { Arc::increment_strong_count(installed) };
                unsafe { Arc::from_raw(installed) }
            }
        }
    }
}

impl Drop for MonitorSlot {
    fn drop(&mut self) {
        let existing = *self.ptr.get_mut();
        if !existing.is_null() {
            unsafe { drop(Arc::from_raw(existing)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn concurrent_first_touch_installs_exactly_one_monitor() {
        let slot = StdArc::new(MonitorSlot::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let slot = slot.clone();
            handles.push(thread::spawn(move || Arc::as_ptr(&slot.get_or_init())));
        }
        let pointers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(pointers.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn entering_releases_on_guard_drop() {
        let slot = MonitorSlot::new();
        let monitor = slot.get_or_init();
        {
            let _guard = monitor.enter(1);
            assert!(monitor.lock.is_held_by(1));
        }
        assert!(!monitor.lock.is_held_by(1));
    }
}
