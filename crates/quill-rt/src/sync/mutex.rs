//! Fiber-aware `Mutex`/`RWMutex`.
//!
//! A `Mutex` is a plain exclusive lock whose `unlock` on an
//! already-unlocked mutex is a `RuntimeError`, not undefined behavior;
//! `RWMutex` adds a reader count so many readers can hold it at once but
//! a writer excludes everyone. Contention suspends on a [`NotifyQueue`]
//! rather than busy-waiting.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::sync::notify_queue::NotifyQueue;
use quill_vm::{Error, ErrorKind, VmResult};

/// A simple exclusive lock.
pub struct Mutex {
    locked: AtomicBool,
    queue: NotifyQueue,
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new()
    }
}

impl Mutex {
    /// An unlocked mutex.
    pub fn new() -> Self {
        Mutex { locked: AtomicBool::new(false), queue: NotifyQueue::new() }
    }

    /// Acquire the lock, suspending the caller if it is already held.
    pub fn lock(&self) {
        loop {
            if self.locked.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return;
            }
            let ticket = self.queue.get_ticket();
            if !self.locked.load(Ordering::Acquire) {
                continue;
            }
            self.queue.wait(ticket);
        }
    }

    /// Release the lock.
    ///
    /// # Errors
    /// Returns a `RuntimeError` if the mutex was not held ( "unlock of unlocked is a runtime error").
    pub fn unlock(&self) -> VmResult<()> {
        if self.locked.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(Error::new(ErrorKind::RuntimeError, "unlock of unlocked mutex"));
        }
        self.queue.notify();
        Ok(())
    }

    /// Whether the mutex is currently held, for diagnostics and tests.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

const MAX_READERS: isize = 1 << 30;

/// A reader/writer lock: any number of concurrent readers, or one
/// exclusive writer, never both (`RWMutex`).
pub struct RWMutex {
    writer: Mutex,
    reader_count: std::sync::atomic::AtomicIsize,
    waiting_writers: AtomicUsize,
    read_queue: NotifyQueue,
    write_queue: NotifyQueue,
}

impl Default for RWMutex {
    fn default() -> Self {
        RWMutex::new()
    }
}

impl RWMutex {
    /// An unlocked reader/writer lock.
    pub fn new() -> Self {
        RWMutex {
            writer: Mutex::new(),
            reader_count: std::sync::atomic::AtomicIsize::new(0),
            waiting_writers: AtomicUsize::new(0),
            read_queue: NotifyQueue::new(),
            write_queue: NotifyQueue::new(),
        }
    }

    /// Acquire a shared (reader) lock.
    pub fn rlock(&self) {
        loop {
            let prior = self.reader_count.fetch_add(1, Ordering::AcqRel);
            if prior >= 0 {
                return;
            }
            // A writer is active or waiting; back off and wait our turn.
            self.reader_count.fetch_sub(1, Ordering::AcqRel);
            let ticket = self.read_queue.get_ticket();
            if self.waiting_writers.load(Ordering::Acquire) == 0 {
                continue;
            }
            self.read_queue.wait(ticket);
        }
    }

    /// Release a shared (reader) lock.
    pub fn runlock(&self) -> VmResult<()> {
        let prior = self.reader_count.fetch_sub(1, Ordering::AcqRel);
        if prior == 0 {
            self.reader_count.fetch_add(1, Ordering::AcqRel);
            return Err(Error::new(ErrorKind::RuntimeError, "runlock of unlocked rwmutex"));
        }
        if prior < 0 {
            // A writer is waiting and this was the last outstanding
            // reader it needed to drain; wake it.
            self.write_queue.notify();
        }
        Ok(())
    }

    /// Acquire the exclusive (writer) lock.
    pub fn lock(&self) {
        self.writer.lock();
        self.waiting_writers.fetch_add(1, Ordering::AcqRel);
        let prior_readers = self.reader_count.fetch_sub(MAX_READERS, Ordering::AcqRel);
        if prior_readers != 0 {
            let ticket = self.write_queue.get_ticket();
            self.write_queue.wait(ticket);
        }
    }

    /// Release the exclusive (writer) lock.
    pub fn unlock(&self) -> VmResult<()> {
        self.reader_count.fetch_add(MAX_READERS, Ordering::AcqRel);
        self.waiting_writers.fetch_sub(1, Ordering::AcqRel);
        self.read_queue.notify_all();
        self.writer.unlock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unlock_of_unlocked_mutex_is_a_runtime_error() {
        let m = Mutex::new();
        let err = m.unlock().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuntimeError);
    }

    #[test]
    fn mutex_excludes_concurrent_holders() {
        let mutex = Arc::new(Mutex::new());
        let counter = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mutex = mutex.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    mutex.lock();
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                    mutex.unlock().unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 800);
    }

    #[test]
    fn rwmutex_allows_concurrent_readers() {
        let rw = Arc::new(RWMutex::new());
        rw.rlock();
        rw.rlock();
        rw.runlock().unwrap();
        rw.runlock().unwrap();
    }
}
