//! `Cond`: a condition variable over an arbitrary lock.
//!
//! Wraps a [`NotifyQueue`] and a [`Locker`]; `wait` atomically (1) obtains
//! a ticket, (2) releases the supplied lock, (3) suspends on the queue,
//! (4) re-acquires the lock on wake — exactly the four steps
//! names, in that order, so a `notify` racing between steps 1 and 3 can
//! never be missed (the ticket is already on file before the lock is
//! released).

use crate::sync::notify_queue::NotifyQueue;

/// Anything `Cond::wait` can release-then-reacquire around a wait.
/// Implemented by [`crate::sync::mutex::Mutex`] and by a guard type
/// wrapping a held monitor/RWMutex write lock.
pub trait Locker {
    /// Release the lock. Called while still holding it.
    fn unlock(&self);
    /// Re-acquire the lock, suspending the caller if necessary.
    fn lock(&self);
}

impl Locker for crate::sync::mutex::Mutex {
    fn unlock(&self) {
        let _ = crate::sync::mutex::Mutex::unlock(self);
    }

    fn lock(&self) {
        crate::sync::mutex::Mutex::lock(self);
    }
}

/// A condition variable multiplexed over the fiber-aware lock types above.
pub struct Cond {
    queue: NotifyQueue,
}

impl Default for Cond {
    fn default() -> Self {
        Cond::new()
    }
}

impl Cond {
    /// A fresh condition variable with no waiters.
    pub fn new() -> Self {
        Cond { queue: NotifyQueue::new() }
    }

    /// Atomically release `locker`, suspend until notified, and
    /// re-acquire `locker` before returning.
    pub fn wait<L: Locker>(&self, locker: &L) {
        let ticket = self.queue.get_ticket();
        locker.unlock();
        self.queue.wait(ticket);
        locker.lock();
    }

    /// Wake exactly one waiter, in ticket order.
    pub fn notify_one(&self) {
        self.queue.notify();
    }

    /// Wake every current waiter.
    pub fn notify_all(&self) {
        self.queue.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mutex::Mutex;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_reacquires_the_lock_before_returning() {
        let mutex = Arc::new(Mutex::new());
        let cond = Arc::new(Cond::new());
        let ready = Arc::new(std::sync::atomic::AtomicBool::new(false));

        mutex.lock();

        let waiter = {
            let mutex = mutex.clone();
            let cond = cond.clone();
            let ready = ready.clone();
            thread::spawn(move || {
                mutex.lock();
                while !ready.load(std::sync::atomic::Ordering::Acquire) {
                    cond.wait(&*mutex);
                }
                assert!(mutex.is_locked());
                mutex.unlock().unwrap();
            })
        };

        thread::sleep(std::time::Duration::from_millis(10));
        ready.store(true, std::sync::atomic::Ordering::Release);
        mutex.unlock().unwrap();
        cond.notify_all();

        waiter.join().unwrap();
    }
}
