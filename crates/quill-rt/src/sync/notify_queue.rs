//! A ticket-based FIFO wait queue (`NotifyQueue`): a monotonically
//! increasing ticket counter and a "next-to-serve" counter, with
//! `Wait`/`Notify`/`NotifyAll` built around them. A textbook design
//! enqueues the waiting `Fiber` onto an intrusive list so `Notify` can
//! wake exactly the one fiber whose
//! ticket was just served without waking anyone else; this crate's
//! fibers suspend by parking their OS thread (see `fiber.rs`) rather
//! than by stack-switching, so the intrusive list collapses to a single
//! shared [`parking_lot::Condvar`] that every waiter blocks on and
//! re-checks its own ticket against on each wake — functionally FIFO
//! (waiters are served in strict ticket order) even though a `Notify`
//! now wakes every parked thread to let the correct one discover it
//! was the match.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

/// A ticket handed out by [`NotifyQueue::get_ticket`].
pub type Ticket = u64;

/// Ticket-ordered FIFO wait queue.
pub struct NotifyQueue {
    served: Mutex<u64>,
    cvar: Condvar,
    /// Cache-padded: every `get_ticket` call (one per wait, from any
    /// number of fibers) bumps this independently of the `served` lock
    /// a `Notify` takes, so the two must not share a cache line.
    next_ticket: CachePadded<AtomicU64>,
}

impl Default for NotifyQueue {
    fn default() -> Self {
        NotifyQueue::new()
    }
}

impl NotifyQueue {
    /// A fresh queue with no outstanding tickets.
    pub fn new() -> Self {
        NotifyQueue { served: Mutex::new(0), cvar: Condvar::new(), next_ticket: CachePadded::new(AtomicU64::new(0)) }
    }

    /// Obtain a ticket before releasing any external lock and suspending
    /// ("a fiber can acquire a ticket *before* suspending, then release an external lock and suspend, atomically with respect to notifications" — since the ticket is already recorded, a `Notify` racing the gap between "release the lock" and "start waiting" can never be missed: `Wait` just observes its ticket was already served and returns immediately).
    pub fn get_ticket(&self) -> Ticket {
        self.next_ticket.fetch_add(1, Ordering::AcqRel)
    }

    /// Block until `ticket` has been served.
    pub fn wait(&self, ticket: Ticket) {
        let mut served = self.served.lock();
        while *served <= ticket {
            self.cvar.wait(&mut served);
        }
    }

    /// Serve the next ticket and wake the one waiter it matches.
    pub fn notify(&self) {
        let mut served = self.served.lock();
        if *served < self.next_ticket.load(Ordering::Acquire) {
            *served += 1;
        }
        self.cvar.notify_all();
    }

    /// Serve every outstanding ticket and wake every waiter.
    pub fn notify_all(&self) {
        let mut served = self.served.lock();
        *served = self.next_ticket.load(Ordering::Acquire);
        self.cvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn waiters_are_released_in_ticket_order() {
        let queue = Arc::new(NotifyQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4u64 {
            let queue = queue.clone();
            let order = order.clone();
            let ticket = queue.get_ticket();
            assert_eq!(ticket, i);
            handles.push(thread::spawn(move || {
                queue.wait(ticket);
                order.lock().push(ticket);
            }));
        }

        for _ in 0..4 {
            thread::sleep(std::time::Duration::from_millis(5));
            queue.notify();
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn ticket_obtained_before_a_racing_notify_is_never_missed() {
        let queue = NotifyQueue::new();
        let ticket = queue.get_ticket();
        queue.notify(); // races ahead of `wait` below
        queue.wait(ticket); // must return immediately, not deadlock
    }
}
