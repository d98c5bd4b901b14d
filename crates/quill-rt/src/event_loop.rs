//! Non-blocking I/O dispatch and timers.
//!
//! A `BinaryHeap<TimerHeapEntry>` timer min-heap and per-fd event queues,
//! driving fiber wake-up. The actual OS-level readiness primitive
//! (epoll/kqueue/IOCP) is a platform detail the core only sees as "wait
//! with timeout, return ready queues"; this crate models that boundary
//! behind [`EventLoop::submit`]'s callback rather than binding a specific
//! backend, since the platform-specific socket/file wrappers are out of
//! scope.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::fiber::Fiber;
use quill_vm::{Error, ErrorKind, Value, VmResult};

/// A file-descriptor-like handle identifying an I/O source. Platform
/// socket/file wrappers map their native descriptor onto this.
pub type FdId = u64;

/// Direction of a queued I/O event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The fiber is waiting to read from the fd.
    In,
    /// The fiber is waiting to write to the fd.
    Out,
}

/// The result a registered callback returns each time it's invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Dequeue the event and wake its fiber with a successful result.
    Success,
    /// Dequeue the event and wake its fiber with an error.
    Failure,
    /// Leave the event queued — the kernel signaled spuriously.
    Retry,
    /// Leave the event queued without waking the fiber (the callback
    /// internally chains another I/O step).
    Continue,
}

/// A pending I/O operation: the submitting fiber plus the callback that
/// checks readiness and reports the outcome.
pub struct Event {
    /// The fiber that submitted this event and is suspended awaiting it.
    pub fiber: Arc<Fiber>,
    callback: Box<dyn FnMut() -> CallbackOutcome + Send>,
}

struct FdQueues {
    inbound: VecDeque<Event>,
    outbound: VecDeque<Event>,
}

impl FdQueues {
    fn queue_for(&mut self, direction: Direction) -> &mut VecDeque<Event> {
        match direction {
            Direction::In => &mut self.inbound,
            Direction::Out => &mut self.outbound,
        }
    }
}

struct TimerTask {
    deadline: Instant,
    fiber: Arc<Fiber>,
}

struct TimerHeapEntry {
    deadline: Instant,
    seq: u64,
}

impl PartialEq for TimerHeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerHeapEntry {}
impl PartialOrd for TimerHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerHeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // `BinaryHeap` is a max-heap; reverse so the *earliest* deadline
        // sorts first ("timer min-heap").
        other.deadline.cmp(&self.deadline).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The single dispatcher loop per event loop instance.
pub struct EventLoop {
    queues: Mutex<HashMap<FdId, FdQueues>>,
    timer_heap: Mutex<BinaryHeap<TimerHeapEntry>>,
    timer_tasks: Mutex<HashMap<u64, TimerTask>>,
    next_timer_seq: AtomicU64,
    wake: Condvar,
    wake_lock: Mutex<()>,
    shutdown: std::sync::atomic::AtomicBool,
}

impl Default for EventLoop {
    fn default() -> Self {
        EventLoop::new()
    }
}

impl EventLoop {
    /// A fresh, empty event loop.
    pub fn new() -> Self {
        EventLoop {
            queues: Mutex::new(HashMap::new()),
            timer_heap: Mutex::new(BinaryHeap::new()),
            timer_tasks: Mutex::new(HashMap::new()),
            next_timer_seq: AtomicU64::new(0),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
            shutdown: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Submit an I/O event for `fd` and suspend `fiber`'s caller until a
    /// callback resolves it with `Success`/`Failure`. The fiber is marked
    /// `Blocked` and the event appended to the fd's queue; [`EventLoop::turn`]
    /// or [`EventLoop::run_until_idle`] polls it until it resolves.
    pub fn submit(
        &self,
        fd: FdId,
        direction: Direction,
        fiber: Arc<Fiber>,
        callback: impl FnMut() -> CallbackOutcome + Send + 'static,
    ) {
        fiber.set_status(crate::fiber::FiberStatus::Blocked);
        let mut queues = self.queues.lock();
        let entry = queues.entry(fd).or_insert_with(|| FdQueues { inbound: VecDeque::new(), outbound: VecDeque::new() });
        entry.queue_for(direction).push_back(Event { fiber, callback: Box::new(callback) });
        drop(queues);
        self.wake.notify_all();
    }

    /// Schedule `fiber` to be woken after `delay`.
    pub fn set_timeout(&self, delay: Duration, fiber: Arc<Fiber>) -> u64 {
        let seq = self.next_timer_seq.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + delay;
        self.timer_tasks.lock().insert(seq, TimerTask { deadline, fiber });
        self.timer_heap.lock().push(TimerHeapEntry { deadline, seq });
        self.wake.notify_all();
        seq
    }

    /// Run ready callbacks and expired timers once; returns `true` if
    /// there is still pending work (more fds registered or timers
    /// scheduled), so the CLI's main loop knows whether to call again.
    pub fn turn(&self) -> bool {
        self.fire_expired_timers();
        self.run_ready_callbacks();
        self.has_pending_work()
    }

    /// Block the calling (dispatcher) thread until either an fd becomes
    /// ready or the nearest timer's deadline passes, then run one `turn`.
    pub fn run_until_idle(&self) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            let wait_for = self.next_timer_wait();
            {
                let mut guard = self.wake_lock.lock();
                match wait_for {
                    Some(d) if d > Duration::ZERO => {
                        self.wake.wait_for(&mut guard, d);
                    }
                    None if !self.has_pending_work() => return,
                    _ => {}
                }
            }
            if !self.turn() {
                return;
            }
        }
    }

    /// Stop [`EventLoop::run_until_idle`] at the next opportunity.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_all();
    }

    fn next_timer_wait(&self) -> Option<Duration> {
        let heap = self.timer_heap.lock();
        heap.peek().map(|entry| entry.deadline.saturating_duration_since(Instant::now()))
    }

    fn fire_expired_timers(&self) {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut heap = self.timer_heap.lock();
            while matches!(heap.peek(), Some(entry) if entry.deadline <= now) {
                due.push(heap.pop().unwrap());
            }
        }
        let mut tasks = self.timer_tasks.lock();
        for entry in due {
            if let Some(task) = tasks.remove(&entry.seq) {
                task.fiber.complete(crate::fiber::FiberOutcome::Value(Value::Nil));
            }
        }
    }

    fn run_ready_callbacks(&self) {
        let mut to_resolve = Vec::new();
        {
            let mut queues = self.queues.lock();
            for fdqueues in queues.values_mut() {
                Self::drain_queue(&mut fdqueues.inbound, &mut to_resolve);
                Self::drain_queue(&mut fdqueues.outbound, &mut to_resolve);
            }
        }
        for (fiber, outcome) in to_resolve {
            fiber.complete(outcome);
        }
    }

    fn drain_queue(queue: &mut VecDeque<Event>, resolved: &mut Vec<(Arc<Fiber>, crate::fiber::FiberOutcome)>) {
        let mut retained = VecDeque::with_capacity(queue.len());
        while let Some(mut event) = queue.pop_front() {
            if event.fiber.is_cancelled() {
                resolved.push((
                    event.fiber.clone(),
                    crate::fiber::FiberOutcome::Error(Error::new(ErrorKind::RuntimeError, "cancelled")),
                ));
                continue;
            }
            match (event.callback)() {
                CallbackOutcome::Success => {
                    resolved.push((event.fiber.clone(), crate::fiber::FiberOutcome::Value(Value::Nil)));
                }
                CallbackOutcome::Failure => {
                    resolved.push((
                        event.fiber.clone(),
                        crate::fiber::FiberOutcome::Error(Error::new(ErrorKind::RuntimeError, "I/O operation failed")),
                    ));
                }
                CallbackOutcome::Retry => retained.push_back(event),
                CallbackOutcome::Continue => retained.push_back(event),
            }
        }
        *queue = retained;
    }

    fn has_pending_work(&self) -> bool {
        let queues_empty = self.queues.lock().values().all(|q| q.inbound.is_empty() && q.outbound.is_empty());
        let timers_empty = self.timer_heap.lock().is_empty();
        !(queues_empty && timers_empty)
    }
}

/// Block the calling fiber's thread for `duration`, the suspension point
/// behind an explicit `sleep` call. Modeled directly on the event loop's
/// timer mechanism rather than `std::thread::sleep`, so a `sleep` still
/// shows up in the timer min-heap and participates in
/// `has_pending_work`/shutdown accounting the way any other timer does.
pub fn sleep(loop_: &EventLoop, fiber: Arc<Fiber>, duration: Duration) -> VmResult<()> {
    loop_.set_timeout(duration, fiber.clone());
    match fiber.join() {
        crate::fiber::FiberOutcome::Value(_) => Ok(()),
        crate::fiber::FiberOutcome::Error(e) => Err(e),
        crate::fiber::FiberOutcome::Cancelled => Err(Error::new(ErrorKind::RuntimeError, "sleep cancelled")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_fires_after_its_deadline() {
        let loop_ = EventLoop::new();
        let fiber = Fiber::new();
        loop_.set_timeout(Duration::from_millis(1), fiber.clone());
        std::thread::sleep(Duration::from_millis(20));
        loop_.turn();
        assert!(matches!(fiber.status(), crate::fiber::FiberStatus::Completed));
    }

    #[test]
    fn timers_fire_in_deadline_order_even_if_scheduled_out_of_order() {
        let loop_ = EventLoop::new();
        let late = Fiber::new();
        let early = Fiber::new();
        loop_.set_timeout(Duration::from_millis(50), late.clone());
        loop_.set_timeout(Duration::from_millis(1), early.clone());
        std::thread::sleep(Duration::from_millis(10));
        loop_.turn();
        assert!(matches!(early.status(), crate::fiber::FiberStatus::Completed));
        assert!(!matches!(late.status(), crate::fiber::FiberStatus::Completed));
    }
}
