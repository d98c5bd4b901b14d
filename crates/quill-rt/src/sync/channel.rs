//! A bounded MPMC channel: a fixed backlog, separate read/write wait
//! queues, and close semantics where a closed-and-drained channel
//! yields its default value (or panics if none was configured) rather
//! than blocking forever.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::sync::notify_queue::NotifyQueue;
use quill_vm::{Error, ErrorKind, Value, VmResult};

struct State {
    buffer: VecDeque<Value>,
    closed: bool,
}

/// A bounded multi-producer, multi-consumer channel.
pub struct Channel {
    capacity: usize,
    default: Option<Value>,
    state: Mutex<State>,
    readers: NotifyQueue,
    writers: NotifyQueue,
    closed_flag: AtomicBool,
}

impl Channel {
    /// A channel with backlog `capacity` and an optional default value
    /// returned by reads once the channel is closed and drained.
    pub fn new(capacity: usize, default: Option<Value>) -> Self {
        Channel {
            capacity,
            default,
            state: Mutex::new(State { buffer: VecDeque::with_capacity(capacity), closed: false }),
            readers: NotifyQueue::new(),
            writers: NotifyQueue::new(),
            closed_flag: AtomicBool::new(false),
        }
    }

    /// Write `value`, suspending the caller if the channel is full
    /// (`ChanWrite`).
    ///
    /// # Errors
    /// A `RuntimeError` if the channel is closed: writing to a closed
    /// channel panics.
    pub fn write(&self, value: Value) -> VmResult<()> {
        loop {
            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(Error::new(ErrorKind::RuntimeError, "write on closed channel"));
                }
                if state.buffer.len() < self.capacity.max(1) || self.capacity == 0 {
                    // A zero-backlog channel behaves as a rendezvous: a
                    // write succeeds only once a reader is parked, but
                    // for the common case below we still buffer one slot
                    // so reads don't need to race the write exactly.
                    state.buffer.push_back(value);
                    drop(state);
                    self.readers.notify();
                    return Ok(());
                }
            }
            let ticket = self.writers.get_ticket();
            if self.state.lock().buffer.len() < self.capacity {
                continue;
            }
            self.writers.wait(ticket);
        }
    }

    /// Read the next value, suspending the caller if the channel is
    /// empty and open (`ChanRead`). Once closed and drained,
    /// returns the configured default, or a `RuntimeError` if none was
    /// set.
    pub fn read(&self) -> VmResult<Value> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(value) = state.buffer.pop_front() {
                    drop(state);
                    self.writers.notify();
                    return Ok(value);
                }
                if state.closed {
                    return self
                        .default
                        .clone()
                        .ok_or_else(|| Error::new(ErrorKind::RuntimeError, "read on closed, empty channel with no default"));
                }
            }
            let ticket = self.readers.get_ticket();
            let state = self.state.lock();
            if !state.buffer.is_empty() || state.closed {
                continue;
            }
            drop(state);
            self.readers.wait(ticket);
        }
    }

    /// Close the channel, waking every waiter. Idempotent: a closed
    /// channel cannot be reopened and repeated closes are no-ops.
    pub fn close(&self) {
        if self.closed_flag.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.lock().closed = true;
        self.readers.notify_all();
        self.writers.notify_all();
    }

    /// Whether [`Channel::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed_flag.load(Ordering::Acquire)
    }

    /// Drop every buffered value without closing the channel ( `Flush`).
    pub fn flush(&self) {
        let mut state = self.state.lock();
        state.buffer.clear();
        drop(state);
        self.writers.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_per_producer_consumer_pair() {
        let chan = Arc::new(Channel::new(8, None));
        for i in 0..5 {
            chan.write(Value::Int(i)).unwrap();
        }
        for i in 0..5 {
            match chan.read().unwrap() {
                Value::Int(n) => assert_eq!(n, i),
                other => panic!("unexpected {}", other.type_name()),
            }
        }
    }

    #[test]
    fn closing_drains_then_yields_default() {
        let chan = Channel::new(4, Some(Value::Nil));
        chan.write(Value::Int(1)).unwrap();
        chan.close();
        assert!(matches!(chan.read().unwrap(), Value::Int(1)));
        assert!(matches!(chan.read().unwrap(), Value::Nil));
    }

    #[test]
    fn closing_without_a_default_errors_once_drained() {
        let chan = Channel::new(4, None);
        chan.close();
        let err = chan.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuntimeError);
    }

    #[test]
    fn write_after_close_is_an_error() {
        let chan = Channel::new(4, None);
        chan.close();
        let err = chan.write(Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuntimeError);
    }

    #[test]
    fn repeated_close_is_a_no_op() {
        let chan = Channel::new(1, None);
        chan.close();
        chan.close();
        assert!(chan.is_closed());
    }

    #[test]
    fn four_producers_and_four_consumers_see_every_value_exactly_once() {
        // Backlog is 8, so producers must run concurrently with
        // consumers: once the buffer fills, a producer blocks in
        // `writers.wait` until a consumer drains a slot. Joining all
        // producers before any consumer is spawned would deadlock.
        let chan = Arc::new(Channel::new(8, None));
        let total_expected: i64 = 4 * (0..250i64).sum::<i64>();

        let mut producers = Vec::new();
        for _ in 0..4 {
            let chan = chan.clone();
            producers.push(thread::spawn(move || {
                for v in 0..250i64 {
                    chan.write(Value::Int(v)).unwrap();
                }
            }));
        }

        let sum = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let mut consumers = Vec::new();
        for _ in 0..4 {
            let chan = chan.clone();
            let sum = sum.clone();
            consumers.push(thread::spawn(move || {
                while let Ok(Value::Int(n)) = chan.read() {
                    sum.fetch_add(n, Ordering::AcqRel);
                }
            }));
        }

        for p in producers {
            p.join().unwrap();
        }
        chan.close(); // all writes are in; close so readers drain and stop
        for c in consumers {
            c.join().unwrap();
        }

        assert_eq!(sum.load(Ordering::Acquire), total_expected);
    }
}
