//! Concurrency primitives : the bounded MPMC [`channel`],
//! a ticket-ordered [`notify_queue`], a [`cond`]ition variable built on
//! it, fiber-aware [`mutex`]es, the recursive [`recursive_shared_mutex`]
//! a `sync` block's [`monitor`] is built from.

pub mod channel;
pub mod cond;
pub mod monitor;
pub mod mutex;
pub mod notify_queue;
pub mod recursive_shared_mutex;

pub use channel::Channel;
pub use cond::{Cond, Locker};
pub use monitor::{Monitor, MonitorGuard, MonitorSlot};
pub use mutex::{Mutex, RWMutex};
pub use notify_queue::{NotifyQueue, Ticket};
pub use recursive_shared_mutex::RecursiveSharedMutex;
