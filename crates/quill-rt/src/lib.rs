//! # Quill Runtime
//!
//! Fiber-based execution core, concurrency primitives, event loop, and
//! module-import subsystem built on top of `quill-vm`'s interpreter,
//! decoupled from it through the `Host` trait `quill-vm` exposes for
//! exactly this purpose.
//!
//! Module layout: `fiber`/`frame` (the
//! execution-context and call-chain types the scheduler moves around),
//! `sync` (the blocking primitives user code and the VM's `sync` blocks
//! are built from), `scheduler` (maps fibers onto OS threads and wires
//! them to `quill-vm` via `Host`), `event_loop` (non-blocking I/O +
//! timers), `import` (module cache and locator/loader chain), `runtime`
//! (the `Runtime` handle a host process assembles these into).

#![warn(missing_docs)]

pub mod event_loop;
pub mod fiber;
pub mod frame;
pub mod import;
pub mod runtime;
pub mod scheduler;
pub mod sync;

pub use event_loop::{CallbackOutcome, Direction, EventLoop};
pub use fiber::{Fiber, FiberOutcome, FiberStatus};
pub use frame::{CallChain, FrameInfo, SyncStack};
pub use import::{FilesystemLocator, Import, Locator, RegisteredModules};
pub use runtime::Runtime;
pub use scheduler::{FiberHost, Scheduler};
