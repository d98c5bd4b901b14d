//! The top-level runtime handle a host process constructs once: wrapped
//! in an explicit `quill_rt::Runtime` handle rather than
//! `lazy_static`/global singletons in the library crates themselves.
//!
//! Bundles everything a running program needs threaded through it
//! explicitly — the collector, the fiber scheduler, the module importer,
//! and the event loop — rather than reaching for a global.

use std::path::PathBuf;
use std::sync::Arc;

use quill_bytecode::Code;
use quill_gc::{Collector, GcConfig};
use quill_vm::{Value, VmResult};

use crate::event_loop::EventLoop;
use crate::import::{Import, Locator};
use crate::scheduler::{FiberHost, Scheduler};

/// Owns the collector, scheduler, importer, and event loop a single
/// program run needs. One `Runtime` per process invocation.
pub struct Runtime {
    collector: Arc<Collector>,
    scheduler: Arc<Scheduler>,
    importer: Arc<Import>,
    event_loop: Arc<EventLoop>,
}

impl Runtime {
    /// Assemble a runtime: `threads` worker threads (0 = logical CPU count, `QUILL_MAXVC`), a collector under `gc_config`
    /// (pass a disabled config for `--nogc`), `search_paths` as the
    /// `QUILLPATH` filesystem locator chain, and any `extra_locators`
    /// (e.g. an in-memory module table) consulted before the filesystem
    /// path, in order.
    pub fn new(threads: usize, gc_config: GcConfig, search_paths: Vec<PathBuf>, extra_locators: Vec<Box<dyn Locator>>) -> Runtime {
        let scheduler = if threads == 0 { Scheduler::default_sized() } else { Scheduler::new(threads) };
        let mut importer = Import::new();
        for locator in extra_locators {
            importer = importer.with_locator(locator);
        }
        for path in search_paths {
            importer = importer.add_path(path);
        }
        Runtime {
            collector: Arc::new(Collector::new(gc_config)),
            scheduler,
            importer: Arc::new(importer),
            event_loop: Arc::new(EventLoop::new()),
        }
    }

    /// The shared collector, for reporting `GcStats` or forcing a
    /// collection from the CLI's `--pst`/diagnostics path.
    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// The event loop backing `sleep`/I/O suspension points, driven to
    /// idle by the CLI's main loop after the entry module finishes.
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.event_loop
    }

    /// Run `code`'s module body to completion as the program's top-level
    /// fiber, treating it as an implicit function run once, and return
    /// its result or its uncaught error.
    pub fn run(&self, code: Arc<Code>) -> VmResult<Value> {
        let host = FiberHost::new(self.scheduler.clone(), self.collector.clone(), self.importer.clone());
        host.run_to_completion(code)
    }

    /// Number of worker threads currently executing fiber bodies.
    pub fn active_fibers(&self) -> usize {
        self.scheduler.active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_bytecode::{encode, CodeFlags, Opcode, StaticValue};

    fn trivial_module_returning(n: i64) -> Arc<Code> {
        let mut bytes = Vec::new();
        encode(Opcode::LStatic, 0, &mut bytes);
        encode(Opcode::Ret, 0, &mut bytes);
        Arc::new(Code {
            name: Some("main".into()),
            instructions: bytes,
            statics: vec![StaticValue::Int(n)],
            globals: Vec::new(),
            locals: Vec::new(),
            enclosed: Vec::new(),
            params: Vec::new(),
            stack_size: 4,
            sync_stack_size: 0,
            locals_count: 0,
            line_map: Vec::new(),
            start_line: 1,
            flags: CodeFlags { is_module: true, ..CodeFlags::default() },
            trap_table: Vec::new(),
        })
    }

    #[test]
    fn runs_a_module_to_completion_and_returns_its_value() {
        let runtime = Runtime::new(1, GcConfig::default(), Vec::new(), Vec::new());
        let value = runtime.run(trivial_module_returning(42)).unwrap();
        assert!(matches!(value, Value::Int(42)));
    }
}
