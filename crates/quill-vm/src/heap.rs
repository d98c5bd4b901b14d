//! The per-runtime garbage-collected heap.
//!
//! A single [`Collector`] is shared by every fiber in a runtime instance;
//! all `Gc`-backed container allocation goes through here so cycle
//! collection has one consistent view of the object graph.

use quill_gc::{Collector, GcConfig, Generation};

/// Owns the tracing collector and exposes the allocation entry point
/// every `Gc`-backed container constructor calls through.
pub struct Heap {
    collector: Collector,
}

impl Heap {
    /// A heap with the default generation thresholds.
    pub fn new() -> Self {
        Heap { collector: Collector::new(GcConfig::default()) }
    }

    /// A heap built from explicit generation thresholds, e.g. for the
    /// `--nogc` CLI flag's "collect only at process exit" mode.
    pub fn with_config(config: GcConfig) -> Self {
        Heap { collector: Collector::new(config) }
    }

    /// The shared collector, for `Gc::new` calls and explicit collection
    /// requests (the `gc()` builtin).
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Run a collection pass over `generation`, returning the number of
    /// objects reclaimed.
    pub fn collect(&self, generation: Generation) -> usize {
        self.collector.collect(generation as u8)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}
