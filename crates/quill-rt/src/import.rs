//! Module cache, locator/loader chain, and cyclic-import detection.
//!
//! Before loading, a sentinel is inserted into the cache under the
//! module's name; if a second `import` of the same name races in (or
//! the module imports itself transitively) it finds the sentinel
//! instead of a real module and reports a circular import instead of
//! recompiling or deadlocking. Once loading finishes, the sentinel is
//! replaced with the real result (or removed on failure, so a later,
//! non-circular retry can succeed). Locators are tried in registration
//! order; the first one that resolves a name to bytecode wins, and
//! that bytecode is handed straight to a fresh fiber to run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use quill_bytecode::Code;
use quill_gc::Collector;
use quill_vm::{Error, ErrorKind, Value, VmResult};

use crate::scheduler::{FiberHost, Scheduler};

enum CacheEntry {
    /// Reserved while a module is being loaded; seeing this for a name
    /// already on the current load stack means a circular import.
    Loading,
    Ready(Value),
}

/// A single entry on the search path consulted to turn a module name
/// into compiled bytecode, in registration order.
///
/// Scanning/parsing source text into a `quill_ast::Module` is an
/// external, out-of-scope frontend; the boundary this crate
/// actually owns is locating and loading already-compiled `Code` — in
/// practice the `.qlc` caches exist because `quill-bytecode`'s `Code`
/// derives `serde::Serialize`/`Deserialize` so it can be cached to disk.
pub trait Locator: Send + Sync {
    /// Resolve `name` to compiled bytecode, or `None` to defer to the
    /// next locator in the chain.
    fn locate(&self, name: &str) -> Option<Code>;
}

/// Resolves `name` by walking a list of search directories for a
/// precompiled `<dir>/<name>.qlc` cache file and deserializing it.
/// Paths are populated from `add_path` calls and the `QUILLPATH`
/// environment variable.
pub struct FilesystemLocator {
    search_paths: Vec<PathBuf>,
}

impl FilesystemLocator {
    /// A locator over `search_paths`, consulted in order.
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        FilesystemLocator { search_paths }
    }
}

impl Locator for FilesystemLocator {
    fn locate(&self, name: &str) -> Option<Code> {
        let rel = format!("{}.qlc", name.replace('.', "/"));
        for dir in &self.search_paths {
            let candidate = dir.join(&rel);
            if let Ok(bytes) = std::fs::read(&candidate) {
                if let Ok(code) = serde_json::from_slice::<Code>(&bytes) {
                    return Some(code);
                }
            }
        }
        None
    }
}

/// An in-process table of already-compiled modules, keyed by name.
/// Used to register a module compiled in-memory (by an embedder driving
/// its own frontend) without round-tripping through a `.qlc` file.
#[derive(Default)]
pub struct RegisteredModules {
    modules: Mutex<FxHashMap<String, Code>>,
}

impl RegisteredModules {
    /// An empty registry.
    pub fn new() -> Self {
        RegisteredModules::default()
    }

    /// Register `code` under `name`, overwriting any previous entry.
    pub fn register(&self, name: impl Into<String>, code: Code) {
        self.modules.lock().insert(name.into(), code);
    }
}

impl Locator for RegisteredModules {
    fn locate(&self, name: &str) -> Option<Code> {
        self.modules.lock().get(name).cloned()
    }
}

/// Module cache and locator chain.
pub struct Import {
    cache: Mutex<FxHashMap<String, CacheEntry>>,
    locators: Vec<Box<dyn Locator>>,
}

impl Import {
    /// An importer with no locators registered; use
    /// [`Import::with_locator`]/[`Import::add_path`] to add search
    /// strategies.
    pub fn new() -> Self {
        Import { cache: Mutex::new(HashMap::default()), locators: Vec::new() }
    }

    /// Append a search directory, consulted after any already registered
    /// (`QUILLPATH` entries are searched in listed order).
    pub fn add_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.locators.push(Box::new(FilesystemLocator::new(vec![path.into()])));
        self
    }

    /// Register a custom locator (e.g. a native/builtin-module table),
    /// consulted before any filesystem path added afterwards.
    pub fn with_locator(mut self, locator: Box<dyn Locator>) -> Self {
        self.locators.push(locator);
        self
    }

    /// Resolve `name` to its module namespace, loading and running it at
    /// most once per importer; subsequent imports of the same name return
    /// the cached namespace. Takes `self` behind an `Arc` since a nested module's `Host` needs
    /// to share this same cache, not a fresh one, for cyclic-import
    /// detection to see across module boundaries.
    pub fn resolve(self: &Arc<Self>, name: &str, scheduler: &Arc<Scheduler>, collector: &Arc<Collector>) -> VmResult<Value> {
        {
            let mut cache = self.cache.lock();
            match cache.get(name) {
                Some(CacheEntry::Ready(value)) => return Ok(value.clone()),
                Some(CacheEntry::Loading) => {
                    return Err(Error::new(ErrorKind::ModuleImportError, format!("circular import of module '{name}'")));
                }
                None => {
                    cache.insert(name.to_string(), CacheEntry::Loading);
                }
            }
        }

        let result = self.load_and_run(name, scheduler, collector);

        let mut cache = self.cache.lock();
        match &result {
            Ok(value) => {
                cache.insert(name.to_string(), CacheEntry::Ready(value.clone()));
            }
            Err(_) => {
                // Loading failed: drop the sentinel so a later, distinct
                // attempt (e.g. after fixing a search path) can retry
                // instead of permanently reporting a circular import.
                cache.remove(name);
            }
        }
        result
    }

    fn load_and_run(self: &Arc<Self>, name: &str, scheduler: &Arc<Scheduler>, collector: &Arc<Collector>) -> VmResult<Value> {
        let code = self
            .locators
            .iter()
            .find_map(|locator| locator.locate(name))
            .ok_or_else(|| Error::new(ErrorKind::ModuleImportError, format!("module '{name}' not found")))?;

        let host = FiberHost::new(scheduler.clone(), collector.clone(), self.clone());
        host.run_to_completion(Arc::new(code))
    }
}

impl Default for Import {
    fn default() -> Self {
        Import::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_gc::GcConfig;

    #[test]
    fn unregistered_module_reports_not_found() {
        let importer = Arc::new(Import::new());
        let scheduler = Scheduler::new(1);
        let collector = Arc::new(Collector::new(GcConfig::default()));
        let err = importer.resolve("missing", &scheduler, &collector).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModuleImportError);
        assert!(err.message().contains("not found"));
    }

    #[test]
    fn a_loading_sentinel_reports_circular_import_without_reloading() {
        let importer = Arc::new(Import::new());
        importer.cache.lock().insert("self".to_string(), CacheEntry::Loading);
        let scheduler = Scheduler::new(1);
        let collector = Arc::new(Collector::new(GcConfig::default()));
        let err = importer.resolve("self", &scheduler, &collector).unwrap_err();
        assert!(err.message().contains("circular import"));
    }

    #[test]
    fn a_cached_module_is_returned_without_relocating() {
        let importer = Arc::new(Import::new().with_locator(Box::new(RegisteredModules::new())));
        importer.cache.lock().insert("m".to_string(), CacheEntry::Ready(Value::Int(7)));
        let scheduler = Scheduler::new(1);
        let collector = Arc::new(Collector::new(GcConfig::default()));
        let value = importer.resolve("m", &scheduler, &collector).unwrap();
        assert!(matches!(value, Value::Int(7)));
    }
}
