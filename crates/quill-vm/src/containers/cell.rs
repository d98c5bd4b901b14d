//! A shared, mutable upvalue slot (`LdEnc`/closure capture).
//!
//! A nested function closing over an outer local doesn't copy it: both
//! the enclosing frame and the closure share one cell, so a write either
//! side makes is visible to the other. Uses the same lock-per-slot
//! idiom `quill_gc`'s `SideTable` uses for its out-of-line counters,
//! scaled down to a single value instead of two counters.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::Value;

/// A shared upvalue cell.
#[derive(Clone)]
pub struct Cell(Arc<Mutex<Value>>);

impl Cell {
    /// Create a new cell holding `value`.
    pub fn new(value: Value) -> Self {
        Cell(Arc::new(Mutex::new(value)))
    }

    /// Read the current value.
    pub fn get(&self) -> Value {
        self.0.lock().clone()
    }

    /// Overwrite the value.
    pub fn set(&self, value: Value) {
        *self.0.lock() = value;
    }
}
