//! Hierarchical symbol table.
//!
//! One [`SymbolNode`] per lexical scope *and* per name declared within it:
//! declaring `let x` inside a function body creates a `VARIABLE` child of
//! that function's node; declaring a nested function creates a `FUNC`
//! child that is itself a scope other names nest under. Each node holds
//! a `parent: Option<usize>` index plus a `HashMap` of children and an
//! explicit "current" cursor rather than a borrowed tree, with an open
//! kind set and closure-capture ("free") marking.

use rustc_hash::FxHashMap;

/// The kind of thing a [`SymbolNode`] denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Not yet classified (used transiently while declaring).
    Unknown,
    /// An ordinary mutable binding.
    Variable,
    /// A `let ... is_const` binding.
    Constant,
    /// A function (itself introduces a nested scope).
    Func,
    /// A struct type (itself introduces a nested scope for its members).
    Struct,
    /// A trait type.
    Trait,
    /// An anonymous nested block (if/while/loop/sync body).
    Nested,
    /// The top-level module scope.
    Module,
    /// A jump label (`break`/`continue` target name).
    Label,
}

/// A node in the symbol tree: both a scope and (for all but the root) the
/// declaration of the name that introduced it.
#[derive(Debug)]
pub struct SymbolNode {
    /// The declared name (empty for implicit nested blocks).
    pub name: String,
    /// What this name denotes.
    pub kind: SymbolKind,
    /// Nesting depth, root (module) is 0.
    pub depth: u32,
    /// Whether this name has completed declaration (guards use-before-def
    /// inside its own initializer).
    pub declared: bool,
    /// Set when a lookup resolves this name from within a nested function
    /// scope: it must be captured as a closure upvalue rather than
    /// addressed as a plain local.
    pub free: bool,
    /// Bytecode local-variable slot, assigned for `Variable`/`Constant`
    /// nodes declared directly in a function or module scope.
    pub slot: Option<u32>,
    parent: Option<usize>,
    children: FxHashMap<String, usize>,
}

/// Where a name resolved to, relative to the scope doing the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Declared in the current function's own scope chain (no function
    /// boundary crossed).
    Local(usize),
    /// Declared in an enclosing function's scope (a function boundary was
    /// crossed) — must be captured as a closure upvalue.
    Enclosed(usize),
    /// Declared directly in the module scope.
    Global(usize),
}

/// The arena-backed symbol tree for one compilation unit.
#[derive(Debug)]
pub struct SymbolTable {
    nodes: Vec<SymbolNode>,
    current: usize,
}

impl SymbolTable {
    /// Create a table with a single root `Module` scope.
    pub fn new(module_name: &str) -> Self {
        SymbolTable {
            nodes: vec![SymbolNode {
                name: module_name.to_string(),
                kind: SymbolKind::Module,
                depth: 0,
                declared: true,
                free: false,
                slot: None,
                parent: None,
                children: FxHashMap::default(),
            }],
            current: 0,
        }
    }

    /// Index of the scope currently being compiled into.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Whether `node` is the module root.
    pub fn is_module_scope(&self, node: usize) -> bool {
        self.nodes[node].parent.is_none()
    }

    /// Whether `node` introduces a function scope (the boundary closure
    /// capture crosses).
    pub fn is_function_scope(&self, node: usize) -> bool {
        matches!(self.nodes[node].kind, SymbolKind::Func | SymbolKind::Module)
    }

    /// Enter a new nested scope under the current node and descend into it.
    /// Returns its node index.
    pub fn enter_scope(&mut self, name: &str, kind: SymbolKind) -> usize {
        let depth = self.nodes[self.current].depth + 1;
        let idx = self.nodes.len();
        self.nodes.push(SymbolNode {
            name: name.to_string(),
            kind,
            depth,
            declared: true,
            free: false,
            slot: None,
            parent: Some(self.current),
            children: FxHashMap::default(),
        });
        self.nodes[self.current].children.insert(format!("$scope:{idx}"), idx);
        self.current = idx;
        idx
    }

    /// Return to the parent of the current scope.
    pub fn exit_scope(&mut self) {
        if let Some(parent) = self.nodes[self.current].parent {
            self.current = parent;
        }
    }

    /// Declare `name` of `kind` in the current scope.
    ///
    /// Errors if `name` is already declared in this exact scope with a
    /// different kind ("redeclaring an already-declared symbol with a different kind is a static error").
    pub fn declare(&mut self, name: &str, kind: SymbolKind) -> Result<usize, (SymbolKind, SymbolKind)> {
        if let Some(&existing) = self.nodes[self.current].children.get(name) {
            let existing_kind = self.nodes[existing].kind;
            if existing_kind != kind {
                return Err((existing_kind, kind));
            }
            return Ok(existing);
        }

        let depth = self.nodes[self.current].depth + 1;
        let idx = self.nodes.len();
        self.nodes.push(SymbolNode {
            name: name.to_string(),
            kind,
            depth,
            declared: true,
            free: false,
            slot: None,
            parent: Some(self.current),
            children: FxHashMap::default(),
        });
        self.nodes[self.current].children.insert(name.to_string(), idx);
        Ok(idx)
    }

    /// Assign a bytecode local slot to a previously declared variable node.
    pub fn set_slot(&mut self, node: usize, slot: u32) {
        self.nodes[node].slot = Some(slot);
    }

    /// Slot assigned to a node, if any.
    pub fn slot_of(&self, node: usize) -> Option<u32> {
        self.nodes[node].slot
    }

    /// Node accessor.
    pub fn node(&self, idx: usize) -> &SymbolNode {
        &self.nodes[idx]
    }

    /// Walk from the current scope toward the root looking for `name`,
    /// marking it `free` (closure-captured) if resolution crosses a
    /// function-scope boundary.
    pub fn lookup(&mut self, name: &str) -> Option<Resolution> {
        let mut scope = self.current;
        let mut crossed_function = false;

        loop {
            if let Some(&found) = self.nodes[scope].children.get(name) {
                if crossed_function {
                    self.nodes[found].free = true;
                    return Some(Resolution::Enclosed(found));
                }
                return Some(if self.is_module_scope(scope) {
                    Resolution::Global(found)
                } else {
                    Resolution::Local(found)
                });
            }

            if self.is_function_scope(scope) {
                crossed_function = true;
            }

            match self.nodes[scope].parent {
                Some(parent) => scope = parent,
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_and_resolves_local() {
        let mut table = SymbolTable::new("main");
        let func = table.enter_scope("f", SymbolKind::Func);
        let x = table.declare("x", SymbolKind::Variable).unwrap();
        assert_eq!(table.current(), func);
        assert_eq!(table.lookup("x"), Some(Resolution::Local(x)));
    }

    #[test]
    fn redeclaration_with_different_kind_errors() {
        let mut table = SymbolTable::new("main");
        table.declare("x", SymbolKind::Variable).unwrap();
        let err = table.declare("x", SymbolKind::Func).unwrap_err();
        assert_eq!(err, (SymbolKind::Variable, SymbolKind::Func));
    }

    #[test]
    fn crossing_function_boundary_marks_free() {
        let mut table = SymbolTable::new("main");
        table.declare("x", SymbolKind::Variable).unwrap();
        table.enter_scope("inner", SymbolKind::Func);
        let resolved = table.lookup("x").unwrap();
        assert!(matches!(resolved, Resolution::Enclosed(_)));
        if let Resolution::Enclosed(idx) = resolved {
            assert!(table.node(idx).free);
        }
    }

    #[test]
    fn global_lookup_from_nested_block() {
        let mut table = SymbolTable::new("main");
        table.declare("g", SymbolKind::Variable).unwrap();
        table.enter_scope("", SymbolKind::Nested);
        assert_eq!(table.lookup("g").map(|r| matches!(r, Resolution::Global(_))), Some(true));
    }
}
