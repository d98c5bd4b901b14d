//! The callable value: a compiled [`quill_bytecode::Code`] paired with the
//! upvalue cells it closed over at definition time (`MkFn`).

use std::sync::{Arc, OnceLock};

use quill_bytecode::Code;
use quill_gc::Trace;

use crate::containers::cell::Cell;
use crate::object::{ArObject, Namespace};
use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};
use crate::value::{ObjectRef, Value};

/// A function value: compiled code plus its captured enclosing-scope cells.
///
/// `enclosed[i]` corresponds to `code.enclosed[i]` — the compiler's
/// enclosed-name table and the closure's capture list share index space,
/// so `LdEnc`/`StEnc idx` just indexes straight into `enclosed`.
pub struct Closure {
    code: Arc<Code>,
    enclosed: Vec<Cell>,
}

impl Closure {
    /// Bind `code` to the upvalue cells it captured when constructed.
    pub fn new(code: Arc<Code>, enclosed: Vec<Cell>) -> Arc<Closure> {
        Arc::new(Closure { code, enclosed })
    }

    /// The compiled body this closure invokes.
    pub fn code(&self) -> &Arc<Code> {
        &self.code
    }

    /// The captured upvalue cells, in `code.enclosed` index order.
    pub fn enclosed(&self) -> &[Cell] {
        &self.enclosed
    }
}

impl Trace for Closure {
    fn trace(&self, visit: &mut dyn FnMut(*const quill_gc::GcHeader)) {
        for cell in &self.enclosed {
            cell.get().trace(visit);
        }
    }
}

impl ArObject for Closure {
    fn type_info(&self) -> Arc<TypeInfo> {
        closure_type_info()
    }

    fn trace_values(&self, visit: &mut dyn FnMut(&Value)) {
        for cell in &self.enclosed {
            let v = cell.get();
            visit(&v);
        }
    }
}

fn as_closure(v: &Value) -> &Closure {
    match v {
        Value::Object(ObjectRef::Closure(c)) => c,
        _ => unreachable!("function type slot invoked on a non-function value"),
    }
}

fn closure_repr(v: &Value) -> String {
    format!("<function {}>", as_closure(v).code.display_name())
}

/// The shared `TypeInfo` describing `function` (a callable closure value).
pub fn closure_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "function",
            qname: None,
            doc: Some("A compiled function closed over its free variables."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None,
                compare: None,
                truthy: None,
                repr: Some(closure_repr),
                str: None,
            },
            object: ObjectSlots::default(),
            subscript: SubscriptSlots::default(),
            ops: OpsSlots::default(),
            iter: IterSlots::default(),
            mro: Vec::new(),
            tp_map: Namespace::new(),
        })
    })
    .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_bytecode::CodeFlags;

    fn sample_code() -> Arc<Code> {
        Arc::new(Code {
            name: Some("f".into()),
            instructions: Vec::new(),
            statics: Vec::new(),
            globals: Vec::new(),
            locals: Vec::new(),
            enclosed: vec!["x".into()],
            params: Vec::new(),
            stack_size: 0,
            sync_stack_size: 0,
            locals_count: 0,
            line_map: Vec::new(),
            start_line: 1,
            flags: CodeFlags::default(),
            trap_table: Vec::new(),
        })
    }

    #[test]
    fn closure_traces_its_captured_cells() {
        let cell = Cell::new(Value::Int(7));
        let closure = Closure::new(sample_code(), vec![cell.clone()]);
        let mut seen = 0;
        closure.trace(&mut |_| seen += 1);
        // Int(7) is an inline scalar; nothing Gc-tracked is reachable.
        assert_eq!(seen, 0);
        assert_eq!(closure.enclosed()[0].get().type_name(), "int");
    }
}
