//! The bytecode dispatch loop.
//!
//! A straightforward fetch/decode/dispatch interpreter over the
//! stack-based ISA: one `Frame` per active call, one operand stack per
//! frame, instructions fetched by `quill_bytecode::decode`.
//!
//! Closures capture by reference: every local a nested
//! function's `Code.enclosed` table names is looked up, at `MkFn` time, in
//! the defining frame's own `locals`/`enclosed` cells and cloned into the
//! new closure — so both sides keep sharing the same [`Cell`], exactly
//! the way `containers::cell::Cell` is documented to be used.

use std::sync::Arc;

use quill_bytecode::{decode, Code, Opcode};
use quill_gc::Collector;

use crate::arithmetic::{self, ArithOp};
use crate::compare;
use crate::containers::cell::Cell;
use crate::containers::closure::Closure;
use crate::containers::dict::QDict;
use crate::containers::list::QList;
use crate::containers::namespace::QNamespace;
use crate::containers::set::QSet;
use crate::containers::string::QString;
use crate::containers::struct_instance::StructInstance;
use crate::containers::tuple::QTuple;
use crate::error::{Error, VmResult};
use crate::gcbox::Gc;
use crate::object::ArObject;
use crate::type_info::{CompareMode, TypeInfo};
use crate::value::{ObjectRef, Value};

/// One active call's local state ("frame fields").
pub struct Frame {
    code: Arc<Code>,
    locals: Vec<Cell>,
    enclosed: Vec<Cell>,
    /// The defining module's global namespace. Shared (not captured) —
    /// every frame in the same module sees the same globals regardless of
    /// closure nesting.
    globals: Gc<QNamespace>,
    stack: Vec<Value>,
    /// Thunks queued by `defer`, run in LIFO order when the frame unwinds
    /// , whether by `Ret` or by an escaping error.
    defers: Vec<Value>,
}

impl Frame {
    fn new(code: Arc<Code>, enclosed: Vec<Cell>, globals: Gc<QNamespace>) -> Self {
        let locals = (0..code.locals_count).map(|_| Cell::new(Value::Nil)).collect();
        Frame { code, locals, enclosed, globals, stack: Vec::with_capacity(code.stack_size as usize), defers: Vec::new() }
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or_else(|| Error::new(crate::error::ErrorKind::RuntimeError, "operand stack underflow"))
    }

    fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(Error::new(crate::error::ErrorKind::RuntimeError, "operand stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn local_name(&self, name: &str) -> Option<usize> {
        self.code.locals.iter().position(|n| n == name)
    }

    fn enclosed_name(&self, name: &str) -> Option<usize> {
        self.code.enclosed.iter().position(|n| n == name)
    }

    fn global_name(&self, idx: u32) -> &str {
        self.code.globals.get(idx as usize).map(String::as_str).unwrap_or("")
    }
}

/// Optional hooks an embedding runtime (`quill-rt`) installs to extend the
/// interpreter beyond what `quill-vm` alone can provide: fiber scheduling
/// for `Spw` and module resolution for `ImpMod`/`ImpFrm`. Left unset, both
/// degrade to a synchronous, no-import-subsystem fallback so `quill-vm`
/// stays independently testable.
pub trait Host {
    /// Run `closure(args)` to completion, however the host schedules it
    /// (inline, on a fiber, on a thread pool), returning the eventual
    /// result or a future-like handle wrapping it.
    fn spawn(&self, code: Arc<Code>, enclosed: Vec<Cell>, args: Vec<Value>, globals: Gc<QNamespace>) -> VmResult<Value>;

    /// Resolve and return the module value named `name`.
    fn import_module(&self, name: &str) -> VmResult<Value>;
}

/// The fetch/decode/dispatch loop itself, parameterized over the heap it
/// allocates into and the optional host hooks above.
pub struct Interpreter<'a> {
    collector: &'a Collector,
    host: Option<&'a dyn Host>,
}

impl<'a> Interpreter<'a> {
    /// An interpreter with no host hooks: `Spw` runs its body inline and
    /// `ImpMod`/`ImpFrm` always raise `ModuleImportError`.
    pub fn new(collector: &'a Collector) -> Self {
        Interpreter { collector, host: None }
    }

    /// An interpreter whose `Spw`/import opcodes delegate to `host`.
    pub fn with_host(collector: &'a Collector, host: &'a dyn Host) -> Self {
        Interpreter { collector, host: Some(host) }
    }

    /// Run a module's top-level `Code` to completion in a fresh global
    /// namespace, returning that namespace alongside the module's result
    /// value (a module is "an implicit function with no parameters run once at import time").
    pub fn run_module(&self, code: Arc<Code>) -> VmResult<(Value, Gc<QNamespace>)> {
        let globals = QNamespace::new(self.collector);
        let mut frame = Frame::new(code, Vec::new(), globals.clone());
        let result = self.run(&mut frame)?;
        Ok((result, globals))
    }

    /// Call a closure with already-evaluated positional arguments and an
    /// optional trailing keyword-argument dict.
    pub fn call(&self, closure: &Closure, args: Vec<Value>, kwargs: Option<Value>, globals: Gc<QNamespace>) -> VmResult<Value> {
        let mut frame = self.bind_frame(closure, args, kwargs, globals)?;
        self.run(&mut frame)
    }

    fn bind_frame(&self, closure: &Closure, mut args: Vec<Value>, kwargs: Option<Value>, globals: Gc<QNamespace>) -> VmResult<Frame> {
        let code = closure.code().clone();
        let nparams = code.params.len();

        if args.len() > nparams && !code.flags.variadic {
            return Err(Error::type_error(format!(
                "{}() takes {} positional argument(s) but {} were given",
                code.display_name(),
                nparams,
                args.len()
            )));
        }
        if args.len() < nparams {
            return Err(Error::type_error(format!(
                "{}() missing {} required positional argument(s)",
                code.display_name(),
                nparams - args.len()
            )));
        }

        let rest = if code.flags.variadic { args.split_off(nparams) } else { Vec::new() };

        if kwargs.is_some() && !code.flags.kwargs {
            return Err(Error::type_error(format!("{}() got unexpected keyword arguments", code.display_name())));
        }

        let mut frame = Frame::new(code.clone(), closure.enclosed().to_vec(), globals);
        for (slot, value) in args.into_iter().enumerate() {
            frame.locals[slot].set(value);
        }
        let mut next_slot = nparams;
        if code.flags.variadic {
            frame.locals[next_slot].set(Value::Object(ObjectRef::List(QList::from_vec(rest, self.collector))));
            next_slot += 1;
        }
        if code.flags.kwargs {
            let dict_value = kwargs.unwrap_or_else(|| Value::Object(ObjectRef::Dict(QDict::new(self.collector))));
            frame.locals[next_slot].set(dict_value);
        }
        Ok(frame)
    }

    /// Build a closure at an `MkFn` site: resolve each name `code.enclosed`
    /// lists against `defining`'s own locals first, then its own enclosed
    /// cells (for a closure nested inside another closure), sharing the
    /// same `Cell` rather than copying its value.
    fn make_closure(&self, defining: &Frame, code: Arc<Code>) -> VmResult<Value> {
        let mut enclosed = Vec::with_capacity(code.enclosed.len());
        for name in &code.enclosed {
            let cell = if let Some(slot) = defining.local_name(name) {
                defining.locals[slot].clone()
            } else if let Some(slot) = defining.enclosed_name(name) {
                defining.enclosed[slot].clone()
            } else {
                return Err(Error::new(
                    crate::error::ErrorKind::RuntimeError,
                    format!("cannot resolve captured name '{name}' at closure creation"),
                ));
            };
            enclosed.push(cell);
        }
        Ok(Value::Object(ObjectRef::Closure(Closure::new(code, enclosed))))
    }

    fn run(&self, frame: &mut Frame) -> VmResult<Value> {
        let mut ip: u32 = 0;
        loop {
            let (op, arg, len) = match decode(&frame.code.instructions, ip as usize) {
                Some(t) => t,
                None => {
                    return Err(Error::new(crate::error::ErrorKind::RuntimeError, "instruction pointer ran past the end of the code"))
                }
            };
            match self.step(frame, op, arg, ip) {
                Ok(Step::Advance) => ip += len as u32,
                Ok(Step::Jump(target)) => ip = target,
                Ok(Step::Return(value)) => {
                    self.run_defers(frame)?;
                    return Ok(value);
                }
                Err(err) => {
                    if let Some(target) = self.dispatch_trap(frame, ip, &err)? {
                        ip = target;
                    } else {
                        self.run_defers(frame).ok();
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Run every queued `defer` thunk, most-recently-deferred first. Each
    /// thunk is a zero-argument closure; a panic raised by one chains the
    /// prior in-flight error as its `cause` when one exists.
    fn run_defers(&self, frame: &mut Frame) -> VmResult<()> {
        let mut pending: Option<Error> = None;
        while let Some(thunk) = frame.defers.pop() {
            let outcome = match &thunk {
                Value::Object(ObjectRef::Closure(c)) => self.call(c, Vec::new(), None, frame.globals.clone()),
                _ => Ok(Value::Nil),
            };
            if let Err(e) = outcome {
                pending = Some(match pending {
                    Some(prior) => Error::with_cause(e.kind(), e.message().to_string(), prior),
                    None => e,
                });
            }
        }
        match pending {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// On an escaping error at `ip`, find the innermost covering trap and
    /// jump into its handler, pushing the error value only when the
    /// handler's first instruction is actually going to consume it (a
    /// `handlers` entry with an empty bind name never does, per
    /// `quill-compiler`'s codegen for `Stmt::Trap`).
    fn dispatch_trap(&self, frame: &mut Frame, ip: u32, err: &Error) -> VmResult<Option<u32>> {
        let Some(trap) = frame.code.trap_entry_for(ip).copied() else {
            return Ok(None);
        };
        let consumes = matches!(decode(&frame.code.instructions, trap.handler as usize), Some((Opcode::StLc | Opcode::StGbl, _, _)));
        if consumes {
            frame.push(Value::from(err.clone()));
        }
        Ok(Some(trap.handler))
    }

    fn step(&self, frame: &mut Frame, op: Opcode, arg: u32, ip: u32) -> VmResult<Step> {
        use Opcode::*;
        match op {
            LStatic => {
                frame.push(static_to_value(self, &frame.code.clone(), arg)?);
            }
            LdGbl => {
                let name = frame.global_name(arg).to_string();
                let v = frame
                    .globals
                    .get(&name)
                    .ok_or_else(|| Error::attribute_error(format!("undefined global '{name}'")))?;
                frame.push(v);
            }
            LdLc => {
                frame.push(frame.locals[arg as usize].get());
            }
            LdEnc => {
                frame.push(frame.enclosed[arg as usize].get());
            }
            LdScope => {
                frame.push(Value::Object(ObjectRef::Namespace(frame.globals.clone())));
            }
            LdAttr => {
                let name = frame.global_name(arg).to_string();
                let obj = frame.pop()?;
                frame.push(get_attr(&obj, &name)?);
            }
            LdMeth => {
                let name = frame.global_name(arg).to_string();
                let obj = frame.pop()?;
                frame.push(get_attr(&obj, &name)?);
            }
            StAttr => {
                let name = frame.global_name(arg).to_string();
                let value = frame.pop()?;
                let obj = frame.pop()?;
                set_attr(&obj, &name, value)?;
            }
            StLc => {
                let value = frame.pop()?;
                frame.locals[arg as usize].set(value);
            }
            StGbl => {
                let name = frame.global_name(arg).to_string();
                let value = frame.pop()?;
                frame.globals.set(name, value);
            }
            StEnc => {
                let value = frame.pop()?;
                frame.enclosed[arg as usize].set(value);
            }
            LdIdx => {
                let index = frame.pop()?;
                let target = frame.pop()?;
                frame.push(subscript_get(&target, &index)?);
            }
            StIdx => {
                let index = frame.pop()?;
                let target = frame.pop()?;
                let value = frame.pop()?;
                subscript_set(&target, &index, value)?;
            }
            Add => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(self.eval_add(&lhs, &rhs)?);
            }
            Sub | Mul | Div | IDiv | Mod | Shl | Shr | Land | Lor | Lxor => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(arithmetic::eval(arith_op(op), &lhs, &rhs)?);
            }
            InpAdd => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(self.eval_add(&lhs, &rhs)?);
            }
            InpSub | InpMul | InpDiv => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(arithmetic::eval(arith_op(op), &lhs, &rhs)?);
            }
            Neg => {
                let v = frame.pop()?;
                frame.push(arithmetic::eval_neg(&v)?);
            }
            LNot => {
                let v = frame.pop()?;
                frame.push(arithmetic::eval_bitnot(&v)?);
            }
            Not => {
                let v = frame.pop()?;
                frame.push(arithmetic::eval_not(&v));
            }
            CmpEq | CmpNe | CmpGr | CmpGrq | CmpLe | CmpLeq => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(compare::eval(compare_mode(op), &lhs, &rhs)?);
            }
            Jmp => return Ok(Step::Jump(arg)),
            Jf => {
                let v = frame.pop()?;
                if !v.is_truthy() {
                    return Ok(Step::Jump(arg));
                }
            }
            Jt => {
                let v = frame.pop()?;
                if v.is_truthy() {
                    return Ok(Step::Jump(arg));
                }
            }
            Jex => {
                // Reserved for a future compiler emission that checks a
                // pending fiber-level error; the current codegen never
                // raises one mid-frame outside the normal `Err` unwind
                // path, so this is always a fallthrough today.
            }
            Jfop => {
                let truthy = frame.stack.last().map(Value::is_truthy).unwrap_or(false);
                if !truthy {
                    return Ok(Step::Jump(arg));
                }
                frame.pop()?;
            }
            Jtop => {
                let truthy = frame.stack.last().map(Value::is_truthy).unwrap_or(false);
                if truthy {
                    return Ok(Step::Jump(arg));
                }
                frame.pop()?;
            }
            Jnil => {
                let v = frame.pop()?;
                if matches!(v, Value::Nil) {
                    return Ok(Step::Jump(arg));
                }
            }
            Jnn => {
                let v = frame.pop()?;
                if !matches!(v, Value::Nil) {
                    return Ok(Step::Jump(arg));
                }
            }
            Call => {
                let result = self.dispatch_call(frame, arg)?;
                frame.push(result);
            }
            Spw => {
                let result = self.dispatch_spawn(frame, arg)?;
                frame.push(result);
            }
            Init => {
                let result = self.dispatch_init(frame, arg)?;
                frame.push(result);
            }
            Dfr => {
                let thunk = frame.pop()?;
                frame.defers.push(thunk);
            }
            Ret => {
                let value = frame.pop()?;
                return Ok(Step::Return(value));
            }
            MkDt => {
                let n = arg as usize;
                let pairs = frame.pop_n(2 * n)?;
                let dict = QDict::new(self.collector);
                for chunk in pairs.chunks(2) {
                    dict.insert(chunk[0].clone(), chunk[1].clone())?;
                }
                frame.push(Value::Object(ObjectRef::Dict(dict)));
            }
            MkLt => {
                let items = frame.pop_n(arg as usize)?;
                frame.push(Value::Object(ObjectRef::List(QList::from_vec(items, self.collector))));
            }
            MkSt => {
                let items = frame.pop_n(arg as usize)?;
                let set = QSet::new(self.collector);
                for v in items {
                    set.insert(v)?;
                }
                frame.push(Value::Object(ObjectRef::Set(set)));
            }
            MkTp => {
                let items = frame.pop_n(arg as usize)?;
                frame.push(Value::Object(ObjectRef::Tuple(QTuple::new(items))));
            }
            PopGt => {
                // Dropping the popped values is enough to release any RAII-
                // style guard among them (e.g. a `sync` monitor handle),
                // since its release runs in its own `Drop` impl.
                frame.pop_n(arg as usize)?;
            }
            Dup => {
                let v = frame.stack.last().cloned().ok_or_else(|| {
                    Error::new(crate::error::ErrorKind::RuntimeError, "operand stack underflow")
                })?;
                frame.push(v);
            }
            Pop => {
                frame.pop()?;
            }
            ImpFrm => {
                let name = frame.global_name(arg).to_string();
                let module = frame.pop()?;
                frame.push(get_attr(&module, &name)?);
            }
            ImpMod => {
                let code = frame.code.clone();
                let name = match code.statics.get(arg as usize) {
                    Some(quill_bytecode::StaticValue::String(s)) => s.as_ref(),
                    _ => return Err(Error::new(crate::error::ErrorKind::RuntimeError, "ImpMod static is not a string")),
                };
                let value = match self.host {
                    Some(host) => host.import_module(name)?,
                    None => return Err(Error::module_import(format!("no module importer configured for '{name}'"))),
                };
                frame.push(value);
            }
            MkFn => {
                let code = frame.code.clone();
                let inner = match code.statics.get(arg as usize) {
                    Some(quill_bytecode::StaticValue::Code(c)) => c.clone(),
                    _ => return Err(Error::new(crate::error::ErrorKind::RuntimeError, "MkFn static is not a code object")),
                };
                let closure = self.make_closure(frame, inner)?;
                frame.push(closure);
            }
        }
        Ok(Step::Advance)
    }

    fn eval_add(&self, lhs: &Value, rhs: &Value) -> VmResult<Value> {
        match (lhs, rhs) {
            (Value::Object(ObjectRef::Str(a)), Value::Object(ObjectRef::Str(b))) => {
                Ok(Value::Object(ObjectRef::Str(QString::new(format!("{}{}", a.as_str(), b.as_str())))))
            }
            (Value::Object(ObjectRef::List(a)), Value::Object(ObjectRef::List(b))) => {
                let mut items = Vec::with_capacity(a.len() + b.len());
                for i in 0..a.len() {
                    items.push(a.get(&Value::Int(i as i64))?);
                }
                for i in 0..b.len() {
                    items.push(b.get(&Value::Int(i as i64))?);
                }
                Ok(Value::Object(ObjectRef::List(QList::from_vec(items, self.collector))))
            }
            (Value::Object(ObjectRef::Tuple(a)), Value::Object(ObjectRef::Tuple(b))) => {
                let mut items = a.as_slice().to_vec();
                items.extend_from_slice(b.as_slice());
                Ok(Value::Object(ObjectRef::Tuple(QTuple::new(items))))
            }
            _ => arithmetic::eval(ArithOp::Add, lhs, rhs),
        }
    }

    fn dispatch_call(&self, frame: &mut Frame, arg: u32) -> VmResult<Value> {
        let (argc, mode) = quill_bytecode::instruction::unpack_call_arg(arg);
        let kwargs = if mode.has_kwargs() { Some(frame.pop()?) } else { None };
        let args = frame.pop_n(argc as usize)?;
        let callee = frame.pop()?;
        self.invoke(frame, &callee, args, kwargs)
    }

    fn invoke(&self, frame: &Frame, callee: &Value, args: Vec<Value>, kwargs: Option<Value>) -> VmResult<Value> {
        match callee {
            Value::Object(ObjectRef::Closure(c)) => self.call(c, args, kwargs, frame.globals.clone()),
            Value::Object(ObjectRef::Type(t)) => self.construct(frame, t.clone(), args),
            Value::Object(ObjectRef::Native(n)) => n.call(None, &args, kwargs.as_ref()),
            _ => Err(Error::type_error(format!("'{}' object is not callable", callee.type_name()))),
        }
    }

    fn dispatch_spawn(&self, frame: &mut Frame, arg: u32) -> VmResult<Value> {
        let (argc, mode) = quill_bytecode::instruction::unpack_call_arg(arg);
        let kwargs = if mode.has_kwargs() { Some(frame.pop()?) } else { None };
        let args = frame.pop_n(argc as usize)?;
        let callee = frame.pop()?;
        match (&callee, self.host) {
            (Value::Object(ObjectRef::Closure(c)), Some(host)) => {
                host.spawn(c.code().clone(), c.enclosed().to_vec(), args, frame.globals.clone())
            }
            _ => self.invoke(frame, &callee, args, kwargs),
        }
    }

    /// `Init` shares `Call`'s argument encoding but treats its
    /// callee as an already-constructed instance: it looks up and invokes
    /// `init` as an unbound method (the instance passed as the first
    /// argument), then yields the instance rather than `init`'s own return
    /// value.
    fn dispatch_init(&self, frame: &mut Frame, arg: u32) -> VmResult<Value> {
        let (argc, mode) = quill_bytecode::instruction::unpack_call_arg(arg);
        let kwargs = if mode.has_kwargs() { Some(frame.pop()?) } else { None };
        let args = frame.pop_n(argc as usize)?;
        let target = frame.pop()?;
        self.run_init(frame, &target, args, kwargs)?;
        Ok(target)
    }

    fn run_init(&self, frame: &Frame, target: &Value, args: Vec<Value>, kwargs: Option<Value>) -> VmResult<()> {
        let Ok(init_fn) = get_attr(target, "init") else {
            return Ok(());
        };
        if let Value::Object(ObjectRef::Closure(c)) = init_fn {
            let mut bound = Vec::with_capacity(args.len() + 1);
            bound.push(target.clone());
            bound.extend(args);
            self.call(&c, bound, kwargs, frame.globals.clone())?;
        }
        Ok(())
    }

    fn construct(&self, frame: &Frame, type_info: Arc<TypeInfo>, args: Vec<Value>) -> VmResult<Value> {
        let instance = StructInstance::new(type_info, self.collector);
        let value = Value::Object(ObjectRef::Struct(instance));
        self.run_init(frame, &value, args, None)?;
        Ok(value)
    }
}

enum Step {
    Advance,
    Jump(u32),
    Return(Value),
}

fn arith_op(op: Opcode) -> ArithOp {
    match op {
        Opcode::Sub | Opcode::InpSub => ArithOp::Sub,
        Opcode::Mul | Opcode::InpMul => ArithOp::Mul,
        Opcode::Div | Opcode::InpDiv => ArithOp::Div,
        Opcode::IDiv => ArithOp::IDiv,
        Opcode::Mod => ArithOp::Mod,
        Opcode::Shl => ArithOp::Shl,
        Opcode::Shr => ArithOp::Shr,
        Opcode::Land => ArithOp::Land,
        Opcode::Lor => ArithOp::Lor,
        Opcode::Lxor => ArithOp::Lxor,
        _ => unreachable!("arith_op called on a non-arithmetic opcode"),
    }
}

fn compare_mode(op: Opcode) -> CompareMode {
    match op {
        Opcode::CmpEq => CompareMode::Eq,
        Opcode::CmpNe => CompareMode::Ne,
        Opcode::CmpGr => CompareMode::Gr,
        Opcode::CmpGrq => CompareMode::Grq,
        Opcode::CmpLe => CompareMode::Le,
        Opcode::CmpLeq => CompareMode::Leq,
        _ => unreachable!("compare_mode called on a non-comparison opcode"),
    }
}

fn static_to_value(interp: &Interpreter<'_>, code: &Arc<Code>, idx: u32) -> VmResult<Value> {
    match code.statics.get(idx as usize) {
        Some(quill_bytecode::StaticValue::Nil) => Ok(Value::Nil),
        Some(quill_bytecode::StaticValue::Bool(b)) => Ok(Value::Bool(*b)),
        Some(quill_bytecode::StaticValue::Int(i)) => Ok(Value::Int(*i)),
        Some(quill_bytecode::StaticValue::UInt(u)) => Ok(Value::UInt(*u)),
        Some(quill_bytecode::StaticValue::Decimal(d)) => Ok(Value::Decimal(*d)),
        Some(quill_bytecode::StaticValue::String(s)) => Ok(Value::Object(ObjectRef::Str(QString::new(s.to_string())))),
        Some(quill_bytecode::StaticValue::Bytes(b)) => {
            Ok(Value::Object(ObjectRef::Bytes(crate::containers::bytes::QBytes::new(b.clone()))))
        }
        Some(quill_bytecode::StaticValue::Code(_)) => {
            // `LStatic` never targets a `Code` constant directly; closures
            // are built through `MkFn`, which re-reads the same slot.
            let _ = interp;
            Err(Error::new(crate::error::ErrorKind::RuntimeError, "LStatic cannot load a code constant"))
        }
        None => Err(Error::new(crate::error::ErrorKind::RuntimeError, "static pool index out of range")),
    }
}

fn get_attr(value: &Value, name: &str) -> VmResult<Value> {
    match value {
        Value::Object(ObjectRef::Type(t)) => t
            .tp_map
            .get(name)
            .cloned()
            .ok_or_else(|| Error::attribute_error(format!("type '{}' has no attribute '{name}'", t.display_name()))),
        Value::Object(ObjectRef::Str(s)) => s.get_attr(name),
        Value::Object(ObjectRef::Bytes(b)) => b.get_attr(name),
        Value::Object(ObjectRef::Tuple(t)) => t.get_attr(name),
        Value::Object(ObjectRef::List(l)) => l.get_attr(name),
        Value::Object(ObjectRef::Dict(d)) => d.get_attr(name),
        Value::Object(ObjectRef::Set(s)) => s.get_attr(name),
        Value::Object(ObjectRef::Namespace(n)) => n.get_attr(name),
        Value::Object(ObjectRef::Closure(c)) => c.get_attr(name),
        Value::Object(ObjectRef::Struct(s)) => s.get_attr(name),
        _ => Err(Error::attribute_error(format!("'{}' object has no attribute '{name}'", value.type_name()))),
    }
}

fn set_attr(target: &Value, name: &str, value: Value) -> VmResult<()> {
    match target {
        Value::Object(ObjectRef::Namespace(n)) => {
            n.set(name.to_string(), value);
            Ok(())
        }
        Value::Object(ObjectRef::Struct(s)) => {
            s.set_field(name.to_string(), value);
            Ok(())
        }
        _ => Err(Error::attribute_error(format!("'{}' object has no settable attribute '{name}'", target.type_name()))),
    }
}

fn subscript_get(target: &Value, index: &Value) -> VmResult<Value> {
    match target {
        Value::Object(obj) => {
            let ty = obj.type_name_type_info();
            match ty.subscript.get_item {
                Some(f) => f(target, index),
                None => Err(Error::type_error(format!("'{}' object is not subscriptable", ty.display_name()))),
            }
        }
        _ => Err(Error::type_error(format!("'{}' object is not subscriptable", target.type_name()))),
    }
}

fn subscript_set(target: &Value, index: &Value, value: Value) -> VmResult<()> {
    match target {
        Value::Object(obj) => {
            let ty = obj.type_name_type_info();
            match ty.subscript.set_item {
                Some(f) => f(target, index, value),
                None => Err(Error::type_error(format!("'{}' object does not support item assignment", ty.display_name()))),
            }
        }
        _ => Err(Error::type_error(format!("'{}' object does not support item assignment", target.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_bytecode::{encode, CodeFlags};
    use quill_gc::GcConfig;

    fn code_from(instructions: Vec<(Opcode, u32)>, statics: Vec<quill_bytecode::StaticValue>) -> Arc<Code> {
        let mut bytes = Vec::new();
        for (op, arg) in instructions {
            encode(op, arg, &mut bytes);
        }
        Arc::new(Code {
            name: Some("test".into()),
            instructions: bytes,
            statics,
            globals: Vec::new(),
            locals: Vec::new(),
            enclosed: Vec::new(),
            params: Vec::new(),
            stack_size: 8,
            sync_stack_size: 0,
            locals_count: 0,
            line_map: Vec::new(),
            start_line: 1,
            flags: CodeFlags::default(),
            trap_table: Vec::new(),
        })
    }

    #[test]
    fn adds_two_integer_constants() {
        let collector = Collector::new(GcConfig::default());
        let code = code_from(
            vec![(Opcode::LStatic, 0), (Opcode::LStatic, 1), (Opcode::Add, 0), (Opcode::Ret, 0)],
            vec![quill_bytecode::StaticValue::Int(2), quill_bytecode::StaticValue::Int(3)],
        );
        let interp = Interpreter::new(&collector);
        let (result, _) = interp.run_module(code).unwrap();
        assert!(matches!(result, Value::Int(5)));
    }

    #[test]
    fn concatenates_two_string_constants() {
        let collector = Collector::new(GcConfig::default());
        let code = code_from(
            vec![(Opcode::LStatic, 0), (Opcode::LStatic, 1), (Opcode::Add, 0), (Opcode::Ret, 0)],
            vec![
                quill_bytecode::StaticValue::String("foo".into()),
                quill_bytecode::StaticValue::String("bar".into()),
            ],
        );
        let interp = Interpreter::new(&collector);
        let (result, _) = interp.run_module(code).unwrap();
        match result {
            Value::Object(ObjectRef::Str(s)) => assert_eq!(s.as_str(), "foobar"),
            other => panic!("expected a string, got {}", other.type_name()),
        }
    }

    #[test]
    fn builds_and_reads_back_a_list() {
        let collector = Collector::new(GcConfig::default());
        let code = code_from(
            vec![
                (Opcode::LStatic, 0),
                (Opcode::LStatic, 1),
                (Opcode::MkLt, 2),
                (Opcode::LStatic, 2),
                (Opcode::LdIdx, 0),
                (Opcode::Ret, 0),
            ],
            vec![
                quill_bytecode::StaticValue::Int(10),
                quill_bytecode::StaticValue::Int(20),
                quill_bytecode::StaticValue::Int(1),
            ],
        );
        let interp = Interpreter::new(&collector);
        let (result, _) = interp.run_module(code).unwrap();
        assert!(matches!(result, Value::Int(20)));
    }

    #[test]
    fn division_by_zero_propagates_as_overflow_error() {
        let collector = Collector::new(GcConfig::default());
        let code = code_from(
            vec![(Opcode::LStatic, 0), (Opcode::LStatic, 1), (Opcode::Div, 0), (Opcode::Ret, 0)],
            vec![quill_bytecode::StaticValue::Int(1), quill_bytecode::StaticValue::Int(0)],
        );
        let interp = Interpreter::new(&collector);
        let err = interp.run_module(code).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OverflowError);
    }

    #[test]
    fn trap_without_bind_name_does_not_leak_the_error_onto_the_stack() {
        // body: [0..4) raises by dividing by zero; handler at offset 4
        // starts directly with `Ret` (as if `bind_name` were empty), so
        // the interpreter must not push the error value in front of it.
        let collector = Collector::new(GcConfig::default());
        let mut code = code_from(
            vec![
                (Opcode::LStatic, 0),
                (Opcode::LStatic, 1),
                (Opcode::Div, 0), // offset 4: raises OverflowError
                (Opcode::Ret, 0),
                (Opcode::LStatic, 2), // handler: offset 7
                (Opcode::Ret, 0),
            ],
            vec![
                quill_bytecode::StaticValue::Int(1),
                quill_bytecode::StaticValue::Int(0),
                quill_bytecode::StaticValue::Int(42),
            ],
        );
        Arc::get_mut(&mut code).unwrap().trap_table =
            vec![quill_bytecode::TrapEntry { start: 0, end: 4, handler: 7 }];
        let interp = Interpreter::new(&collector);
        let (result, _) = interp.run_module(code).unwrap();
        assert!(matches!(result, Value::Int(42)));
    }
}
