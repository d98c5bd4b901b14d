//! Native-function call convention.
//!
//! A native function describes its positional parameters as a name plus
//! an accepted-type set (`PCheck`); the VM checks argument count and
//! types before dispatch, and keyword arguments are pulled out of the
//! trailing kwarg dict one at a time by name rather than bound
//! positionally. [`Param`] is built directly as a Rust value, one per
//! built-in, rather than parsed from a descriptor string at registration
//! time.

use std::sync::{Arc, OnceLock};

use crate::error::{Error, VmResult};
use crate::object::Namespace;
use crate::type_info::{CoreSlots, IterSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};
use crate::value::{ObjectRef, Value};

/// One positional parameter: its name (for error messages) and the set
/// of type names it accepts. An empty `types` slice means "any type".
pub struct Param {
    /// The parameter's name, used in `TypeError`/`ValueError` messages.
    pub name: &'static str,
    /// Accepted `Value::type_name()` values; empty accepts anything.
    pub types: &'static [&'static str],
}

/// A native function's positional-parameter contract ( `pcheck`). Checked before the function body ever runs.
pub struct PCheck {
    params: &'static [Param],
}

impl PCheck {
    /// Describe a fixed positional-parameter list.
    pub const fn new(params: &'static [Param]) -> Self {
        PCheck { params }
    }

    /// Validate `args` against this parameter list: count (for a
    /// non-variadic native; variadic natives only check the declared
    /// leading parameters and let `NativeFunction::call` fold the rest)
    /// and, per parameter, that its runtime type name is among the
    /// accepted set.
    fn check(&self, name: &str, args: &[Value], variadic: bool) -> VmResult<()> {
        if !variadic {
            variadic_check_positional(name, args.len(), self.params.len(), self.params.len())?;
        } else if args.len() < self.params.len() {
            return variadic_check_positional(name, args.len(), self.params.len(), usize::MAX);
        }

        for (param, arg) in self.params.iter().zip(args.iter()) {
            if param.types.is_empty() {
                continue;
            }
            if !param.types.contains(&arg.type_name()) {
                return Err(Error::type_error(format!(
                    "{name}() argument '{}' must be {} (got {})",
                    param.name,
                    param.types.join(" or "),
                    arg.type_name()
                )));
            }
        }
        Ok(())
    }
}

/// `VariadicCheckPositional` (/ pcheck.cpp): report a
/// `TypeError` when `nargs` falls outside `[min, max]`, phrasing the
/// message the way a fixed-arity and a variadic mismatch each read
/// naturally. `max == usize::MAX` means "no upper bound".
pub fn variadic_check_positional(name: &str, nargs: usize, min: usize, max: usize) -> VmResult<()> {
    if nargs < min {
        let bound = if min == max { String::new() } else { "at least ".to_string() };
        return Err(Error::type_error(format!(
            "{name}() expected {bound}{min} argument{}, got {nargs}",
            if min == 1 { "" } else { "s" }
        )));
    }
    if max != usize::MAX && max > min && nargs > max {
        return Err(Error::type_error(format!(
            "{name}() expected at most {max} argument{}, got {nargs}",
            if max == 1 { "" } else { "s" }
        )));
    }
    Ok(())
}

/// What a native function body receives: the already-checked positional
/// arguments, an optional bound receiver (method calls), and the raw
/// keyword-argument dict, if the caller supplied one.
pub struct NativeCall<'a> {
    /// The bound receiver for a method call; `None` for a plain function.
    pub receiver: Option<&'a Value>,
    /// Positional arguments, variadic overflow already folded into the
    /// trailing rest-list element when [`NativeFunction::variadic`] is set.
    pub args: &'a [Value],
    /// The trailing keyword-argument dict, if any and if
    /// [`NativeFunction::kwargs`] is set.
    pub kwargs: Option<&'a Value>,
}

/// A native (Rust-implemented) callable's body.
pub type NativeFn = fn(&NativeCall) -> VmResult<Value>;

/// A built-in function or method . Exposed to Quill code as
/// an ordinary callable `Value`; `Interpreter::invoke` dispatches to it
/// exactly like a `Closure`, just without a `Frame`.
pub struct NativeFunction {
    /// The function's name, for error messages and `repr`.
    pub name: &'static str,
    /// The positional-parameter contract, if any (`None` skips checking
    /// entirely — used for natives that only read from `kwargs`).
    pub pcheck: Option<PCheck>,
    /// Whether trailing positional arguments beyond `pcheck`'s declared
    /// parameters are accepted and folded into a rest list rather than
    /// rejected as "too many arguments".
    pub variadic: bool,
    /// Whether a trailing keyword-argument dict is accepted.
    pub kwargs: bool,
    /// The function body.
    pub func: NativeFn,
}

impl NativeFunction {
    /// Check `args`/`kwargs` against this function's declared contract,
    /// then invoke its body ("the VM type-checks before dispatch").
    pub fn call(&self, receiver: Option<&Value>, args: &[Value], kwargs: Option<&Value>) -> VmResult<Value> {
        if let Some(pcheck) = &self.pcheck {
            pcheck.check(self.name, args, self.variadic)?;
        } else if !self.variadic {
            let declared = 0;
            variadic_check_positional(self.name, args.len(), declared, declared)?;
        }
        if kwargs.is_some() && !self.kwargs {
            return Err(Error::type_error(format!("{}() got unexpected keyword arguments", self.name)));
        }
        (self.func)(&NativeCall { receiver, args, kwargs })
    }
}

/// `KParamLookupBool` (pcheck.cpp): read a `bool` keyword argument,
/// falling back to `default` when `kwargs` is absent or lacks `key`.
pub fn kparam_lookup_bool(kwargs: Option<&Value>, key: &str, default: bool) -> VmResult<bool> {
    match kwarg_value(kwargs, key)? {
        Some(v) => Ok(v.is_truthy()),
        None => Ok(default),
    }
}

/// `KParamLookupInt`: read an `int` keyword argument, type-checked.
pub fn kparam_lookup_int(kwargs: Option<&Value>, key: &str, default: i64) -> VmResult<i64> {
    match kwarg_value(kwargs, key)? {
        Some(Value::Int(i)) => Ok(i),
        Some(other) => Err(Error::type_error(format!("expected 'int' for '{key}', got '{}'", other.type_name()))),
        None => Ok(default),
    }
}

/// `KParamLookupUInt`: read a `uint` keyword argument, type-checked.
pub fn kparam_lookup_uint(kwargs: Option<&Value>, key: &str, default: u64) -> VmResult<u64> {
    match kwarg_value(kwargs, key)? {
        Some(Value::UInt(u)) => Ok(u),
        Some(other) => Err(Error::type_error(format!("expected 'uint' for '{key}', got '{}'", other.type_name()))),
        None => Ok(default),
    }
}

/// `KParamLookupStr`: read a `string` keyword argument, type-checked.
pub fn kparam_lookup_str(kwargs: Option<&Value>, key: &str, default: Option<&str>) -> VmResult<Option<String>> {
    match kwarg_value(kwargs, key)? {
        Some(Value::Object(ObjectRef::Str(s))) => Ok(Some(s.as_str().to_string())),
        Some(other) => Err(Error::type_error(format!("expected 'string' for '{key}', got '{}'", other.type_name()))),
        None => Ok(default.map(str::to_string)),
    }
}

fn kwarg_value(kwargs: Option<&Value>, key: &str) -> VmResult<Option<Value>> {
    let Some(Value::Object(ObjectRef::Dict(dict))) = kwargs else {
        return Ok(None);
    };
    dict.get(&Value::Object(ObjectRef::Str(crate::containers::string::QString::new(key.to_string()))))
}

fn as_native(v: &Value) -> &NativeFunction {
    match v {
        Value::Object(ObjectRef::Native(n)) => n,
        _ => unreachable!("native-function type slot invoked on a non-native value"),
    }
}

fn native_repr(v: &Value) -> String {
    format!("<built-in function {}>", as_native(v).name)
}

/// The shared `TypeInfo` describing a native (Rust-implemented) callable.
pub fn native_function_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "function",
            qname: None,
            doc: Some("A built-in function implemented in Rust."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None,
                compare: None,
                truthy: None,
                repr: Some(native_repr),
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
    use crate::value::{ObjectRef, Value};

    fn sample() -> NativeFunction {
        NativeFunction {
            name: "add",
            pcheck: Some(PCheck::new(&[Param { name: "a", types: &["int"] }, Param { name: "b", types: &["int"] }])),
            variadic: false,
            kwargs: false,
            func: |call| match (&call.args[0], &call.args[1]) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                _ => unreachable!(),
            },
        }
    }

    #[test]
    fn checked_call_succeeds_with_matching_types() {
        let f = sample();
        let result = f.call(None, &[Value::Int(2), Value::Int(3)], None).unwrap();
        assert!(matches!(result, Value::Int(5)));
    }

    #[test]
    fn wrong_argument_type_is_a_type_error() {
        let f = sample();
        let err = f.call(None, &[Value::Int(2), Value::Bool(true)], None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn wrong_argument_count_is_a_type_error() {
        let f = sample();
        let err = f.call(None, &[Value::Int(2)], None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn unexpected_kwargs_are_rejected_when_not_declared() {
        let f = sample();
        let collector = quill_gc::Collector::new(quill_gc::GcConfig::default());
        let kwargs = Value::Object(ObjectRef::Dict(crate::containers::dict::QDict::new(&collector)));
        let err = f.call(None, &[Value::Int(1), Value::Int(1)], Some(&kwargs)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn kparam_lookup_falls_back_to_default_when_kwargs_absent() {
        assert_eq!(kparam_lookup_int(None, "limit", 10).unwrap(), 10);
        assert!(kparam_lookup_bool(None, "flag", true).unwrap());
    }

    #[test]
    fn kparam_lookup_reads_a_declared_key() {
        let collector = quill_gc::Collector::new(quill_gc::GcConfig::default());
        let dict = crate::containers::dict::QDict::new(&collector);
        dict.insert(
            Value::Object(ObjectRef::Str(crate::containers::string::QString::new("limit".to_string()))),
            Value::Int(5),
        )
        .unwrap();
        let kwargs = Value::Object(ObjectRef::Dict(dict));
        assert_eq!(kparam_lookup_int(Some(&kwargs), "limit", 10).unwrap(), 5);
    }
}
