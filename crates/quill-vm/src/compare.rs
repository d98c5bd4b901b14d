//! `Compare`/`Equal` dispatch : backs the `CMPEQ`/`CMPNE`/
//! `CMPGR`/`CMPGRQ`/`CMPLE`/`CMPLEQ` opcodes.
//!
//! Equality (`CMPEQ`/`CMPNE`) is defined for every pair of values via
//! [`crate::hash::values_equal`] — two values of different, non-numeric
//! types simply compare unequal rather than raising. Ordering
//! (`CMPGR`/`CMPGRQ`/`CMPLE`/`CMPLEQ`) is narrower: numeric values compare
//! by mathematical value and strings compare lexicographically; anything
//! else either defers to its `TypeInfo::core::compare` slot or raises a
//! `TypeError` if the type declares none. The slot itself returns `None`
//! for an unordered pair, which callers surface as that same error.

use crate::error::{Error, VmResult};
use crate::hash::values_equal;
use crate::type_info::CompareMode;
use crate::value::{ObjectRef, Value};

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::UInt(u) => Some(*u as f64),
        Value::Decimal(d) => Some(*d),
        _ => None,
    }
}

/// Evaluate `lhs <mode> rhs`.
pub fn eval(mode: CompareMode, lhs: &Value, rhs: &Value) -> VmResult<Value> {
    match mode {
        CompareMode::Eq => Ok(Value::Bool(values_equal(lhs, rhs)?)),
        CompareMode::Ne => Ok(Value::Bool(!values_equal(lhs, rhs)?)),
        _ => eval_ordering(mode, lhs, rhs),
    }
}

fn eval_ordering(mode: CompareMode, lhs: &Value, rhs: &Value) -> VmResult<Value> {
    if let (Some(a), Some(b)) = (as_f64(lhs), as_f64(rhs)) {
        return Ok(Value::Bool(apply(mode, a.partial_cmp(&b))));
    }

    if let (Value::Object(ObjectRef::Str(a)), Value::Object(ObjectRef::Str(b))) = (lhs, rhs) {
        return Ok(Value::Bool(apply(mode, a.as_str().partial_cmp(b.as_str()))));
    }

    let ty = match lhs {
        Value::Object(obj) => obj.type_name_type_info(),
        _ => return Err(unorderable(lhs, rhs)),
    };
    match ty.core.compare {
        Some(f) => f(lhs, rhs, mode).map(Value::Bool).ok_or_else(|| unorderable(lhs, rhs)),
        None => Err(unorderable(lhs, rhs)),
    }
}

fn apply(mode: CompareMode, ord: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    match (mode, ord) {
        (CompareMode::Gr, Some(Greater)) => true,
        (CompareMode::Grq, Some(Greater | Equal)) => true,
        (CompareMode::Le, Some(Less)) => true,
        (CompareMode::Leq, Some(Less | Equal)) => true,
        _ => false,
    }
}

fn unorderable(lhs: &Value, rhs: &Value) -> Error {
    Error::type_error(format!("'{}' and '{}' are not orderable", lhs.type_name(), rhs.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cross_type_ordering() {
        let r = eval(CompareMode::Le, &Value::Int(3), &Value::Decimal(3.5)).unwrap();
        assert!(matches!(r, Value::Bool(true)));
    }

    #[test]
    fn equality_never_raises_across_types() {
        let r = eval(CompareMode::Eq, &Value::Int(3), &Value::Bool(true)).unwrap();
        assert!(matches!(r, Value::Bool(false)));
    }

    #[test]
    fn unordered_types_raise_type_error() {
        let err = eval(CompareMode::Gr, &Value::Nil, &Value::Nil).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }
}
