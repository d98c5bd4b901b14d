//! Numeric arithmetic and bitwise operators.
//!
//! Mirrors `quill_compiler::optimizer`'s `fold_arith`/`fold_int`/`fold_uint`
//! exactly, so that a folded and an unfolded program observe the same
//! overflow/promotion behavior, and the same
//! expression evaluates identically whether or not constant folding ran.

use crate::error::{Error, VmResult};
use crate::value::Value;

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::UInt(u) => Some(*u as f64),
        Value::Decimal(d) => Some(*d),
        _ => None,
    }
}

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::UInt(_) | Value::Decimal(_))
}

/// Binary numeric operator kind, one per arithmetic/bitwise opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    IDiv,
    /// `%`
    Mod,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `&`
    Land,
    /// `|`
    Lor,
    /// `^`
    Lxor,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::IDiv => "//",
            ArithOp::Mod => "%",
            ArithOp::Shl => "<<",
            ArithOp::Shr => ">>",
            ArithOp::Land => "&",
            ArithOp::Lor => "|",
            ArithOp::Lxor => "^",
        }
    }

    /// Whether this operator is defined over `decimal` operands.
    fn decimal_defined(self) -> bool {
        matches!(self, ArithOp::Add | ArithOp::Sub | ArithOp::Mul | ArithOp::Div)
    }
}

/// Evaluate a binary numeric operator over two `Value`s, following the
/// same decimal/unsigned promotion rules the constant folder uses: a
/// decimal operand (on either side) promotes the whole operation to
/// floating point, otherwise an unsigned operand (with the other side
/// non-negative) promotes the pair to unsigned, and two plain signed
/// integers stay signed.
pub fn eval(op: ArithOp, lhs: &Value, rhs: &Value) -> VmResult<Value> {
    if !is_numeric(lhs) || !is_numeric(rhs) {
        return Err(Error::type_error(format!(
            "unsupported operand types for '{}': '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        )));
    }

    if matches!(lhs, Value::Decimal(_)) || matches!(rhs, Value::Decimal(_)) {
        if !op.decimal_defined() {
            return Err(Error::type_error(format!(
                "unsupported operand types for '{}': '{}' and '{}'",
                op.symbol(),
                lhs.type_name(),
                rhs.type_name()
            )));
        }
        let a = as_f64(lhs).expect("checked numeric above");
        let b = as_f64(rhs).expect("checked numeric above");
        return eval_decimal(op, a, b);
    }

    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => eval_int(op, *a, *b),
        (Value::UInt(a), Value::UInt(b)) => eval_uint(op, *a, *b),
        (Value::Int(a), Value::UInt(b)) if *a >= 0 => eval_uint(op, *a as u64, *b),
        (Value::UInt(a), Value::Int(b)) if *b >= 0 => eval_uint(op, *a, *b as u64),
        (Value::Int(_), Value::UInt(_)) | (Value::UInt(_), Value::Int(_)) => {
            Err(Error::overflow_error("cannot mix negative int with uint"))
        }
        _ => unreachable!("every numeric pairing is covered above"),
    }
}

fn eval_decimal(op: ArithOp, a: f64, b: f64) -> VmResult<Value> {
    let r = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(Error::overflow_error("division by zero"));
            }
            a / b
        }
        _ => unreachable!("decimal_defined filtered the rest out"),
    };
    Ok(Value::Decimal(r))
}

fn eval_int(op: ArithOp, a: i64, b: i64) -> VmResult<Value> {
    let overflow = || Error::overflow_error("integer overflow");
    let r = match op {
        ArithOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        ArithOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        ArithOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        ArithOp::Div | ArithOp::IDiv => {
            if b == 0 {
                return Err(Error::overflow_error("division by zero"));
            }
            a.checked_div(b).ok_or_else(overflow)?
        }
        ArithOp::Mod => {
            if b == 0 {
                return Err(Error::overflow_error("division by zero"));
            }
            a.checked_rem(b).ok_or_else(overflow)?
        }
        ArithOp::Shl => a.checked_shl(b as u32).ok_or_else(overflow)?,
        ArithOp::Shr => a.checked_shr(b as u32).ok_or_else(overflow)?,
        ArithOp::Land => a & b,
        ArithOp::Lor => a | b,
        ArithOp::Lxor => a ^ b,
    };
    Ok(Value::Int(r))
}

fn eval_uint(op: ArithOp, a: u64, b: u64) -> VmResult<Value> {
    let overflow = || Error::overflow_error("integer overflow");
    let r = match op {
        ArithOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        ArithOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        ArithOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        ArithOp::Div | ArithOp::IDiv => {
            if b == 0 {
                return Err(Error::overflow_error("division by zero"));
            }
            a.checked_div(b).ok_or_else(overflow)?
        }
        ArithOp::Mod => {
            if b == 0 {
                return Err(Error::overflow_error("division by zero"));
            }
            a.checked_rem(b).ok_or_else(overflow)?
        }
        ArithOp::Shl => a.checked_shl(b as u32).ok_or_else(overflow)?,
        ArithOp::Shr => a.checked_shr(b as u32).ok_or_else(overflow)?,
        ArithOp::Land => a & b,
        ArithOp::Lor => a | b,
        ArithOp::Lxor => a ^ b,
    };
    Ok(Value::UInt(r))
}

/// Unary negation (`Neg` opcode).
pub fn eval_neg(v: &Value) -> VmResult<Value> {
    match v {
        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| Error::overflow_error("integer overflow")),
        Value::UInt(u) => {
            if *u == 0 {
                Ok(Value::UInt(0))
            } else {
                Err(Error::overflow_error("cannot negate a non-zero uint"))
            }
        }
        Value::Decimal(d) => Ok(Value::Decimal(-d)),
        _ => Err(Error::type_error(format!("bad operand type for unary '-': '{}'", v.type_name()))),
    }
}

/// Bitwise complement (`LNot` opcode — named for the original "logical not" slot this interpreter reuses for `~`, unary operators).
pub fn eval_bitnot(v: &Value) -> VmResult<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(!i)),
        Value::UInt(u) => Ok(Value::UInt(!u)),
        _ => Err(Error::type_error(format!("bad operand type for unary '~': '{}'", v.type_name()))),
    }
}

/// Boolean complement (`Not` opcode).
pub fn eval_not(v: &Value) -> Value {
    Value::Bool(!v.is_truthy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_overflow_is_overflow_error() {
        let err = eval(ArithOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OverflowError);
    }

    #[test]
    fn division_by_zero_is_overflow_error() {
        let err = eval(ArithOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OverflowError);
    }

    #[test]
    fn mixed_int_uint_promotes_to_unsigned() {
        let r = eval(ArithOp::Add, &Value::Int(3), &Value::UInt(4)).unwrap();
        assert!(matches!(r, Value::UInt(7)));
    }

    #[test]
    fn decimal_operand_promotes_whole_expression() {
        let r = eval(ArithOp::Mul, &Value::Int(2), &Value::Decimal(1.5)).unwrap();
        assert!(matches!(r, Value::Decimal(d) if d == 3.0));
    }

    #[test]
    fn shift_not_defined_on_decimals() {
        let err = eval(ArithOp::Shl, &Value::Decimal(1.0), &Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn negating_zero_uint_is_zero() {
        assert!(matches!(eval_neg(&Value::UInt(0)).unwrap(), Value::UInt(0)));
    }
}
