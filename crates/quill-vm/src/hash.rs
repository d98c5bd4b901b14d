//! Value hashing: `Int`, `UInt`, and `Decimal` values that compare
//! equal hash identically.
//!
//! The numeric types share one canonical path: an integral value is
//! hashed as its mathematical `i128`, regardless of which of `Int`,
//! `UInt`, or `Decimal` carried it, so `1`, `1u`, and `1.0` all land in
//! the same dict bucket and compare equal. Non-integral decimals hash
//! their bit pattern instead — `Decimal` equality is exact bit equality
//! there, so there's no canonical form to collapse to.

use crate::error::{Error, VmResult};
use crate::value::{ObjectRef, Value};

const GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;

fn mix(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(GOLDEN);
    x ^= x >> 29;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 32;
    x
}

fn hash_i128(n: i128) -> u64 {
    let low = n as u64;
    let high = (n >> 64) as u64;
    mix(low ^ high.wrapping_mul(GOLDEN))
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    // FNV-1a: simple, fast, good enough distribution for a dict bucket hash.
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01B3);
    }
    h
}

/// Hash `value`, or `Err(TypeError)` if its type has no hash slot (mutable
/// containers: `list`, `dict`, `set`, `namespace`, struct instances).
pub fn hash_value(value: &Value) -> VmResult<u64> {
    match value {
        Value::Nil => Ok(mix(0)),
        Value::Bool(b) => Ok(mix(if *b { 1 } else { 0 })),
        Value::Int(i) => Ok(hash_i128(*i as i128)),
        Value::UInt(u) => Ok(hash_i128(*u as i128)),
        Value::Decimal(d) => Ok(hash_decimal(*d)),
        Value::Object(obj) => hash_object(obj),
        Value::Error(_) => Err(Error::type_error("error values are not hashable")),
    }
}

fn hash_decimal(d: f64) -> u64 {
    if d.is_finite() && d.fract() == 0.0 && d >= i128::MIN as f64 && d <= i128::MAX as f64 {
        hash_i128(d as i128)
    } else {
        mix(d.to_bits())
    }
}

fn hash_object(obj: &ObjectRef) -> VmResult<u64> {
    match obj {
        ObjectRef::Str(s) => Ok(hash_bytes(s.as_str().as_bytes())),
        ObjectRef::Bytes(b) => Ok(hash_bytes(b.as_slice())),
        ObjectRef::Tuple(t) => {
            let mut h = GOLDEN;
            for element in t.as_slice() {
                h = mix(h ^ hash_value(element)?);
            }
            Ok(h)
        }
        ObjectRef::Type(t) => Ok(hash_bytes(t.display_name().as_bytes())),
        ObjectRef::List(_) | ObjectRef::Dict(_) | ObjectRef::Set(_) | ObjectRef::Namespace(_) => {
            Err(Error::type_error(format!("'{}' object is not hashable", obj.type_name())))
        }
        ObjectRef::Closure(_) | ObjectRef::Native(_) => Err(Error::type_error("function objects are not hashable")),
        ObjectRef::Struct(inst) => Err(Error::type_error(format!(
            "'{}' object is not hashable",
            inst.type_info().display_name()
        ))),
    }
}

/// Value equality for dict/set key comparison : numeric values
/// compare by mathematical value across `Int`/`UInt`/`Decimal` (matching
/// `hash_value`'s canonical numeric path), heap values compare structurally
/// except for the always-unhashable mutable containers, which are never
/// stored as keys in the first place.
pub fn values_equal(a: &Value, b: &Value) -> VmResult<bool> {
    Ok(match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Error(_), _) | (_, Value::Error(_)) => {
            return Err(Error::type_error("error values are not hashable"))
        }
        (Value::Object(ObjectRef::Type(_)), _) | (_, Value::Object(ObjectRef::Type(_))) => {
            identity_eq(a, b)
        }
        _ if is_numeric(a) && is_numeric(b) => numeric_eq(a, b),
        (Value::Object(ObjectRef::Str(x)), Value::Object(ObjectRef::Str(y))) => x.as_str() == y.as_str(),
        (Value::Object(ObjectRef::Bytes(x)), Value::Object(ObjectRef::Bytes(y))) => x.as_slice() == y.as_slice(),
        (Value::Object(ObjectRef::Tuple(x)), Value::Object(ObjectRef::Tuple(y))) => {
            if x.as_slice().len() != y.as_slice().len() {
                false
            } else {
                let mut eq = true;
                for (xe, ye) in x.as_slice().iter().zip(y.as_slice().iter()) {
                    if !values_equal(xe, ye)? {
                        eq = false;
                        break;
                    }
                }
                eq
            }
        }
        _ => identity_eq(a, b),
    })
}

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::UInt(_) | Value::Decimal(_))
}

fn numeric_eq(a: &Value, b: &Value) -> bool {
    fn as_f64(v: &Value) -> f64 {
        match v {
            Value::Int(i) => *i as f64,
            Value::UInt(u) => *u as f64,
            Value::Decimal(d) => *d,
            _ => unreachable!("numeric_eq called on a non-numeric value"),
        }
    }
    as_f64(a) == as_f64(b)
}

fn identity_eq(a: &Value, b: &Value) -> bool {
    a.is_same_object(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_compare_equal_across_representations() {
        assert!(values_equal(&Value::Int(3), &Value::UInt(3)).unwrap());
        assert!(values_equal(&Value::Int(3), &Value::Decimal(3.0)).unwrap());
        assert!(!values_equal(&Value::Int(3), &Value::Decimal(3.5)).unwrap());
    }

    #[test]
    fn int_uint_and_integral_decimal_hash_identically() {
        let a = hash_value(&Value::Int(7)).unwrap();
        let b = hash_value(&Value::UInt(7)).unwrap();
        let c = hash_value(&Value::Decimal(7.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn non_integral_decimal_does_not_collide_with_its_floor() {
        let a = hash_value(&Value::Decimal(7.5)).unwrap();
        let b = hash_value(&Value::Decimal(7.0)).unwrap();
        assert_ne!(a, b);
    }
}
