//! `repr()`/`str()` formatting dispatch, built on top of each type's
//! core-slot `repr`/`str` functions, preserving `parse(repr(x)) ≡ x`
//! for every literal-expressible built-in.
//!
//! Every built-in type publishes its own `repr`/`str` [`crate::type_info::CoreSlots`]
//! entry; this module is the entry point those entries (and the
//! interpreter's `repr`/`str` builtins) call to format a *nested* value
//! without re-deriving the scalar/heap split themselves.

use crate::value::{ObjectRef, Value};

/// `repr()`-style representation.
pub fn repr_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => format!("{u}u"),
        Value::Decimal(d) => format_decimal(*d),
        Value::Error(e) => format!("<error {}: {}>", e.kind(), e.message()),
        Value::Object(ObjectRef::Type(t)) => format!("<type '{}'>", t.display_name()),
        Value::Object(obj) => {
            let ty = obj.type_name_type_info();
            match ty.core.repr {
                Some(f) => f(value),
                None => format!("<{} object>", ty.display_name()),
            }
        }
    }
}

/// `str()`-style display representation, falling back to `repr` when a
/// type defines no distinct `str` slot.
pub fn str_value(value: &Value) -> String {
    if let Value::Object(obj) = value {
        if !matches!(obj, ObjectRef::Type(_)) {
            let ty = obj.type_name_type_info();
            if let Some(f) = ty.core.str {
                return f(value);
            }
        }
    }
    repr_value(value)
}

fn format_decimal(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 {
        format!("{d:.1}")
    } else {
        d.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_round_trip_through_repr() {
        assert_eq!(repr_value(&Value::Nil), "nil");
        assert_eq!(repr_value(&Value::Bool(true)), "true");
        assert_eq!(repr_value(&Value::Int(-7)), "-7");
        assert_eq!(repr_value(&Value::UInt(7)), "7u");
        assert_eq!(repr_value(&Value::Decimal(2.0)), "2.0");
        assert_eq!(repr_value(&Value::Decimal(2.5)), "2.5");
    }
}
