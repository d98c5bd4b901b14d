//! The built-in `string` type : an immutable, UTF-8 sequence
//! of Unicode scalar values.

use std::sync::{Arc, OnceLock};

use quill_gc::Trace;

use crate::object::{ArObject, Namespace};
use crate::type_info::{CoreSlots, ObjectSlots, OpsSlots, SubscriptSlots, TypeFlags, TypeInfo};
use crate::value::Value;

/// An immutable UTF-8 string.
pub struct QString {
    data: String,
}

impl QString {
    /// Wrap an owned `String`.
    pub fn new(data: String) -> Arc<QString> {
        Arc::new(QString { data })
    }

    /// Borrow the contents as `&str`.
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Number of Unicode scalar values (not bytes; `UnicodeError` implies string indexing is codepoint-indexed, not byte-indexed).
    pub fn char_len(&self) -> usize {
        self.data.chars().count()
    }
}

impl Trace for QString {
    fn trace(&self, _visit: &mut dyn FnMut(*const quill_gc::GcHeader)) {}
}

impl ArObject for QString {
    fn type_info(&self) -> Arc<TypeInfo> {
        string_type_info()
    }

    fn trace_values(&self, _visit: &mut dyn FnMut(&Value)) {}
}

/// The shared `TypeInfo` describing `string`.
pub fn string_type_info() -> Arc<TypeInfo> {
    static TYPE: OnceLock<Arc<TypeInfo>> = OnceLock::new();
    TYPE.get_or_init(|| {
        Arc::new(TypeInfo {
            name: "string",
            qname: None,
            doc: Some("An immutable sequence of Unicode characters."),
            flags: TypeFlags::BASE,
            core: CoreSlots {
                hash: None,
                compare: None,
                truthy: None,
                repr: Some(|v| format!("{:?}", as_str(v))),
                str: Some(|v| as_str(v).to_string()),
            },
            object: ObjectSlots::default(),
            subscript: SubscriptSlots {
                length: Some(|v| Ok(as_qstring(v).char_len())),
                get_item: None,
                set_item: None,
                contains: None,
            },
            ops: OpsSlots::default(),
            iter: crate::type_info::IterSlots::default(),
            mro: Vec::new(),
            tp_map: Namespace::new(),
        })
    })
    .clone()
}

fn as_str(v: &Value) -> &str {
    as_qstring(v).as_str()
}

fn as_qstring(v: &Value) -> &QString {
    match v {
        Value::Object(crate::value::ObjectRef::Str(s)) => s,
        _ => unreachable!("string type slot invoked on a non-string value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_len_counts_codepoints_not_bytes() {
        let s = QString::new("héllo".to_string());
        assert_eq!(s.char_len(), 5);
        assert_eq!(s.as_str().len(), 6);
    }
}
