//! The dynamic `Value` type: the host representation used when decoding
//! without a concrete target type, and the representation tag 0/1/2/3 items
//! unwrap to. Grounded on the teacher's `value/mod.rs` `CborValue` tag
//! dispatch, reworked into an owned enum that is this crate's own public
//! type rather than a read-only view over borrowed bytes.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::constants::*;
use crate::encode::{write_bytes, write_float, write_info, write_map_entries, write_negative, write_positive, write_str, write_tag, EncOptions, WriteCbor};

/// A CBOR item decoded without a static target type.
///
/// Unlike the wire format itself, `Value` already has tags 0/1/2/3 unwrapped
/// into their natural host form (§4.3); any other tag is preserved as
/// [`Value::Tagged`] so round-tripping through `Marshal` reproduces it.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i128),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
    Null,
    Undefined,
    Array(Vec<Value>),
    Map(HashMap<Value, Value>),
    /// A tag number not among 0/1/2/3, wrapping the item it was found on.
    Tagged(u64, Box<Value>),
}

impl Value {
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    /// The stable kind name used in error messages (§6), ignoring the
    /// tag-unwrapping already performed by the decoder.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(v) if *v >= 0 => "positive integer",
            Value::Integer(_) => "negative integer",
            Value::Float(_) => "floating-point number",
            Value::Bytes(_) => "byte string",
            Value::Text(_) => "UTF-8 text string",
            Value::Bool(_) | Value::Null | Value::Undefined => "primitive",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Tagged(..) => "tag",
        }
    }

    /// Whether this value may be used as a hashable map key: sequences and
    /// mappings are rejected per §4.3's "invalid map key type" rule.
    pub(crate) fn is_valid_map_key(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Map(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Bytes(a), Bytes(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Null, Null) | (Undefined, Undefined) => true,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v)),
            (Tagged(t1, v1), Tagged(t2, v2)) => t1 == t2 && v1 == v2,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Integer(v) => v.hash(state),
            // Bit-pattern hashing: f64 has no Hash impl, and PartialEq above
            // already compares bit patterns so this stays consistent with it.
            Value::Float(v) => v.to_bits().hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
            Value::Bool(v) => v.hash(state),
            Value::Null | Value::Undefined => {}
            Value::Array(v) => v.hash(state),
            Value::Map(_) => {
                // Maps are rejected as map keys before insertion (see
                // `is_valid_map_key`); this arm only exists so `Value` as a
                // whole can implement `Hash` for use inside `Value::Array`.
            }
            Value::Tagged(t, v) => {
                t.hash(state);
                v.hash(state);
            }
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(v as i128)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v as i128)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Encodes a dynamic value back to CBOR (§4.3.1): round-trips the host
/// representation the decoder produces, re-wrapping tags 0/1 as the plain
/// integer/float/text form they were unwrapped from rather than re-tagging
/// them, since `Value` itself no longer distinguishes "was tag 0" from "was
/// an untagged text string" once decoded.
impl WriteCbor for Value {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        match self {
            Value::Integer(v) if *v >= 0 => write_positive(out, (*v).min(u64::MAX as i128) as u64),
            Value::Integer(v) => write_negative(out, (-1i128 - *v) as u64),
            Value::Float(v) => write_float(out, *v),
            Value::Bytes(b) => write_bytes(out, b),
            Value::Text(s) => write_str(out, s),
            Value::Bool(b) => out.push(MAJOR_LIT << 5 | if *b { LIT_TRUE } else { LIT_FALSE }),
            Value::Null => out.push(MAJOR_LIT << 5 | LIT_NULL),
            Value::Undefined => out.push(MAJOR_LIT << 5 | LIT_UNDEFINED),
            Value::Array(items) => {
                write_info(out, MAJOR_ARRAY, items.len() as u64);
                for item in items {
                    item.write_cbor(out, opts);
                }
            }
            Value::Map(entries) => {
                let encoded = entries
                    .iter()
                    .map(|(k, v)| {
                        let mut kb = Vec::new();
                        k.write_cbor(&mut kb, opts);
                        let mut vb = Vec::new();
                        v.write_cbor(&mut vb, opts);
                        (kb, vb)
                    })
                    .collect();
                write_map_entries(out, encoded, opts);
            }
            Value::Tagged(tag, inner) => {
                write_tag(out, *tag);
                inner.write_cbor(out, opts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(Value::Float(0.0), Value::Float(0.0));
        assert_ne!(Value::Float(f64::NAN), Value::Float(0.0));
    }

    #[test]
    fn arrays_and_maps_are_rejected_as_keys() {
        assert!(!Value::Array(vec![]).is_valid_map_key());
        assert!(!Value::Map(HashMap::new()).is_valid_map_key());
        assert!(Value::Integer(1).is_valid_map_key());
    }

    #[test]
    fn kind_names_match_spec_wording() {
        assert_eq!(Value::Integer(1).kind_name(), "positive integer");
        assert_eq!(Value::Integer(-1).kind_name(), "negative integer");
        assert_eq!(Value::Text("x".into()).kind_name(), "UTF-8 text string");
    }

    #[test]
    fn map_equality_ignores_entry_order() {
        let a = Value::Map(maplit::hashmap! {
            Value::Text("x".into()) => Value::Integer(1),
            Value::Text("y".into()) => Value::Integer(2),
        });
        let b = Value::Map(maplit::hashmap! {
            Value::Text("y".into()) => Value::Integer(2),
            Value::Text("x".into()) => Value::Integer(1),
        });
        assert_eq!(a, b);
    }
}
