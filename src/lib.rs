//! A CBOR ([RFC 8949](https://www.rfc-editor.org/rfc/rfc8949)) decoder,
//! encoder and well-formedness validator.
//!
//! The three top-level operations are [`to_vec`]/[`marshal`] (encode),
//! [`from_slice`]/[`unmarshal`] (decode) and [`valid`] (check well-formedness
//! without decoding). [`Encoder`] and [`Decoder`] wrap a `Write`/`Read` for
//! streaming use. Structs opt into the codec via `#[derive(WriteCbor,
//! ReadCbor)]`; see the `derive` feature and the `#[cbor(..)]` field
//! attributes documented on [`descriptor::FieldSpec`].

pub mod constants;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
mod header;
pub mod stream;
#[cfg(test)]
mod test_support;
pub mod timestamp;
pub mod value;
mod wf;

pub use decode::{unmarshal_into, DecCtx, DecOptions, DupMapKey, ReadCbor};
pub use encode::{to_vec, to_vec_default, EncOptions, WriteCbor};
pub use error::{Error, ErrorKind, ValueKind};
pub use stream::{Decoder, Encoder};
pub use timestamp::Timestamp;
pub use value::Value;
pub use wf::valid;

#[cfg(feature = "derive")]
pub use cbor_codec_derive::{ReadCbor, WriteCbor};

/// Serializes `value` with default options (preferred, non-canonical encoding).
///
/// Alias for [`to_vec_default`] kept for readers expecting the common
/// `Marshal` name from CBOR implementations in other languages.
pub fn marshal<T: WriteCbor + ?Sized>(value: &T) -> Vec<u8> {
    to_vec_default(value)
}

/// Decodes `bytes` into a freshly constructed `T`, rejecting trailing data.
///
/// Alias for [`decode::from_slice`] kept for readers expecting the common
/// `Unmarshal` name from CBOR implementations in other languages.
pub fn unmarshal<T: ReadCbor>(bytes: &[u8]) -> Result<T, Error> {
    decode::from_slice(bytes, &DecOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::hex;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn marshal_unmarshal_round_trip() {
        let value = vec![1u64, 2, 3];
        let bytes = marshal(&value);
        let back: Vec<u64> = unmarshal(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn canonical_idempotence() {
        let mut m = BTreeMap::new();
        m.insert("zebra".to_string(), 1u64);
        m.insert("apple".to_string(), 2u64);
        let opts = EncOptions {
            canonical: true,
            ..Default::default()
        };
        let once = to_vec(&m, &opts);
        let decoded: BTreeMap<String, u64> = unmarshal(&once).unwrap();
        let twice = to_vec(&decoded, &opts);
        assert_eq!(once, twice);
    }

    #[test]
    fn validator_agrees_with_decode() {
        let bytes = hex("00");
        assert!(valid(&bytes).is_ok());
        let v: Value = unmarshal(&bytes).unwrap();
        assert_eq!(v, Value::Integer(0));
    }

    #[test]
    fn concatenation_walks_item_by_item() {
        let bytes = hex("0001");
        let rest = valid(&bytes).unwrap();
        assert_eq!(rest, &[0x01]);
        let rest = valid(rest).unwrap();
        assert!(rest.is_empty());
    }

    /// Cross-checks our wire bytes against `serde_cbor`, an independent CBOR
    /// implementation, in both directions.
    #[test]
    fn wire_bytes_match_an_independent_cbor_implementation() {
        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1u64);
        value.insert("b".to_string(), 2u64);

        let ours = marshal(&value);
        let theirs = serde_cbor::to_vec(&value).unwrap();
        pretty_assertions::assert_eq!(ours, theirs);

        let back: BTreeMap<String, u64> = serde_cbor::from_slice(&ours).unwrap();
        assert_eq!(back, value);
    }

    /// A representative subset of RFC 7049 Appendix A's test vectors,
    /// decoded to a dynamic [`Value`] and re-encoded, checked for an exact
    /// byte match both ways — these vectors are themselves preferred-form
    /// CBOR, so round-tripping through this crate's shortest-form encoder
    /// must reproduce them exactly.
    #[test]
    fn rfc7049_appendix_a_vectors_round_trip() {
        let cases: &[(&str, Value)] = &[
            ("00", Value::Integer(0)),
            ("01", Value::Integer(1)),
            ("17", Value::Integer(23)),
            ("1818", Value::Integer(24)),
            ("1903e8", Value::Integer(1000)),
            ("1a000f4240", Value::Integer(1_000_000)),
            ("1b000000e8d4a51000", Value::Integer(1_000_000_000_000)),
            ("20", Value::Integer(-1)),
            ("3863", Value::Integer(-100)),
            ("f90000", Value::Float(0.0)),
            ("f93c00", Value::Float(1.0)),
            ("f93e00", Value::Float(1.5)),
            ("f97c00", Value::Float(f64::INFINITY)),
            ("f9fc00", Value::Float(f64::NEG_INFINITY)),
            ("f4", Value::Bool(false)),
            ("f5", Value::Bool(true)),
            ("f6", Value::Null),
            ("f7", Value::Undefined),
            ("40", Value::Bytes(vec![])),
            ("4401020304", Value::Bytes(vec![1, 2, 3, 4])),
            ("60", Value::Text(String::new())),
            ("6161", Value::Text("a".into())),
            ("6449455446", Value::Text("IETF".into())),
            ("80", Value::Array(vec![])),
            (
                "83010203",
                Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
            ),
            (
                "8301820203820405",
                Value::Array(vec![
                    Value::Integer(1),
                    Value::Array(vec![Value::Integer(2), Value::Integer(3)]),
                    Value::Array(vec![Value::Integer(4), Value::Integer(5)]),
                ]),
            ),
            ("a0", Value::Map(HashMap::new())),
        ];

        for (hex_str, expected) in cases {
            let bytes = hex(hex_str);
            let decoded: Value = unmarshal(&bytes).unwrap();
            assert_eq!(&decoded, expected, "decoding {hex_str}");
            let encoded = marshal(expected);
            assert_eq!(encoded, bytes, "re-encoding {hex_str}");
        }
    }
}
