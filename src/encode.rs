//! Encoder Core (component D): serializes host values as CBOR, using
//! preferred (shortest-form) integer/float encoding and, in canonical mode,
//! RFC 7049 §3.9 deterministic map-key and struct-field ordering.
//!
//! The shortest-form integer header write is grounded verbatim on the
//! teacher's `builder/low_level.rs::write_info`. Float narrowing and
//! canonical key sorting have no teacher precedent (the teacher's own
//! `canonical.rs` only normalizes definite/indefinite length, and its
//! `Encoder::encode_f64` always emits a full double) and are built fresh
//! here; see DESIGN.md.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::constants::*;

/// Options governing encode behavior (§6 `EncOptions`).
#[derive(Debug, Clone, Default)]
pub struct EncOptions {
    pub canonical: bool,
    pub time_rfc3339: bool,
}

/// Types that can be serialized to CBOR. Encoding never fails: every impl is
/// total over its Rust type, so there is no `Result` here (mirrors the
/// teacher's own infallible `Writer`/`Encoder` methods).
pub trait WriteCbor {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions);
}

/// Shortest-form unsigned-integer header write; ported byte-for-byte from
/// the teacher's `write_info`.
pub fn write_info(bytes: &mut Vec<u8>, major: u8, value: u64) {
    if value < 24 {
        bytes.push(major << 5 | (value as u8));
    } else if value < 0x100 {
        bytes.push(major << 5 | 24);
        bytes.push(value as u8);
    } else if value < 0x1_0000 {
        bytes.push(major << 5 | 25);
        bytes.push((value >> 8) as u8);
        bytes.push(value as u8);
    } else if value < 0x1_0000_0000 {
        bytes.push(major << 5 | 26);
        bytes.push((value >> 24) as u8);
        bytes.push((value >> 16) as u8);
        bytes.push((value >> 8) as u8);
        bytes.push(value as u8);
    } else {
        bytes.push(major << 5 | 27);
        bytes.push((value >> 56) as u8);
        bytes.push((value >> 48) as u8);
        bytes.push((value >> 40) as u8);
        bytes.push((value >> 32) as u8);
        bytes.push((value >> 24) as u8);
        bytes.push((value >> 16) as u8);
        bytes.push((value >> 8) as u8);
        bytes.push(value as u8);
    }
}

pub fn write_positive(bytes: &mut Vec<u8>, value: u64) {
    write_info(bytes, MAJOR_POS, value);
}

pub fn write_negative(bytes: &mut Vec<u8>, encoded: u64) {
    write_info(bytes, MAJOR_NEG, encoded);
}

pub(crate) fn write_bytes(bytes: &mut Vec<u8>, value: &[u8]) {
    write_info(bytes, MAJOR_BYTES, value.len() as u64);
    bytes.extend_from_slice(value);
}

pub fn write_str(bytes: &mut Vec<u8>, value: &str) {
    write_info(bytes, MAJOR_STR, value.len() as u64);
    bytes.extend_from_slice(value.as_bytes());
}

pub(crate) fn write_tag(bytes: &mut Vec<u8>, tag: u64) {
    write_info(bytes, MAJOR_TAG, tag);
}

/// Encodes a `#[cbor(..)]` field key (a name or an integer under
/// `keyasint`) the way derive-generated `WriteCbor` impls need to. Negative
/// `FieldKey::Int` values encode as a CBOR negative integer.
pub fn write_field_key(bytes: &mut Vec<u8>, key: crate::descriptor::FieldKey) {
    match key {
        crate::descriptor::FieldKey::Name(s) => write_str(bytes, s),
        crate::descriptor::FieldKey::Int(v) if v >= 0 => write_positive(bytes, v as u64),
        crate::descriptor::FieldKey::Int(v) => write_negative(bytes, (-1i128 - v as i128) as u64),
    }
}

/// Canonical quiet-NaN bit patterns at each width (§4.4).
const NAN_HALF: u16 = 0x7e00;
const NAN_SINGLE: u32 = 0x7fc0_0000;
const NAN_DOUBLE: u64 = 0x7ff8_0000_0000_0000;

/// Encodes `value` at the narrowest width that round-trips losslessly,
/// always narrowing in canonical mode.
pub(crate) fn write_float(bytes: &mut Vec<u8>, value: f64) {
    if value.is_nan() {
        bytes.push(MAJOR_LIT << 5 | 25);
        bytes.extend_from_slice(&NAN_HALF.to_be_bytes());
        return;
    }
    let half = half::f16::from_f64(value);
    if half.to_f64() == value {
        bytes.push(MAJOR_LIT << 5 | 25);
        bytes.extend_from_slice(&half.to_bits().to_be_bytes());
        return;
    }
    let single = value as f32;
    if single as f64 == value {
        bytes.push(MAJOR_LIT << 5 | 26);
        bytes.extend_from_slice(&single.to_bits().to_be_bytes());
        return;
    }
    bytes.push(MAJOR_LIT << 5 | 27);
    bytes.extend_from_slice(&value.to_bits().to_be_bytes());
}

// Silence unused-const warnings for the single/double NaN patterns: they
// document the canonical bit pattern at each width even though encoding
// always narrows NaN to half precision.
#[allow(dead_code)]
fn _nan_patterns() -> (u32, u64) {
    (NAN_SINGLE, NAN_DOUBLE)
}

macro_rules! uint_impl {
    ($t:ty) => {
        impl WriteCbor for $t {
            fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
                write_positive(out, *self as u64);
            }
        }
    };
}

macro_rules! int_impl {
    ($t:ty) => {
        impl WriteCbor for $t {
            fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
                if *self >= 0 {
                    write_positive(out, *self as u64);
                } else {
                    write_negative(out, (-1i128 - *self as i128) as u64);
                }
            }
        }
    };
}

uint_impl!(u8);
uint_impl!(u16);
uint_impl!(u32);
uint_impl!(u64);
uint_impl!(usize);
int_impl!(i8);
int_impl!(i16);
int_impl!(i32);
int_impl!(i64);
int_impl!(isize);

/// Writes `magnitude` as a tag 2/3 bignum (RFC 7049 §2.4.2): a byte string
/// holding the value's minimal big-endian unsigned representation. Used for
/// `u128`/`i128` values too wide to fit a plain CBOR integer argument (which
/// tops out at 8 bytes, i.e. `u64::MAX`).
fn write_bignum(bytes: &mut Vec<u8>, tag: u64, magnitude: u128) {
    let be = magnitude.to_be_bytes();
    let first_nonzero = be.iter().position(|&b| b != 0).unwrap_or(be.len() - 1);
    write_tag(bytes, tag);
    write_bytes(bytes, &be[first_nonzero..]);
}

impl WriteCbor for u128 {
    fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
        match u64::try_from(*self) {
            Ok(v) => write_positive(out, v),
            Err(_) => write_bignum(out, TAG_BIGNUM_POS, *self),
        }
    }
}

impl WriteCbor for i128 {
    fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
        if *self >= 0 {
            match u64::try_from(*self) {
                Ok(v) => write_positive(out, v),
                Err(_) => write_bignum(out, TAG_BIGNUM_POS, *self as u128),
            }
        } else {
            let magnitude = -1i128 - *self;
            match u64::try_from(magnitude) {
                Ok(v) => write_negative(out, v),
                Err(_) => write_bignum(out, TAG_BIGNUM_NEG, magnitude as u128),
            }
        }
    }
}

impl WriteCbor for bool {
    fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
        out.push(MAJOR_LIT << 5 | if *self { LIT_TRUE } else { LIT_FALSE });
    }
}

impl WriteCbor for f32 {
    fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
        write_float(out, *self as f64);
    }
}

impl WriteCbor for f64 {
    fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
        write_float(out, *self);
    }
}

impl WriteCbor for str {
    fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
        write_str(out, self);
    }
}

impl WriteCbor for String {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        self.as_str().write_cbor(out, opts);
    }
}

impl WriteCbor for [u8] {
    fn write_cbor(&self, out: &mut Vec<u8>, _opts: &EncOptions) {
        write_bytes(out, self);
    }
}

impl WriteCbor for Vec<u8> {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        self.as_slice().write_cbor(out, opts);
    }
}

impl<T: ?Sized + WriteCbor> WriteCbor for &T {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        (*self).write_cbor(out, opts)
    }
}

impl<T: WriteCbor> WriteCbor for Option<T> {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        match self {
            Some(v) => v.write_cbor(out, opts),
            None => out.push(MAJOR_LIT << 5 | LIT_NULL),
        }
    }
}

impl<T: WriteCbor> WriteCbor for Box<T> {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        (**self).write_cbor(out, opts)
    }
}

fn write_array<T: WriteCbor>(out: &mut Vec<u8>, items: impl ExactSizeIterator<Item = T>, opts: &EncOptions)
where
    T: WriteCbor,
{
    write_info(out, MAJOR_ARRAY, items.len() as u64);
    for item in items {
        item.write_cbor(out, opts);
    }
}

impl<T: WriteCbor> WriteCbor for Vec<T> {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        write_array(out, self.iter(), opts);
    }
}

impl<T: WriteCbor> WriteCbor for VecDeque<T> {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        write_array(out, self.iter(), opts);
    }
}

impl<T: WriteCbor, const N: usize> WriteCbor for [T; N] {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        write_array(out, self.iter(), opts);
    }
}

/// Encodes a map's entries, sorting by encoded-key bytes (shortest first,
/// then bytewise ascending) when `opts.canonical` is set.
pub fn write_map_entries(out: &mut Vec<u8>, mut entries: Vec<(Vec<u8>, Vec<u8>)>, opts: &EncOptions) {
    if opts.canonical {
        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
    }
    write_info(out, MAJOR_DICT, entries.len() as u64);
    for (k, v) in entries {
        out.extend_from_slice(&k);
        out.extend_from_slice(&v);
    }
}

/// One field's encoded value as collected by a derive-generated
/// `__cbor_entries`, still carrying the flatten depth it was found at so the
/// dominance rules of §4.5 can be applied once, at the struct root.
pub struct RawFieldEntry {
    pub key: crate::descriptor::FieldKey,
    pub depth: usize,
    pub value: Vec<u8>,
}

/// Applies the §4.5 dominance resolution already computed in `descriptor`
/// (shallowest wins, explicit breaks same-depth ties) to a flattened list of
/// candidate field entries, keeping only the entries the descriptor chose,
/// then writes the result as a canonical-aware CBOR map.
pub fn write_struct_entries(
    out: &mut Vec<u8>,
    descriptor: &crate::descriptor::StructDescriptor,
    raw: Vec<RawFieldEntry>,
    opts: &EncOptions,
) {
    let mut entries = Vec::with_capacity(descriptor.fields.len());
    for field in &descriptor.fields {
        if let Some(r) = raw
            .iter()
            .find(|r| r.key == field.key && r.depth == field.depth)
        {
            let mut k = Vec::new();
            write_field_key(&mut k, field.key);
            entries.push((k, r.value.clone()));
        }
    }
    write_map_entries(out, entries, opts);
}

fn encode_entries<K: WriteCbor, V: WriteCbor>(
    iter: impl Iterator<Item = (K, V)>,
    opts: &EncOptions,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    iter.map(|(k, v)| {
        let mut kb = Vec::new();
        k.write_cbor(&mut kb, opts);
        let mut vb = Vec::new();
        v.write_cbor(&mut vb, opts);
        (kb, vb)
    })
    .collect()
}

impl<K: WriteCbor, V: WriteCbor> WriteCbor for BTreeMap<K, V> {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        let entries = encode_entries(self.iter(), opts);
        write_map_entries(out, entries, opts);
    }
}

impl<K: WriteCbor, V: WriteCbor> WriteCbor for HashMap<K, V> {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        let entries = encode_entries(self.iter(), opts);
        write_map_entries(out, entries, opts);
    }
}

macro_rules! tuple_impl {
    ($n:expr; $($t:ident),+) => {
        impl<$($t: WriteCbor),*> WriteCbor for ($($t,)*) {
            #[allow(non_snake_case)]
            fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
                write_info(out, MAJOR_ARRAY, $n);
                let ($($t,)*) = self;
                $($t.write_cbor(out, opts);)*
            }
        }
    };
}

tuple_impl!(1; T0);
tuple_impl!(2; T0, T1);
tuple_impl!(3; T0, T1, T2);
tuple_impl!(4; T0, T1, T2, T3);
tuple_impl!(5; T0, T1, T2, T3, T4);
tuple_impl!(6; T0, T1, T2, T3, T4, T5);
tuple_impl!(7; T0, T1, T2, T3, T4, T5, T6);
tuple_impl!(8; T0, T1, T2, T3, T4, T5, T6, T7);
tuple_impl!(9; T0, T1, T2, T3, T4, T5, T6, T7, T8);
tuple_impl!(10; T0, T1, T2, T3, T4, T5, T6, T7, T8, T9);

/// Whether a value is the "zero" of its kind, for `#[cbor(omitempty)]` field
/// skipping (§4.4): 0 for numbers, "" for strings, an empty container, or
/// `None` for an optional field.
pub trait CborEmpty {
    fn is_cbor_empty(&self) -> bool;
}

macro_rules! empty_by_zero {
    ($t:ty) => {
        impl CborEmpty for $t {
            fn is_cbor_empty(&self) -> bool {
                *self == 0 as $t
            }
        }
    };
}
empty_by_zero!(u8);
empty_by_zero!(u16);
empty_by_zero!(u32);
empty_by_zero!(u64);
empty_by_zero!(u128);
empty_by_zero!(usize);
empty_by_zero!(i8);
empty_by_zero!(i16);
empty_by_zero!(i32);
empty_by_zero!(i64);
empty_by_zero!(i128);
empty_by_zero!(isize);
empty_by_zero!(f32);
empty_by_zero!(f64);

impl CborEmpty for bool {
    fn is_cbor_empty(&self) -> bool {
        !*self
    }
}

impl CborEmpty for String {
    fn is_cbor_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<T> CborEmpty for Vec<T> {
    fn is_cbor_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<T> CborEmpty for Option<T> {
    fn is_cbor_empty(&self) -> bool {
        self.is_none()
    }
}

impl<K, V> CborEmpty for BTreeMap<K, V> {
    fn is_cbor_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> CborEmpty for HashMap<K, V> {
    fn is_cbor_empty(&self) -> bool {
        self.is_empty()
    }
}

/// Serializes `value` to a freshly allocated buffer.
pub fn to_vec<T: WriteCbor + ?Sized>(value: &T, opts: &EncOptions) -> Vec<u8> {
    let mut out = Vec::new();
    value.write_cbor(&mut out, opts);
    out
}

/// Serializes `value` with default options (preferred, non-canonical encoding).
pub fn to_vec_default<T: WriteCbor + ?Sized>(value: &T) -> Vec<u8> {
    to_vec(value, &EncOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::hex;

    #[test]
    fn integers_use_shortest_form() {
        assert_eq!(to_vec_default(&0u64), vec![0x00]);
        assert_eq!(to_vec_default(&23u64), vec![0x17]);
        assert_eq!(to_vec_default(&24u64), vec![0x18, 0x18]);
        assert_eq!(to_vec_default(&256u64), vec![0x19, 0x01, 0x00]);
    }

    #[test]
    fn negative_integers_use_major_one() {
        assert_eq!(to_vec_default(&-1i64), vec![0x20]);
        assert_eq!(to_vec_default(&-100i64), vec![0x38, 0x63]);
    }

    /// Values beyond `u64`'s range encode as a tag 2 bignum rather than
    /// truncating: the 8-byte header argument simply has no room for them.
    #[test]
    fn u128_beyond_u64_range_uses_bignum_tag() {
        let value: u128 = u64::MAX as u128 + 1;
        assert_eq!(to_vec_default(&value), hex("c249010000000000000000"));
        assert_eq!(
            to_vec_default(&u128::MAX),
            hex("c250ffffffffffffffffffffffffffffffff")
        );
    }

    #[test]
    fn i128_beyond_i64_range_uses_bignum_tag() {
        assert_eq!(
            to_vec_default(&i128::MIN),
            hex("c3507fffffffffffffffffffffffffffffff")
        );
    }

    #[test]
    fn floats_narrow_to_half_when_lossless() {
        assert_eq!(to_vec_default(&1.5f64), hex("f93e00"));
        assert_eq!(to_vec_default(&f64::INFINITY), hex("f97c00"));
    }

    #[test]
    fn floats_needing_double_precision_stay_wide() {
        let v = 1.1f64;
        let out = to_vec_default(&v);
        assert_eq!(out[0] >> 5, MAJOR_LIT);
        assert_eq!(out[0] & 0x1f, 27);
    }

    #[test]
    fn canonical_mode_sorts_map_keys_by_key_bytes() {
        let mut m = BTreeMap::new();
        m.insert("b".to_string(), "B".to_string());
        m.insert("a".to_string(), "A".to_string());
        m.insert("c".to_string(), "C".to_string());
        m.insert("d".to_string(), "D".to_string());
        m.insert("e".to_string(), "E".to_string());
        let out = to_vec(&m, &EncOptions { canonical: true, ..Default::default() });
        assert_eq!(out, hex("a56161614161626142616361436164614461656145"));
    }

    #[test]
    fn bytes_and_strings_round_trip_lengths() {
        assert_eq!(to_vec_default(&b"\x01\x02".to_vec()), vec![0x42, 0x01, 0x02]);
        assert_eq!(to_vec_default("IETF"), hex("6449455446"));
    }
}
