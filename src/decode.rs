//! Decoder Core (component C): parses well-formed CBOR bytes into a host
//! target described either dynamically ([`crate::Value`]) or by a concrete
//! `ReadCbor` implementation (hand-written or derived).
//!
//! Grounded on the teacher's `codec.rs` `ReadCbor` trait shape (one method
//! taking the source bytes, returning `Result<Self>`), generalized with an
//! explicit recursion-depth context the teacher's trait does not carry (the
//! teacher delegates depth bookkeeping to its separate validated `Cbor`
//! wrapper; this crate's decoder is itself the thing doing the walking, so
//! it tracks depth directly).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;

use crate::constants::*;
use crate::error::{Error, ErrorKind, InternalError, ValueKind, WhileParsing};
use crate::header::{is_break, read_header, Argument};
use crate::value::Value;
use crate::wf::DEFAULT_MAX_NESTED_LEVELS;

/// How duplicate keys in a CBOR map are handled while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupMapKey {
    /// Keep the last value seen for a repeated key, silently.
    Quiet,
    /// Fail with [`crate::error::ErrorKind::DuplicateMapKey`] at the first repeat.
    EnforcedAPF,
}

impl Default for DupMapKey {
    fn default() -> Self {
        DupMapKey::Quiet
    }
}

/// Options governing decode behavior (§6 `DecOptions`).
#[derive(Debug, Clone)]
pub struct DecOptions {
    pub dup_map_key: DupMapKey,
    pub max_nested_levels: usize,
}

impl Default for DecOptions {
    fn default() -> Self {
        Self {
            dup_map_key: DupMapKey::Quiet,
            max_nested_levels: DEFAULT_MAX_NESTED_LEVELS,
        }
    }
}

/// Recursion context threaded through nested `ReadCbor` calls so the depth
/// ceiling is enforced across arbitrarily nested arrays/maps/tags without
/// every leaf impl needing to know about it.
pub struct DecCtx<'o> {
    opts: &'o DecOptions,
    depth: usize,
}

impl<'o> DecCtx<'o> {
    pub fn new(opts: &'o DecOptions) -> Self {
        Self { opts, depth: 0 }
    }

    pub fn opts(&self) -> &DecOptions {
        self.opts
    }

    /// Call before recursing into a nested array/map/tag element; fails once
    /// `max_nested_levels` is exceeded.
    pub fn enter<'a>(&mut self, bytes: &'a [u8]) -> Result<(), InternalError<'a>> {
        self.depth += 1;
        if self.depth > self.opts.max_nested_levels {
            return Err(InternalError::new(
                bytes,
                ErrorKind::MaxNestedLevel {
                    limit: self.opts.max_nested_levels,
                },
            ));
        }
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth -= 1;
    }
}

/// Types that can be decoded from CBOR bytes.
pub trait ReadCbor: Sized {
    /// Decodes one item from the front of `bytes`, returning the value and
    /// the unconsumed remainder.
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>>;

    /// Decodes into an existing value, merging rather than replacing where
    /// the target is a container (§4.3): the default simply replaces, which
    /// is correct for every primitive target; container impls override this
    /// to merge and to erase (rather than ignore) on null/undefined.
    fn read_cbor_into<'a>(
        &mut self,
        bytes: &'a [u8],
        ctx: &mut DecCtx,
    ) -> Result<&'a [u8], InternalError<'a>> {
        if is_null_or_undefined(bytes)? {
            // primitive targets are left unchanged on null/undefined (§4.3)
            let (_, rest) = Value::read_cbor(bytes, ctx)?;
            return Ok(rest);
        }
        let (v, rest) = Self::read_cbor(bytes, ctx)?;
        *self = v;
        Ok(rest)
    }
}

/// Whether `bytes` starts with a CBOR null or undefined item. Exposed (not
/// just crate-private) so derive-generated `read_cbor_into` overrides can
/// apply the same null/undefined-erases-a-container rule (§4.3) as the
/// hand-written container impls below.
pub fn is_null_or_undefined(bytes: &[u8]) -> Result<bool, InternalError<'_>> {
    let (header, _) = read_header(bytes)?;
    Ok(header.major == MAJOR_LIT
        && matches!(header.arg, Argument::Value(v) if v == LIT_NULL as u64 || v == LIT_UNDEFINED as u64))
}

fn type_error<'a, T>(bytes: &'a [u8], value: ValueKind) -> Result<T, InternalError<'a>> {
    Err(InternalError::new(
        bytes,
        ErrorKind::UnmarshalType {
            value,
            target_type: std::any::type_name::<T>(),
            strct: None,
            field: None,
        },
    ))
}

fn kind_of(major: u8, arg: Argument) -> ValueKind {
    match major {
        MAJOR_POS => ValueKind::PositiveInteger,
        MAJOR_NEG => ValueKind::NegativeInteger,
        MAJOR_BYTES => ValueKind::ByteString,
        MAJOR_STR => ValueKind::TextString,
        MAJOR_ARRAY => ValueKind::Array,
        MAJOR_DICT => ValueKind::Map,
        MAJOR_TAG => ValueKind::Tag,
        MAJOR_LIT => match arg {
            Argument::Value(v) if v == LIT_FLOAT32 as u64 || v == LIT_FLOAT64 as u64 || v == 25 => {
                ValueKind::FloatingPoint
            }
            _ => ValueKind::Primitive,
        },
        _ => ValueKind::Primitive,
    }
}

fn checked_len(bytes: &[u8], len: u64) -> Result<usize, InternalError<'_>> {
    // See wf.rs::checked_len: bound against isize::MAX, not usize::MAX, which
    // is the same 64-bit value as u64::MAX and so would never reject anything.
    if len > isize::MAX as u64 {
        return Err(InternalError::new(bytes, ErrorKind::OversizedItem));
    }
    Ok(len as usize)
}

/// Reads one definite- or indefinite-length byte/text payload, concatenating
/// chunks. `major` selects which major type the chunks must share.
fn read_value_bytes<'a>(bytes: &'a [u8], major: u8) -> Result<(Vec<u8>, &'a [u8]), InternalError<'a>> {
    let (header, header_len) = read_header(bytes)?;
    match header.arg {
        Argument::Value(len) => {
            let len = checked_len(bytes, len)?;
            let rest = &bytes[header_len..];
            if rest.len() < len {
                return Err(InternalError::new(
                    bytes,
                    ErrorKind::UnexpectedEof(WhileParsing::BytesValue),
                ));
            }
            Ok((rest[..len].to_vec(), &rest[len..]))
        }
        Argument::Indefinite => {
            let mut out = Vec::new();
            let mut pos = header_len;
            loop {
                let chunk = &bytes[pos..];
                let first = *chunk.first().ok_or_else(|| {
                    InternalError::new(bytes, ErrorKind::UnexpectedEof(WhileParsing::BytesFragment))
                })?;
                if is_break(first) {
                    pos += 1;
                    break;
                }
                let (chunk_header, chunk_header_len) = read_header(chunk)?;
                if chunk_header.major != major {
                    return Err(InternalError::new(bytes, ErrorKind::InvalidStringFragment));
                }
                let len = match chunk_header.arg {
                    Argument::Value(v) => checked_len(chunk, v)?,
                    Argument::Indefinite => {
                        return Err(InternalError::new(bytes, ErrorKind::InvalidStringFragment))
                    }
                };
                let payload = &chunk[chunk_header_len..];
                if payload.len() < len {
                    return Err(InternalError::new(
                        bytes,
                        ErrorKind::UnexpectedEof(WhileParsing::BytesFragment),
                    ));
                }
                out.extend_from_slice(&payload[..len]);
                pos += chunk_header_len + len;
            }
            Ok((out, &bytes[pos..]))
        }
    }
}

macro_rules! uint_impl {
    ($t:ty) => {
        impl ReadCbor for $t {
            fn read_cbor<'a>(
                bytes: &'a [u8],
                _ctx: &mut DecCtx,
            ) -> Result<(Self, &'a [u8]), InternalError<'a>> {
                let (header, header_len) = read_header(bytes)?;
                match header.major {
                    MAJOR_POS => match header.arg {
                        Argument::Value(v) => {
                            let v: $t = v
                                .try_into()
                                .map_err(|_| mismatch::<$t>(bytes, ValueKind::PositiveInteger))?;
                            Ok((v, &bytes[header_len..]))
                        }
                        Argument::Indefinite => unreachable!("header reader rejects this"),
                    },
                    other => type_error(bytes, kind_of(other, header.arg)),
                }
            }
        }
    };
}

macro_rules! int_impl {
    ($t:ty) => {
        impl ReadCbor for $t {
            fn read_cbor<'a>(
                bytes: &'a [u8],
                _ctx: &mut DecCtx,
            ) -> Result<(Self, &'a [u8]), InternalError<'a>> {
                let (header, header_len) = read_header(bytes)?;
                match header.major {
                    MAJOR_POS => match header.arg {
                        Argument::Value(v) => {
                            let v: $t = v
                                .try_into()
                                .map_err(|_| mismatch::<$t>(bytes, ValueKind::PositiveInteger))?;
                            Ok((v, &bytes[header_len..]))
                        }
                        Argument::Indefinite => unreachable!(),
                    },
                    MAJOR_NEG => match header.arg {
                        Argument::Value(v) => {
                            let v = -1i128 - v as i128;
                            let v: $t = v
                                .try_into()
                                .map_err(|_| mismatch::<$t>(bytes, ValueKind::NegativeInteger))?;
                            Ok((v, &bytes[header_len..]))
                        }
                        Argument::Indefinite => unreachable!(),
                    },
                    other => type_error(bytes, kind_of(other, header.arg)),
                }
            }
        }
    };
}

fn mismatch<'a, T>(bytes: &'a [u8], value: ValueKind) -> InternalError<'a> {
    InternalError::new(
        bytes,
        ErrorKind::UnmarshalType {
            value,
            target_type: std::any::type_name::<T>(),
            strct: None,
            field: None,
        },
    )
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

/// Reads a tag 2/3 bignum payload (a byte string holding the value's
/// minimal big-endian unsigned representation) into a `u128` magnitude.
fn bignum_magnitude<'a>(bytes: &'a [u8]) -> Result<(u128, &'a [u8]), InternalError<'a>> {
    let (header, _) = read_header(bytes)?;
    if header.major != MAJOR_BYTES {
        return type_error(bytes, kind_of(header.major, header.arg));
    }
    let (raw, rest) = read_value_bytes(bytes, MAJOR_BYTES)?;
    if raw.len() > 16 {
        return Err(InternalError::new(bytes, ErrorKind::OversizedItem));
    }
    let mut buf = [0u8; 16];
    buf[16 - raw.len()..].copy_from_slice(&raw);
    Ok((u128::from_be_bytes(buf), rest))
}

/// `u128`/`i128` additionally accept tag 2/3 bignums (RFC 7049 §2.4.2) for
/// magnitudes beyond what a plain CBOR integer argument (max 8 bytes) can
/// hold, mirroring the bignum encoding `WriteCbor` emits for such values.
impl ReadCbor for u128 {
    fn read_cbor<'a>(bytes: &'a [u8], _ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (header, header_len) = read_header(bytes)?;
        match header.major {
            MAJOR_POS => match header.arg {
                Argument::Value(v) => Ok((v as u128, &bytes[header_len..])),
                Argument::Indefinite => unreachable!("header reader rejects this"),
            },
            MAJOR_TAG => {
                let tag = header.arg.value().expect("indefinite tag rejected by header reader");
                if tag != TAG_BIGNUM_POS {
                    return type_error(bytes, ValueKind::Tag);
                }
                bignum_magnitude(&bytes[header_len..])
            }
            other => type_error(bytes, kind_of(other, header.arg)),
        }
    }
}

impl ReadCbor for i128 {
    fn read_cbor<'a>(bytes: &'a [u8], _ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (header, header_len) = read_header(bytes)?;
        match header.major {
            MAJOR_POS => match header.arg {
                Argument::Value(v) => Ok((v as i128, &bytes[header_len..])),
                Argument::Indefinite => unreachable!(),
            },
            MAJOR_NEG => match header.arg {
                Argument::Value(v) => Ok((-1i128 - v as i128, &bytes[header_len..])),
                Argument::Indefinite => unreachable!(),
            },
            MAJOR_TAG => {
                let tag = header.arg.value().expect("indefinite tag rejected by header reader");
                let rest = &bytes[header_len..];
                match tag {
                    TAG_BIGNUM_POS => {
                        let (magnitude, rest) = bignum_magnitude(rest)?;
                        let v: i128 = magnitude
                            .try_into()
                            .map_err(|_| InternalError::new(bytes, ErrorKind::OversizedItem))?;
                        Ok((v, rest))
                    }
                    TAG_BIGNUM_NEG => {
                        let (magnitude, rest) = bignum_magnitude(rest)?;
                        let magnitude: i128 = magnitude
                            .try_into()
                            .map_err(|_| InternalError::new(bytes, ErrorKind::OversizedItem))?;
                        Ok((-1i128 - magnitude, rest))
                    }
                    _ => type_error(bytes, ValueKind::Tag),
                }
            }
            other => type_error(bytes, kind_of(other, header.arg)),
        }
    }
}

impl ReadCbor for bool {
    fn read_cbor<'a>(bytes: &'a [u8], _ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (header, header_len) = read_header(bytes)?;
        match (header.major, header.arg) {
            (MAJOR_LIT, Argument::Value(v)) if v == LIT_FALSE as u64 => Ok((false, &bytes[header_len..])),
            (MAJOR_LIT, Argument::Value(v)) if v == LIT_TRUE as u64 => Ok((true, &bytes[header_len..])),
            (major, arg) => type_error(bytes, kind_of(major, arg)),
        }
    }
}

fn read_f64<'a>(bytes: &'a [u8]) -> Result<(f64, &'a [u8]), InternalError<'a>> {
    let (header, header_len) = read_header(bytes)?;
    match header.major {
        MAJOR_LIT => {
            let width = header_len - 1;
            match (header.arg, width) {
                (Argument::Value(v), 2) => Ok((half::f16::from_bits(v as u16).to_f64(), &bytes[header_len..])),
                (Argument::Value(v), 4) => Ok((f32::from_bits(v as u32) as f64, &bytes[header_len..])),
                (Argument::Value(v), 8) => Ok((f64::from_bits(v), &bytes[header_len..])),
                (arg, _) => type_error(bytes, kind_of(MAJOR_LIT, arg)),
            }
        }
        MAJOR_POS => match header.arg {
            Argument::Value(v) => Ok((v as f64, &bytes[header_len..])),
            Argument::Indefinite => unreachable!(),
        },
        MAJOR_NEG => match header.arg {
            Argument::Value(v) => Ok((-1.0 - v as f64, &bytes[header_len..])),
            Argument::Indefinite => unreachable!(),
        },
        other => type_error(bytes, kind_of(other, header.arg)),
    }
}

impl ReadCbor for f64 {
    fn read_cbor<'a>(bytes: &'a [u8], _ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        read_f64(bytes)
    }
}

impl ReadCbor for f32 {
    fn read_cbor<'a>(bytes: &'a [u8], _ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (v, rest) = read_f64(bytes)?;
        Ok((v as f32, rest))
    }
}

impl ReadCbor for String {
    fn read_cbor<'a>(bytes: &'a [u8], _ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (header, _) = read_header(bytes)?;
        if header.major != MAJOR_STR {
            return type_error(bytes, kind_of(header.major, header.arg));
        }
        let (raw, rest) = read_value_bytes(bytes, MAJOR_STR)?;
        let s = String::from_utf8(raw).map_err(|_| InternalError::new(bytes, ErrorKind::InvalidUtf8))?;
        Ok((s, rest))
    }
}

impl ReadCbor for Vec<u8> {
    fn read_cbor<'a>(bytes: &'a [u8], _ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (header, _) = read_header(bytes)?;
        if header.major != MAJOR_BYTES {
            return type_error(bytes, kind_of(header.major, header.arg));
        }
        read_value_bytes(bytes, MAJOR_BYTES)
    }
}

impl<T: ReadCbor> ReadCbor for Option<T> {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        if is_null_or_undefined(bytes)? {
            let (header, header_len) = read_header(bytes)?;
            let _ = header;
            Ok((None, &bytes[header_len..]))
        } else {
            let (v, rest) = T::read_cbor(bytes, ctx)?;
            Ok((Some(v), rest))
        }
    }
}

impl<T: ReadCbor> ReadCbor for Box<T> {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (v, rest) = T::read_cbor(bytes, ctx)?;
        Ok((Box::new(v), rest))
    }
}

fn read_array_elements<'a>(
    bytes: &'a [u8],
    ctx: &mut DecCtx,
    mut push: impl FnMut(&'a [u8], &mut DecCtx) -> Result<&'a [u8], InternalError<'a>>,
) -> Result<&'a [u8], InternalError<'a>> {
    let (header, header_len) = read_header(bytes)?;
    if header.major != MAJOR_ARRAY {
        return Err(mismatch::<()>(bytes, kind_of(header.major, header.arg)));
    }
    ctx.enter(bytes)?;
    let mut rest = &bytes[header_len..];
    match header.arg {
        Argument::Value(count) => {
            let count = checked_len(bytes, count)?;
            for _ in 0..count {
                rest = push(rest, ctx)?;
            }
        }
        Argument::Indefinite => loop {
            let first = *rest
                .first()
                .ok_or_else(|| InternalError::new(bytes, ErrorKind::UnexpectedEof(WhileParsing::ArrayItem)))?;
            if is_break(first) {
                rest = &rest[1..];
                break;
            }
            rest = push(rest, ctx)?;
        },
    }
    ctx.exit();
    Ok(rest)
}

impl<T: ReadCbor> ReadCbor for Vec<T> {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let mut out = Vec::new();
        let rest = read_array_elements(bytes, ctx, |rest, ctx| {
            let (v, rest) = T::read_cbor(rest, ctx)?;
            out.push(v);
            Ok(rest)
        })?;
        Ok((out, rest))
    }

    fn read_cbor_into<'a>(
        &mut self,
        bytes: &'a [u8],
        ctx: &mut DecCtx,
    ) -> Result<&'a [u8], InternalError<'a>> {
        if is_null_or_undefined(bytes)? {
            self.clear();
            let (header, header_len) = read_header(bytes)?;
            let _ = header;
            return Ok(&bytes[header_len..]);
        }
        let (v, rest) = Self::read_cbor(bytes, ctx)?;
        *self = v;
        Ok(rest)
    }
}

impl<T: ReadCbor> ReadCbor for VecDeque<T> {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (v, rest) = Vec::<T>::read_cbor(bytes, ctx)?;
        Ok((v.into(), rest))
    }
}

impl<T: ReadCbor + Default + Copy, const N: usize> ReadCbor for [T; N] {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let mut out = [T::default(); N];
        let mut idx = 0usize;
        let rest = read_array_elements(bytes, ctx, |rest, ctx| {
            let (v, rest) = T::read_cbor(rest, ctx)?;
            if idx < N {
                out[idx] = v;
            }
            idx += 1;
            Ok(rest)
        })?;
        Ok((out, rest))
    }
}

fn read_map_entries<'a>(
    bytes: &'a [u8],
    ctx: &mut DecCtx,
    mut push: impl FnMut(&'a [u8], &mut DecCtx) -> Result<&'a [u8], InternalError<'a>>,
) -> Result<&'a [u8], InternalError<'a>> {
    let (header, header_len) = read_header(bytes)?;
    if header.major != MAJOR_DICT {
        return Err(mismatch::<()>(bytes, kind_of(header.major, header.arg)));
    }
    ctx.enter(bytes)?;
    let mut rest = &bytes[header_len..];
    match header.arg {
        Argument::Value(count) => {
            let count = checked_len(bytes, count)?;
            for _ in 0..count {
                rest = push(rest, ctx)?;
            }
        }
        Argument::Indefinite => loop {
            let first = *rest
                .first()
                .ok_or_else(|| InternalError::new(bytes, ErrorKind::UnexpectedEof(WhileParsing::DictItem)))?;
            if is_break(first) {
                rest = &rest[1..];
                break;
            }
            rest = push(rest, ctx)?;
        },
    }
    ctx.exit();
    Ok(rest)
}

impl<K: ReadCbor + Ord, V: ReadCbor> ReadCbor for BTreeMap<K, V> {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let mut out = BTreeMap::new();
        let rest = read_map_entries(bytes, ctx, |rest, ctx| {
            let (k, rest) = K::read_cbor(rest, ctx)?;
            let (v, rest) = V::read_cbor(rest, ctx)?;
            if out.insert(k, v).is_some() && ctx.opts().dup_map_key == DupMapKey::EnforcedAPF {
                return Err(InternalError::new(bytes, ErrorKind::DuplicateMapKey));
            }
            Ok(rest)
        })?;
        Ok((out, rest))
    }
}

impl<K: ReadCbor + Eq + Hash, V: ReadCbor> ReadCbor for HashMap<K, V> {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let mut out = HashMap::new();
        let rest = read_map_entries(bytes, ctx, |rest, ctx| {
            let (k, rest) = K::read_cbor(rest, ctx)?;
            let (v, rest) = V::read_cbor(rest, ctx)?;
            if out.insert(k, v).is_some() && ctx.opts().dup_map_key == DupMapKey::EnforcedAPF {
                return Err(InternalError::new(bytes, ErrorKind::DuplicateMapKey));
            }
            Ok(rest)
        })?;
        Ok((out, rest))
    }

    fn read_cbor_into<'a>(
        &mut self,
        bytes: &'a [u8],
        ctx: &mut DecCtx,
    ) -> Result<&'a [u8], InternalError<'a>> {
        if is_null_or_undefined(bytes)? {
            self.clear();
            let (header, header_len) = read_header(bytes)?;
            let _ = header;
            return Ok(&bytes[header_len..]);
        }
        // merge into existing map rather than replacing it (§4.3)
        read_map_entries(bytes, ctx, |rest, ctx| {
            let (k, rest) = K::read_cbor(rest, ctx)?;
            let (v, rest) = V::read_cbor(rest, ctx)?;
            if self.insert(k, v).is_some() && ctx.opts().dup_map_key == DupMapKey::EnforcedAPF {
                return Err(InternalError::new(bytes, ErrorKind::DuplicateMapKey));
            }
            Ok(rest)
        })
    }
}

macro_rules! tuple_impl {
    ($($t:ident),+) => {
        impl<$($t: ReadCbor),*> ReadCbor for ($($t,)*) {
            #[allow(non_snake_case)]
            fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
                let (header, header_len) = read_header(bytes)?;
                if header.major != MAJOR_ARRAY {
                    return Err(mismatch::<Self>(bytes, kind_of(header.major, header.arg)));
                }
                let expected = 0 $(+ { let _ = stringify!($t); 1 })*;
                let found = match header.arg {
                    Argument::Value(v) => v as usize,
                    Argument::Indefinite => usize::MAX,
                };
                if header.arg != Argument::Indefinite && found != expected {
                    return Err(InternalError::new(bytes, ErrorKind::UnmarshalType {
                        value: ValueKind::Array,
                        target_type: std::any::type_name::<Self>(),
                        strct: None,
                        field: None,
                    }));
                }
                ctx.enter(bytes)?;
                let mut rest = &bytes[header_len..];
                $(
                    let ($t, r) = $t::read_cbor(rest, ctx)?;
                    rest = r;
                )*
                ctx.exit();
                Ok((($($t,)*), rest))
            }
        }
    };
}

tuple_impl!(T0);
tuple_impl!(T0, T1);
tuple_impl!(T0, T1, T2);
tuple_impl!(T0, T1, T2, T3);
tuple_impl!(T0, T1, T2, T3, T4);
tuple_impl!(T0, T1, T2, T3, T4, T5);
tuple_impl!(T0, T1, T2, T3, T4, T5, T6);
tuple_impl!(T0, T1, T2, T3, T4, T5, T6, T7);
tuple_impl!(T0, T1, T2, T3, T4, T5, T6, T7, T8);
tuple_impl!(T0, T1, T2, T3, T4, T5, T6, T7, T8, T9);

fn read_tagged_payload<'a>(bytes: &'a [u8]) -> Result<(Option<u64>, &'a [u8]), InternalError<'a>> {
    let (header, header_len) = read_header(bytes)?;
    if header.major == MAJOR_TAG {
        Ok((header.arg.value(), &bytes[header_len..]))
    } else {
        Ok((None, bytes))
    }
}

impl ReadCbor for Value {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (tag, after_tag) = read_tagged_payload(bytes)?;
        let (header, header_len) = read_header(after_tag)?;
        let (value, rest): (Value, &[u8]) = match header.major {
            MAJOR_POS => match header.arg {
                Argument::Value(v) => (Value::Integer(v as i128), &after_tag[header_len..]),
                Argument::Indefinite => unreachable!(),
            },
            MAJOR_NEG => match header.arg {
                Argument::Value(v) => (Value::Integer(-1i128 - v as i128), &after_tag[header_len..]),
                Argument::Indefinite => unreachable!(),
            },
            MAJOR_BYTES => {
                let (b, rest) = read_value_bytes(after_tag, MAJOR_BYTES)?;
                (Value::Bytes(b), rest)
            }
            MAJOR_STR => {
                let (b, rest) = read_value_bytes(after_tag, MAJOR_STR)?;
                let s = String::from_utf8(b)
                    .map_err(|_| InternalError::new(after_tag, ErrorKind::InvalidUtf8))?;
                (Value::Text(s), rest)
            }
            MAJOR_ARRAY => {
                let mut out = Vec::new();
                let rest = read_array_elements(after_tag, ctx, |rest, ctx| {
                    let (v, rest) = Value::read_cbor(rest, ctx)?;
                    out.push(v);
                    Ok(rest)
                })?;
                (Value::Array(out), rest)
            }
            MAJOR_DICT => {
                let mut out = HashMap::new();
                let rest = read_map_entries(after_tag, ctx, |rest, ctx| {
                    let (k, rest) = Value::read_cbor(rest, ctx)?;
                    if !k.is_valid_map_key() {
                        return Err(InternalError::new(after_tag, ErrorKind::InvalidMapKey));
                    }
                    let (v, rest) = Value::read_cbor(rest, ctx)?;
                    if out.insert(k, v).is_some() && ctx.opts().dup_map_key == DupMapKey::EnforcedAPF {
                        return Err(InternalError::new(after_tag, ErrorKind::DuplicateMapKey));
                    }
                    Ok(rest)
                })?;
                (Value::Map(out), rest)
            }
            MAJOR_LIT => match header.arg {
                Argument::Value(v) if v == LIT_FALSE as u64 => (Value::Bool(false), &after_tag[header_len..]),
                Argument::Value(v) if v == LIT_TRUE as u64 => (Value::Bool(true), &after_tag[header_len..]),
                Argument::Value(v) if v == LIT_NULL as u64 => (Value::Null, &after_tag[header_len..]),
                Argument::Value(v) if v == LIT_UNDEFINED as u64 => (Value::Undefined, &after_tag[header_len..]),
                Argument::Value(v) if v == LIT_FLOAT32 as u64 || v == LIT_FLOAT64 as u64 || v == 25 => {
                    let (f, rest) = read_f64(after_tag)?;
                    (Value::Float(f), rest)
                }
                Argument::Value(v) => (Value::Integer(v as i128), &after_tag[header_len..]),
                Argument::Indefinite => return Err(InternalError::new(after_tag, ErrorKind::UnexpectedBreak)),
            },
            _ => unreachable!(),
        };
        Ok((unwrap_known_tag(tag, value), rest))
    }
}

fn unwrap_known_tag(tag: Option<u64>, value: Value) -> Value {
    match tag {
        Some(TAG_ISO8601) | Some(TAG_EPOCH) => value,
        Some(TAG_BIGNUM_POS) | Some(TAG_BIGNUM_NEG) => value,
        Some(t) => Value::Tagged(t, Box::new(value)),
        None => value,
    }
}

/// Decodes `bytes` into `T`, rejecting any trailing data.
pub fn from_slice<T: ReadCbor>(bytes: &[u8], opts: &DecOptions) -> Result<T, Error> {
    let mut ctx = DecCtx::new(opts);
    let (value, rest) = T::read_cbor(bytes, &mut ctx).map_err(|e| e.rebase(bytes))?;
    if !rest.is_empty() {
        return Err(Error::new(
            bytes.len() - rest.len(),
            ErrorKind::ExtraneousData {
                index: bytes.len() - rest.len(),
                num_of_bytes: rest.len(),
            },
        ));
    }
    Ok(value)
}

/// Decodes `bytes` into an existing `target`, applying the merge/erase rules
/// of §4.3 instead of plain replacement.
pub fn unmarshal_into<T: ReadCbor>(bytes: &[u8], target: &mut T, opts: &DecOptions) -> Result<(), Error> {
    let mut ctx = DecCtx::new(opts);
    let rest = target
        .read_cbor_into(bytes, &mut ctx)
        .map_err(|e| e.rebase(bytes))?;
    if !rest.is_empty() {
        return Err(Error::new(
            bytes.len() - rest.len(),
            ErrorKind::ExtraneousData {
                index: bytes.len() - rest.len(),
                num_of_bytes: rest.len(),
            },
        ));
    }
    Ok(())
}

/// A map key as seen on the wire, not yet matched against a field name.
/// Exposed for derive-generated `ReadCbor` impls, which look struct fields
/// up by comparing against these rather than decoding a full `Value`.
#[derive(Debug, Clone, Copy)]
pub enum RawKey<'a> {
    Text(&'a str),
    Int(i64),
}

impl<'a> RawKey<'a> {
    pub fn matches_name(&self, name: &str) -> bool {
        matches!(self, RawKey::Text(s) if *s == name)
    }

    pub fn matches_name_ci(&self, name: &str) -> bool {
        matches!(self, RawKey::Text(s) if s.eq_ignore_ascii_case(name))
    }

    pub fn matches_int(&self, key: i64) -> bool {
        matches!(self, RawKey::Int(v) if *v == key)
    }
}

/// One undecoded map entry: the key, resolved enough to match against a
/// field spec, and the still-encoded value bytes.
#[derive(Debug, Clone, Copy)]
pub struct RawEntry<'a> {
    pub key: RawKey<'a>,
    pub value: &'a [u8],
}

fn read_key<'a>(bytes: &'a [u8]) -> Result<(RawKey<'a>, &'a [u8]), InternalError<'a>> {
    let (header, header_len) = read_header(bytes)?;
    match header.major {
        MAJOR_STR => match header.arg {
            Argument::Value(len) => {
                let len = checked_len(bytes, len)?;
                let payload = &bytes[header_len..];
                if payload.len() < len {
                    return Err(InternalError::new(bytes, ErrorKind::UnexpectedEof(WhileParsing::BytesValue)));
                }
                let s = std::str::from_utf8(&payload[..len])
                    .map_err(|_| InternalError::new(bytes, ErrorKind::InvalidUtf8))?;
                Ok((RawKey::Text(s), &payload[len..]))
            }
            Argument::Indefinite => Err(InternalError::new(bytes, ErrorKind::InvalidStringFragment)),
        },
        MAJOR_POS => match header.arg {
            Argument::Value(v) => Ok((RawKey::Int(v as i64), &bytes[header_len..])),
            Argument::Indefinite => unreachable!(),
        },
        MAJOR_NEG => match header.arg {
            Argument::Value(v) => Ok((RawKey::Int(-1i64 - v as i64), &bytes[header_len..])),
            Argument::Indefinite => unreachable!(),
        },
        other => Err(InternalError::new(
            bytes,
            ErrorKind::UnmarshalType {
                value: kind_of(other, header.arg),
                target_type: "struct field key",
                strct: None,
                field: None,
            },
        )),
    }
}

/// Parses a CBOR map into raw, still-encoded key/value entries. Used by
/// derive-generated `ReadCbor` impls so struct-field lookup (and
/// `#[cbor(flatten)]` dominance resolution) can happen before any value is
/// decoded.
pub fn read_raw_map_entries<'a>(
    bytes: &'a [u8],
    ctx: &mut DecCtx,
) -> Result<(Vec<RawEntry<'a>>, &'a [u8]), InternalError<'a>> {
    let mut out = Vec::new();
    let rest = read_map_entries(bytes, ctx, |rest, ctx| {
        let (key, after_key) = read_key(rest)?;
        let (value_len, _) = crate::wf::walk_one(after_key, 0, ctx.opts().max_nested_levels)?;
        let value = &after_key[..value_len];
        out.push(RawEntry { key, value });
        Ok(&after_key[value_len..])
    })?;
    Ok((out, rest))
}

/// Decodes a single field's value bytes, attaching struct/field context to
/// any resulting type-mismatch error. Used by derive-generated impls.
pub fn read_field<'a, T: ReadCbor>(
    bytes: &'a [u8],
    ctx: &mut DecCtx,
    strct: &'static str,
    field: &'static str,
) -> Result<T, InternalError<'a>> {
    T::read_cbor(bytes, ctx).map(|(v, _)| v).map_err(|e| e.with_struct_field(strct, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::hex;

    #[test]
    fn decodes_unsigned_edge_value() {
        let bytes = hex("1bffffffffffffffff");
        let v: Value = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(v, Value::Integer(u64::MAX as i128));
        let err = from_slice::<i64>(&bytes, &DecOptions::default()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnmarshalType { .. }));
    }

    #[test]
    fn decodes_float_infinity() {
        let bytes = hex("f97c00");
        let v: Value = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(v, Value::Float(f64::INFINITY));
    }

    #[test]
    fn decodes_nested_arrays_and_tracks_shape() {
        let bytes = hex("9f01820203820405ff");
        let v: Value = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(
            v,
            Value::Array(vec![
                Value::Integer(1),
                Value::Array(vec![Value::Integer(2), Value::Integer(3)]),
                Value::Array(vec![Value::Integer(4), Value::Integer(5)]),
            ])
        );
    }

    #[test]
    fn u128_and_i128_round_trip_through_bignum_tags() {
        let big: u128 = u64::MAX as u128 + 1;
        let bytes = crate::encode::to_vec_default(&big);
        let back: u128 = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(back, big);

        let bytes = crate::encode::to_vec_default(&u128::MAX);
        let back: u128 = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(back, u128::MAX);

        let bytes = crate::encode::to_vec_default(&i128::MIN);
        let back: i128 = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(back, i128::MIN);

        let bytes = crate::encode::to_vec_default(&i128::MAX);
        let back: i128 = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(back, i128::MAX);
    }

    #[test]
    fn map_entry_type_mismatch_is_unmarshal_type_error() {
        // {"a": 1, "b": "AA"} decoded as a map of string->u64: "b"'s value
        // is a text string, not the expected integer.
        let bytes = hex("a26161016162624141");
        let err = from_slice::<BTreeMap<String, u64>>(&bytes, &DecOptions::default()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnmarshalType { .. }));
    }

    #[test]
    fn duplicate_keys_enforced_mode_errors() {
        let bytes = hex("a2616101616102"); // {"a":1,"a":2}
        let opts = DecOptions {
            dup_map_key: DupMapKey::EnforcedAPF,
            ..Default::default()
        };
        let err = from_slice::<BTreeMap<String, u64>>(&bytes, &opts).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateMapKey));
    }

    #[test]
    fn duplicate_keys_quiet_mode_keeps_last() {
        let bytes = hex("a2616101616102");
        let m: BTreeMap<String, u64> = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(m.get("a"), Some(&2));
    }
}
