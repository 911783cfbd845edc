//! Well-Formedness Walker (component B): recursive-descent structural
//! validation of a CBOR byte buffer, shared by the standalone validator and
//! the Decoder Core's pre-decode pass.

use crate::constants::*;
use crate::error::{Error, ErrorKind, InternalError, ValueKind, WhileParsing};
use crate::header::{is_break, read_header, Argument, Header};

pub(crate) const DEFAULT_MAX_NESTED_LEVELS: usize = 32;

/// Walks exactly one well-formed CBOR item starting at `bytes[0]`.
///
/// Returns the number of bytes consumed and the deepest nesting level
/// observed (0 for a top-level scalar).
pub(crate) fn walk_one<'a>(
    bytes: &'a [u8],
    depth: usize,
    max_depth: usize,
) -> Result<(usize, usize), InternalError<'a>> {
    if depth > max_depth {
        return Err(InternalError::new(
            bytes,
            ErrorKind::MaxNestedLevel { limit: max_depth },
        ));
    }
    let (header, header_len) = read_header(bytes)?;
    match header.major {
        MAJOR_POS | MAJOR_NEG => Ok((header_len, depth)),
        MAJOR_LIT => walk_simple(bytes, header, header_len),
        MAJOR_BYTES => walk_string(bytes, header, header_len, MAJOR_BYTES, false),
        MAJOR_STR => walk_string(bytes, header, header_len, MAJOR_STR, true),
        MAJOR_ARRAY => walk_array(bytes, header, header_len, depth, max_depth),
        MAJOR_DICT => walk_dict(bytes, header, header_len, depth, max_depth),
        MAJOR_TAG => walk_tag(bytes, header, header_len, depth, max_depth),
        _ => unreachable!("major type is 3 bits, all 8 values handled above"),
    }
}

fn walk_simple<'a>(
    bytes: &'a [u8],
    header: Header,
    header_len: usize,
) -> Result<(usize, usize), InternalError<'a>> {
    match header.arg {
        Argument::Value(v) if v == LIT_FLOAT32 as u64 || v == LIT_FLOAT64 as u64 => {
            Ok((header_len, 0))
        }
        Argument::Value(_) => Ok((header_len, 0)),
        Argument::Indefinite => Err(InternalError::new(bytes, ErrorKind::UnexpectedBreak)),
    }
}

fn walk_string<'a>(
    bytes: &'a [u8],
    header: Header,
    header_len: usize,
    major: u8,
    is_text: bool,
) -> Result<(usize, usize), InternalError<'a>> {
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
            if is_text {
                std::str::from_utf8(&rest[..len])
                    .map_err(|_| InternalError::new(bytes, ErrorKind::InvalidUtf8))?;
            }
            Ok((header_len + len, 0))
        }
        Argument::Indefinite => {
            let mut pos = header_len;
            loop {
                let chunk = &bytes[pos..];
                let first = *chunk
                    .first()
                    .ok_or_else(|| InternalError::new(bytes, ErrorKind::UnexpectedEof(WhileParsing::BytesFragment)))?;
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
                if is_text {
                    std::str::from_utf8(&payload[..len])
                        .map_err(|_| InternalError::new(bytes, ErrorKind::InvalidUtf8))?;
                }
                pos += chunk_header_len + len;
            }
            Ok((pos, 0))
        }
    }
}

fn walk_array<'a>(
    bytes: &'a [u8],
    header: Header,
    header_len: usize,
    depth: usize,
    max_depth: usize,
) -> Result<(usize, usize), InternalError<'a>> {
    let mut pos = header_len;
    let mut deepest = depth;
    match header.arg {
        Argument::Value(count) => {
            let count = checked_len(bytes, count)?;
            for _ in 0..count {
                let (len, d) = walk_one(&bytes[pos..], depth + 1, max_depth)
                    .map_err(|e| e.with_location(&bytes[pos..]))?;
                pos += len;
                deepest = deepest.max(d);
            }
        }
        Argument::Indefinite => loop {
            let rest = &bytes[pos..];
            let first = *rest
                .first()
                .ok_or_else(|| InternalError::new(bytes, ErrorKind::UnexpectedEof(WhileParsing::ArrayItem)))?;
            if is_break(first) {
                pos += 1;
                break;
            }
            let (len, d) = walk_one(rest, depth + 1, max_depth)
                .map_err(|e| e.with_location(rest))?;
            pos += len;
            deepest = deepest.max(d);
        },
    }
    Ok((pos, deepest))
}

fn walk_dict<'a>(
    bytes: &'a [u8],
    header: Header,
    header_len: usize,
    depth: usize,
    max_depth: usize,
) -> Result<(usize, usize), InternalError<'a>> {
    let mut pos = header_len;
    let mut deepest = depth;
    match header.arg {
        Argument::Value(count) => {
            let count = checked_len(bytes, count)?;
            for _ in 0..count {
                let (klen, kd) = walk_one(&bytes[pos..], depth + 1, max_depth)
                    .map_err(|e| e.with_location(&bytes[pos..]))?;
                pos += klen;
                let (vlen, vd) = walk_one(&bytes[pos..], depth + 1, max_depth)
                    .map_err(|e| e.with_location(&bytes[pos..]))?;
                pos += vlen;
                deepest = deepest.max(kd).max(vd);
            }
        }
        Argument::Indefinite => loop {
            let rest = &bytes[pos..];
            let first = *rest
                .first()
                .ok_or_else(|| InternalError::new(bytes, ErrorKind::UnexpectedEof(WhileParsing::DictItem)))?;
            if is_break(first) {
                pos += 1;
                break;
            }
            let (klen, kd) = walk_one(rest, depth + 1, max_depth).map_err(|e| e.with_location(rest))?;
            pos += klen;
            let vrest = &bytes[pos..];
            if vrest.first().map(|b| is_break(*b)).unwrap_or(true) {
                return Err(InternalError::new(bytes, ErrorKind::UnexpectedBreak));
            }
            let (vlen, vd) = walk_one(vrest, depth + 1, max_depth).map_err(|e| e.with_location(vrest))?;
            pos += vlen;
            deepest = deepest.max(kd).max(vd);
        },
    }
    Ok((pos, deepest))
}

fn walk_tag<'a>(
    bytes: &'a [u8],
    header: Header,
    header_len: usize,
    depth: usize,
    max_depth: usize,
) -> Result<(usize, usize), InternalError<'a>> {
    let tag_num = header.arg.value().expect("indefinite tag rejected by header reader");
    let rest = &bytes[header_len..];
    let (item_header, _) = read_header(rest)?;
    let (len, d) = walk_one(rest, depth + 1, max_depth).map_err(|e| e.with_location(rest))?;
    check_tag_payload(bytes, tag_num, item_header.major, item_header.arg)?;
    Ok((header_len + len, d))
}

fn check_tag_payload(
    bytes: &[u8],
    tag: u64,
    major: u8,
    arg: Argument,
) -> Result<(), InternalError<'_>> {
    let expected = match tag {
        TAG_ISO8601 => Some("text string"),
        TAG_EPOCH => Some("integer or floating-point number"),
        TAG_BIGNUM_POS | TAG_BIGNUM_NEG => Some("byte string"),
        _ => None,
    };
    let Some(expected) = expected else {
        return Ok(());
    };
    let ok = match tag {
        TAG_ISO8601 => major == MAJOR_STR,
        TAG_EPOCH => major == MAJOR_POS || major == MAJOR_NEG || (major == MAJOR_LIT && is_float_arg(arg)),
        TAG_BIGNUM_POS | TAG_BIGNUM_NEG => major == MAJOR_BYTES,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        let got = value_kind_of(major, arg);
        let tag = if tag == TAG_BIGNUM_NEG { TAG_BIGNUM_POS } else { tag };
        Err(InternalError::new(
            bytes,
            ErrorKind::InvalidTag {
                tag,
                expected,
                got,
            },
        ))
    }
}

fn is_float_arg(arg: Argument) -> bool {
    matches!(arg, Argument::Value(v) if v == LIT_FLOAT32 as u64 || v == LIT_FLOAT64 as u64 || v == 25)
}

fn value_kind_of(major: u8, arg: Argument) -> ValueKind {
    match major {
        MAJOR_POS => ValueKind::PositiveInteger,
        MAJOR_NEG => ValueKind::NegativeInteger,
        MAJOR_BYTES => ValueKind::ByteString,
        MAJOR_STR => ValueKind::TextString,
        MAJOR_ARRAY => ValueKind::Array,
        MAJOR_DICT => ValueKind::Map,
        MAJOR_TAG => ValueKind::Tag,
        MAJOR_LIT => {
            if is_float_arg(arg) {
                ValueKind::FloatingPoint
            } else {
                ValueKind::Primitive
            }
        }
        _ => ValueKind::Primitive,
    }
}

fn checked_len(bytes: &[u8], len: u64) -> Result<usize, InternalError<'_>> {
    // Bounding against `isize::MAX` rather than `usize::MAX` matches the
    // teacher: on a 64-bit target `usize::MAX == u64::MAX`, so a plain
    // `usize::try_from` would never reject anything.
    if len > isize::MAX as u64 {
        return Err(InternalError::new(bytes, ErrorKind::OversizedItem));
    }
    Ok(len as usize)
}

/// Verifies that `bytes` starts with a well-formed CBOR item (per
/// [`DEFAULT_MAX_NESTED_LEVELS`]) and returns the unconsumed suffix.
///
/// This is the public `Valid` operation of §6: callers concatenating
/// multiple items walk the returned suffix again.
pub fn valid(bytes: &[u8]) -> Result<&[u8], Error> {
    valid_with_max_depth(bytes, DEFAULT_MAX_NESTED_LEVELS)
}

pub(crate) fn valid_with_max_depth(bytes: &[u8], max_depth: usize) -> Result<&[u8], Error> {
    let (len, _depth) = walk_one(bytes, 0, max_depth).map_err(|e| e.rebase(bytes))?;
    Ok(&bytes[len..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::hex;

    #[test]
    fn scalar_consumes_exactly_its_bytes() {
        assert_eq!(valid(&[0x00]).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn concatenated_items_leave_remainder() {
        let bytes = [0x00u8, 0x01];
        let rest = valid(&bytes).unwrap();
        assert_eq!(rest, &[0x01]);
        let rest = valid(rest).unwrap();
        assert_eq!(rest, &[] as &[u8]);
    }

    #[test]
    fn indefinite_array_of_arrays() {
        let bytes = hex("9f01820203820405ff");
        let (len, depth) = walk_one(&bytes, 0, DEFAULT_MAX_NESTED_LEVELS).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(depth, 2);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let bytes = hex("bbcf30303030303030cfd697829782");
        let err = valid(&bytes).unwrap_err();
        assert!(err.to_string().contains("is too large"));
    }

    #[test]
    fn tag_zero_requires_text_string() {
        let bytes = hex("c01a514b67b0");
        let err = valid(&bytes).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cbor: tag number 0 must be followed by text string, got positive integer at offset 0"
        );
    }

    #[test]
    fn depth_bound_is_enforced() {
        // 40 nested one-element arrays exceeds the default ceiling of 32.
        let mut bytes = vec![0x00u8];
        for _ in 0..40 {
            let mut wrapped = vec![0x81u8];
            wrapped.extend_from_slice(&bytes);
            bytes = wrapped;
        }
        assert!(valid(&bytes).is_err());
    }

    #[test]
    fn break_outside_container_is_rejected() {
        assert!(valid(&[0xff]).is_err());
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        assert!(valid(&[0x61, 0xff]).is_err());
    }
}
