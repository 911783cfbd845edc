//! Low-level CBOR initial-byte and argument decoding (component A, Header Reader).
//!
//! These functions only ever look at the bytes needed to decode a single
//! header; they never recurse into payloads. Higher-level recursion lives in
//! [`crate::wf`] and [`crate::decode`].

use crate::constants::*;
use crate::error::{ErrorKind, InternalError, WhileParsing};

/// A decoded CBOR initial byte: major type plus its numeric argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub major: u8,
    pub arg: Argument,
}

/// The argument of a header: either a concrete value or the indefinite-length marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Argument {
    Value(u64),
    Indefinite,
}

impl Argument {
    pub fn value(self) -> Option<u64> {
        match self {
            Argument::Value(v) => Some(v),
            Argument::Indefinite => None,
        }
    }
}

/// Reads one header starting at `bytes[0]`, returning the header and the
/// number of bytes it occupied.
pub(crate) fn read_header(bytes: &[u8]) -> Result<(Header, usize), InternalError<'_>> {
    let first = *bytes
        .first()
        .ok_or_else(|| InternalError::new(bytes, ErrorKind::UnexpectedEof(WhileParsing::ItemHeader)))?;
    let major = first >> 5;
    let ai = first & 0x1f;
    match ai {
        0..=23 => Ok((
            Header {
                major,
                arg: Argument::Value(ai as u64),
            },
            1,
        )),
        24 => {
            let b = get(bytes, 1, WhileParsing::HeaderValue)?;
            Ok((
                Header {
                    major,
                    arg: Argument::Value(b[0] as u64),
                },
                2,
            ))
        }
        25 => {
            let b = get(bytes, 2, WhileParsing::HeaderValue)?;
            Ok((
                Header {
                    major,
                    arg: Argument::Value(u16::from_be_bytes([b[0], b[1]]) as u64),
                },
                3,
            ))
        }
        26 => {
            let b = get(bytes, 4, WhileParsing::HeaderValue)?;
            Ok((
                Header {
                    major,
                    arg: Argument::Value(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64),
                },
                5,
            ))
        }
        27 => {
            let b = get(bytes, 8, WhileParsing::HeaderValue)?;
            Ok((
                Header {
                    major,
                    arg: Argument::Value(u64::from_be_bytes([
                        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                    ])),
                },
                9,
            ))
        }
        28..=30 => Err(InternalError::new(bytes, ErrorKind::InvalidAdditionalInfo)),
        31 => {
            if major == MAJOR_POS || major == MAJOR_NEG || major == MAJOR_TAG {
                Err(InternalError::new(bytes, ErrorKind::InvalidAdditionalInfo))
            } else {
                Ok((
                    Header {
                        major,
                        arg: Argument::Indefinite,
                    },
                    1,
                ))
            }
        }
        _ => unreachable!("5-bit additional info always fits 0..=31"),
    }
}

/// Fetches `n` bytes following the initial byte at offset 1, failing with an
/// offset-accurate EOF error if the buffer is shorter than required.
fn get(bytes: &[u8], n: usize, ctx: WhileParsing) -> Result<&[u8], InternalError<'_>> {
    let need = 1 + n;
    if bytes.len() < need {
        Err(InternalError::new(bytes, ErrorKind::UnexpectedEof(ctx)))
    } else {
        Ok(&bytes[1..need])
    }
}

/// True when `first` (the initial byte) is the standalone break marker (0xff).
pub(crate) fn is_break(first: u8) -> bool {
    first == STOP_BYTE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_are_single_byte() {
        let (h, n) = read_header(&[0x17]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(h.major, MAJOR_POS);
        assert_eq!(h.arg, Argument::Value(23));
    }

    #[test]
    fn one_byte_argument() {
        let (h, n) = read_header(&[0x18, 0xff]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(h.arg, Argument::Value(255));
    }

    #[test]
    fn eight_byte_argument() {
        let bytes = [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let (h, n) = read_header(&bytes).unwrap();
        assert_eq!(n, 9);
        assert_eq!(h.arg, Argument::Value(u64::MAX));
    }

    #[test]
    fn reserved_additional_info_is_rejected() {
        assert!(read_header(&[0x1c]).is_err());
    }

    #[test]
    fn indefinite_on_integer_major_is_rejected() {
        assert!(read_header(&[0x1f]).is_err());
    }

    #[test]
    fn indefinite_on_array_is_accepted() {
        let (h, n) = read_header(&[0x9f]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(h.arg, Argument::Indefinite);
    }

    #[test]
    fn truncated_header_is_eof() {
        assert!(read_header(&[0x19, 0x01]).is_err());
        assert!(read_header(&[]).is_err());
    }
}
