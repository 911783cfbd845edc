use std::fmt::{Debug, Display};

/// What the parser was looking for when bytes ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhileParsing {
    ItemHeader,
    HeaderValue,
    ArrayItem,
    DictItem,
    BytesFragment,
    BytesValue,
    StringFragment,
    StringValue,
}

/// The kind of CBOR item involved in a type-mismatch error, named per the
/// stable phrases callers may match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    PositiveInteger,
    NegativeInteger,
    ByteString,
    TextString,
    Array,
    Map,
    Primitive,
    FloatingPoint,
    Tag,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValueKind::PositiveInteger => "positive integer",
            ValueKind::NegativeInteger => "negative integer",
            ValueKind::ByteString => "byte string",
            ValueKind::TextString => "UTF-8 text string",
            ValueKind::Array => "array",
            ValueKind::Map => "map",
            ValueKind::Primitive => "primitive",
            ValueKind::FloatingPoint => "floating-point number",
            ValueKind::Tag => "tag",
        };
        f.write_str(s)
    }
}

/// Errors that may be encountered when parsing, validating or decoding CBOR.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// lower five bits of an item header were one of the reserved values (28, 29, 30)
    InvalidAdditionalInfo,
    /// a 0xff break byte appeared where no indefinite-length container was open
    UnexpectedBreak,
    /// a text string (or fragment thereof) contained invalid UTF-8 data
    InvalidUtf8,
    /// indefinite-length encoding requires definite-size chunks of the same major type
    InvalidStringFragment,
    /// the provided bytes were incomplete
    UnexpectedEof(WhileParsing),
    /// extra bytes were left after the top-level item
    ExtraneousData { index: usize, num_of_bytes: usize },
    /// a declared length exceeds what the remaining input could possibly hold
    OversizedItem,
    /// nesting (arrays, maps, tags) exceeded the configured ceiling
    MaxNestedLevel { limit: usize },
    /// a map key could not be used as a key (itself an array or map)
    InvalidMapKey,
    /// a map contained the same key twice under `DupMapKey::EnforcedAPF`
    DuplicateMapKey,
    /// tag 0/1/2/3 was not followed by the payload major type it requires
    InvalidTag {
        tag: u64,
        expected: &'static str,
        got: ValueKind,
    },
    /// the CBOR item's kind cannot be represented in the decode target
    UnmarshalType {
        value: ValueKind,
        target_type: &'static str,
        strct: Option<&'static str>,
        field: Option<&'static str>,
    },
    /// decode target is not a usable mutable value (e.g. unmarshal into a unit type)
    InvalidUnmarshalTarget { target_type: &'static str },
    /// encode target's kind has no CBOR representation
    UnsupportedType { target_type: &'static str },
    /// custom error raised by a hand-written ReadCbor/WriteCbor impl
    Custom(String),
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidAdditionalInfo => write!(f, "cbor: invalid additional information"),
            ErrorKind::UnexpectedBreak => write!(f, "cbor: unexpected \"break\" code"),
            ErrorKind::InvalidUtf8 => write!(f, "cbor: invalid UTF-8 string"),
            ErrorKind::InvalidStringFragment => {
                write!(f, "cbor: string fragment of wrong major type")
            }
            ErrorKind::UnexpectedEof(w) => write!(f, "cbor: ran out of bytes while parsing {:?}", w),
            ErrorKind::ExtraneousData {
                index,
                num_of_bytes,
            } => write!(
                f,
                "cbor: {} extraneous bytes starting at index {}",
                num_of_bytes, index
            ),
            ErrorKind::OversizedItem => write!(f, "cbor: length is too large"),
            ErrorKind::MaxNestedLevel { limit } => {
                write!(f, "cbor: exceeded max nested level {}", limit)
            }
            ErrorKind::InvalidMapKey => write!(f, "cbor: invalid map key type"),
            ErrorKind::DuplicateMapKey => write!(f, "cbor: duplicate map key not allowed"),
            ErrorKind::InvalidTag {
                tag,
                expected,
                got,
            } => write!(
                f,
                "cbor: tag number {} must be followed by {}, got {}",
                tag, expected, got
            ),
            ErrorKind::UnmarshalType {
                value,
                target_type,
                strct: Some(strct),
                field: Some(field),
            } => write!(
                f,
                "cbor: cannot unmarshal {} into struct field {}.{} of type {}",
                value, strct, field, target_type
            ),
            ErrorKind::UnmarshalType {
                value, target_type, ..
            } => write!(
                f,
                "cbor: cannot unmarshal {} into value of type {}",
                value, target_type
            ),
            ErrorKind::InvalidUnmarshalTarget { target_type } => {
                write!(f, "cbor: Unmarshal(non-pointer {})", target_type)
            }
            ErrorKind::UnsupportedType { target_type } => {
                write!(f, "cbor: unsupported type: {}", target_type)
            }
            ErrorKind::Custom(s) => write!(f, "cbor: {}", s),
        }
    }
}

/// Public error type returned by [`crate::from_slice`], [`crate::valid`] and
/// the stream [`crate::Decoder`]/[`crate::Encoder`] wrappers.
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    offset: usize,
    kind: ErrorKind,
}

impl Error {
    pub(crate) fn new(offset: usize, kind: ErrorKind) -> Self {
        Self { offset, kind }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    }
}

/// Internal error carrying a borrowed position within the buffer being
/// walked, rebased to an absolute offset only once at the public boundary.
///
/// Public (rather than crate-private) so derive-generated `ReadCbor` impls,
/// which live in a downstream crate, can propagate and annotate it directly
/// instead of going through the offset-only [`Error`].
pub struct InternalError<'a> {
    position: &'a [u8],
    kind: ErrorKind,
}

impl<'a> InternalError<'a> {
    pub fn new(position: &'a [u8], kind: ErrorKind) -> Self {
        Self { position, kind }
    }

    pub fn offset(&self, base: &[u8]) -> usize {
        let position = self.position as *const _ as *const u8;
        let base = base as *const _ as *const u8;
        // safety: self.position is always a subslice of base
        unsafe { position.offset_from(base) as usize }
    }

    pub fn with_location(self, loc: &'a [u8]) -> InternalError<'a> {
        InternalError {
            position: loc,
            kind: self.kind,
        }
    }

    /// Attaches struct/field context to an [`ErrorKind::UnmarshalType`],
    /// leaving other error kinds unchanged. Used by derive-generated
    /// `ReadCbor` impls so a field-level mismatch names its struct and field.
    pub fn with_struct_field(self, strct: &'static str, field: &'static str) -> InternalError<'a> {
        let kind = match self.kind {
            ErrorKind::UnmarshalType {
                value, target_type, ..
            } => ErrorKind::UnmarshalType {
                value,
                target_type,
                strct: Some(strct),
                field: Some(field),
            },
            other => other,
        };
        InternalError {
            position: self.position,
            kind,
        }
    }

    pub fn rebase(self, base: &[u8]) -> Error {
        Error {
            offset: self.offset(base),
            kind: self.kind,
        }
    }
}
