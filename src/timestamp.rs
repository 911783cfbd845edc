//! Timestamp values (tag 0/1, §6): decodes from an RFC3339 text string or an
//! epoch number, encodes as either depending on [`EncOptions::time_rfc3339`].
//!
//! Grounded on the teacher's `value/timestamp.rs` `Timestamp` (`from_string`/
//! `from_epoch`), reused here for decode; the teacher only ever decodes a
//! timestamp out of an already-parsed tagged item, so the `Timestamp ->
//! CBOR` encode direction has no teacher precedent and was built fresh.

use crate::constants::{LIT_NULL, MAJOR_LIT, TAG_EPOCH, TAG_ISO8601};
use crate::decode::{DecCtx, ReadCbor};
use crate::encode::{write_negative, write_positive, write_str, write_tag, EncOptions, WriteCbor};
use crate::error::{ErrorKind, InternalError, ValueKind};
use crate::value::Value;

/// A point in time: seconds since the Unix epoch, a sub-second nanosecond
/// remainder, and (when known) the timezone offset an RFC3339 string should
/// be rendered in.
///
/// [`Timestamp::default`] is the "zero" timestamp, which this type treats as
/// "no time set": it decodes from CBOR null/undefined and encodes back to
/// null, the same erase-on-null convention the container `ReadCbor` impls
/// use (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    unix_epoch: i64,
    nanos: u32,
    tz_sec_east: i32,
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::ZERO
    }
}

impl Timestamp {
    /// The zero value: encodes as CBOR null, decodes from CBOR null.
    pub const ZERO: Timestamp = Timestamp {
        unix_epoch: i64::MIN,
        nanos: 0,
        tz_sec_east: 0,
    };

    pub fn new(unix_epoch: i64, nanos: u32, tz_sec_east: i32) -> Self {
        Self {
            unix_epoch,
            nanos,
            tz_sec_east,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Timestamp::ZERO
    }

    /// timestamp value in seconds since the Unix epoch
    pub fn unix_epoch(&self) -> i64 {
        self.unix_epoch
    }

    /// fractional part in nanoseconds, to be added
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// timezone to use when encoding as a string, in seconds to the east
    pub fn tz_sec_east(&self) -> i32 {
        self.tz_sec_east
    }

    #[cfg(feature = "rfc3339")]
    fn from_rfc3339(s: &str) -> Option<Timestamp> {
        chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| Timestamp {
            unix_epoch: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
            tz_sec_east: dt.offset().local_minus_utc(),
        })
    }

    #[cfg(feature = "rfc3339")]
    fn to_rfc3339(self) -> String {
        use chrono::{FixedOffset, TimeZone};
        FixedOffset::east(self.tz_sec_east)
            .timestamp(self.unix_epoch, self.nanos)
            .to_rfc3339()
    }
}

fn value_kind(v: &Value) -> ValueKind {
    match v {
        Value::Integer(i) if *i < 0 => ValueKind::NegativeInteger,
        Value::Integer(_) => ValueKind::PositiveInteger,
        Value::Float(_) => ValueKind::FloatingPoint,
        Value::Bytes(_) => ValueKind::ByteString,
        Value::Text(_) => ValueKind::TextString,
        Value::Array(_) => ValueKind::Array,
        Value::Map(_) => ValueKind::Map,
        Value::Tagged(..) => ValueKind::Tag,
        Value::Bool(_) | Value::Null | Value::Undefined => ValueKind::Primitive,
    }
}

impl ReadCbor for Timestamp {
    fn read_cbor<'a>(bytes: &'a [u8], ctx: &mut DecCtx) -> Result<(Self, &'a [u8]), InternalError<'a>> {
        let (value, rest) = Value::read_cbor(bytes, ctx)?;
        let timestamp = match &value {
            Value::Null | Value::Undefined => Timestamp::ZERO,
            #[cfg(feature = "rfc3339")]
            Value::Text(s) => Timestamp::from_rfc3339(s).ok_or_else(|| {
                InternalError::new(
                    bytes,
                    ErrorKind::UnmarshalType {
                        value: ValueKind::TextString,
                        target_type: "Timestamp",
                        strct: None,
                        field: None,
                    },
                )
            })?,
            Value::Integer(i) => Timestamp {
                unix_epoch: (*i).clamp(i64::MIN as i128, i64::MAX as i128) as i64,
                nanos: 0,
                tz_sec_east: 0,
            },
            Value::Float(f) => Timestamp {
                unix_epoch: f.floor().clamp(i64::MIN as f64, i64::MAX as f64) as i64,
                nanos: ((f - f.floor()) * 1e9).round() as u32,
                tz_sec_east: 0,
            },
            other => {
                return Err(InternalError::new(
                    bytes,
                    ErrorKind::UnmarshalType {
                        value: value_kind(other),
                        target_type: "Timestamp",
                        strct: None,
                        field: None,
                    },
                ))
            }
        };
        Ok((timestamp, rest))
    }
}

impl WriteCbor for Timestamp {
    fn write_cbor(&self, out: &mut Vec<u8>, opts: &EncOptions) {
        if self.is_zero() {
            out.push(MAJOR_LIT << 5 | LIT_NULL);
            return;
        }
        #[cfg(feature = "rfc3339")]
        if opts.time_rfc3339 {
            write_tag(out, TAG_ISO8601);
            write_str(out, &self.to_rfc3339());
            return;
        }
        let _ = opts;
        write_tag(out, TAG_EPOCH);
        if self.nanos == 0 {
            if self.unix_epoch >= 0 {
                write_positive(out, self.unix_epoch as u64);
            } else {
                write_negative(out, (-1i128 - self.unix_epoch as i128) as u64);
            }
        } else {
            let seconds = self.unix_epoch as f64 + self.nanos as f64 / 1e9;
            crate::encode::write_float(out, seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{from_slice, DecOptions};
    use crate::encode::to_vec;

    #[test]
    fn zero_round_trips_through_null() {
        let bytes = to_vec(&Timestamp::ZERO, &EncOptions::default());
        assert_eq!(bytes, vec![0xf6]);
        let back: Timestamp = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(back, Timestamp::ZERO);
    }

    #[test]
    fn whole_second_epoch_encodes_as_tagged_integer() {
        let ts = Timestamp::new(1_000_000, 0, 0);
        let bytes = to_vec(&ts, &EncOptions::default());
        // tag(1) 1000000
        assert_eq!(bytes, vec![0xc1, 0x1a, 0x00, 0x0f, 0x42, 0x40]);
        let back: Timestamp = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn negative_epoch_round_trips() {
        let ts = Timestamp::new(-1, 0, 0);
        let bytes = to_vec(&ts, &EncOptions::default());
        let back: Timestamp = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn fractional_epoch_decodes_from_float() {
        // tag(1) 1.5
        let bytes = vec![0xc1, 0xf9, 0x3e, 0x00];
        let ts: Timestamp = from_slice(&bytes, &DecOptions::default()).unwrap();
        assert_eq!(ts.unix_epoch(), 1);
        assert_eq!(ts.nanos(), 500_000_000);
    }
}
