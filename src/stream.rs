//! Stream Wrappers (component F): framing adapters over `std::io::Read`/
//! `std::io::Write` built on top of the Well-Formedness Walker and the
//! Encoder/Decoder Core, so callers working with sockets or files don't have
//! to buffer a whole message themselves.

use std::io::{self, Read, Write};

use crate::decode::{DecCtx, DecOptions, ReadCbor};
use crate::encode::{EncOptions, WriteCbor};
use crate::error::Error;
use crate::wf::valid_with_max_depth;

/// Wraps a [`Write`]r, encoding one item per call to [`Encoder::encode`].
pub struct Encoder<W> {
    writer: W,
    opts: EncOptions,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W, opts: EncOptions) -> Self {
        Self { writer, opts }
    }

    pub fn encode<T: WriteCbor + ?Sized>(&mut self, value: &T) -> io::Result<()> {
        let mut buf = Vec::new();
        value.write_cbor(&mut buf, &self.opts);
        self.writer.write_all(&buf)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Wraps a [`Read`]er, pulling exactly one well-formed item per call to
/// [`Decoder::decode`] and tracking total bytes consumed.
pub struct Decoder<R> {
    reader: R,
    opts: DecOptions,
    num_bytes_read: u64,
    // Bytes read from `reader` but not yet consumed by a decode call; reading
    // one CBOR item at a time from an arbitrary `Read` means we must be able
    // to read ahead without knowing the item length up front.
    buf: Vec<u8>,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R, opts: DecOptions) -> Self {
        Self {
            reader,
            opts,
            num_bytes_read: 0,
            buf: Vec::new(),
        }
    }

    pub fn num_bytes_read(&self) -> u64 {
        self.num_bytes_read
    }

    /// Reads and decodes one CBOR item, growing the internal buffer from the
    /// underlying reader as needed until a full well-formed item is present.
    pub fn decode<T: ReadCbor>(&mut self) -> Result<T, Error> {
        loop {
            match valid_with_max_depth(&self.buf, self.opts.max_nested_levels) {
                Ok(rest) => {
                    let consumed = self.buf.len() - rest.len();
                    let mut ctx = DecCtx::new(&self.opts);
                    let (value, leftover) =
                        T::read_cbor(&self.buf[..consumed], &mut ctx).map_err(|e| e.rebase(&self.buf))?;
                    debug_assert!(leftover.is_empty());
                    self.num_bytes_read += consumed as u64;
                    self.buf.drain(..consumed);
                    return Ok(value);
                }
                Err(_) => {
                    let mut chunk = [0u8; 4096];
                    let n = self.reader.read(&mut chunk).map_err(|e| {
                        Error::new(
                            self.num_bytes_read as usize,
                            crate::error::ErrorKind::Custom(e.to_string()),
                        )
                    })?;
                    if n == 0 {
                        return Err(Error::new(
                            self.num_bytes_read as usize,
                            crate::error::ErrorKind::UnexpectedEof(crate::error::WhileParsing::ItemHeader),
                        ));
                    }
                    self.buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_round_trip_counts_bytes() {
        let mut buf = Vec::new();
        {
            let mut enc = Encoder::new(&mut buf, EncOptions::default());
            enc.encode(&1u64).unwrap();
            enc.encode(&2u64).unwrap();
        }
        let mut dec = Decoder::new(buf.as_slice(), DecOptions::default());
        let a: u64 = dec.decode().unwrap();
        let b: u64 = dec.decode().unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(dec.num_bytes_read(), 2);
    }
}
