//! Low-level export data primitives.
//!
//! All integers in a section are unsigned LEB128 varints, the same encoding
//! protobuf uses, so the varint routines come from `prost::encoding`. On top
//! of that this module provides length-checked byte runs, the arbitrary
//! precision integer encoding ("mpint") and the tag constants shared by the
//! decoder and encoder.
//!
//! ## mpint
//!
//! A uvarint header `(len << 1) | negative` followed by `len` big-endian
//! magnitude bytes. Zero has length 0 and is never negative; the magnitude
//! has no leading zero bytes.

use crate::error::{Error, Result};
use crate::model::Integer;
use bytes::{BufMut, Bytes, BytesMut};
use prost::encoding::{decode_varint, encode_varint};

/// Structural type tags
pub(crate) mod type_tag {
    pub(crate) const POINTER: u8 = 1;
    pub(crate) const SLICE: u8 = 2;
    pub(crate) const ARRAY: u8 = 3;
    pub(crate) const MAP: u8 = 4;
    pub(crate) const CHAN: u8 = 5;
    pub(crate) const SIGNATURE: u8 = 6;
    pub(crate) const STRUCT: u8 = 7;
    pub(crate) const INTERFACE: u8 = 8;
}

/// Member tags
pub(crate) mod member_tag {
    pub(crate) const CONST: u8 = b'C';
    pub(crate) const FUNC: u8 = b'F';
    pub(crate) const VAR: u8 = b'V';
    pub(crate) const ALIAS: u8 = b'A';
}

/// Constant value kinds
pub(crate) mod const_kind {
    pub(crate) const BOOL: u8 = 0;
    pub(crate) const STRING: u8 = 1;
    pub(crate) const INT: u8 = 2;
    pub(crate) const FLOAT: u8 = 3;
    pub(crate) const COMPLEX: u8 = 4;
}

/// Cursor over a section with offset tracking for error reports
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            buf: data,
            total: data.len(),
        }
    }

    /// Offset of the next unread byte from the start of the section
    pub(crate) fn offset(&self) -> u64 {
        (self.total - self.buf.len()) as u64
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn error(&self, details: impl Into<String>) -> Error {
        Error::format(self.offset(), details)
    }

    pub(crate) fn uvarint(&mut self, what: &str) -> Result<u64> {
        let offset = self.offset();
        if self.buf.is_empty() {
            return Err(Error::format(offset, format!("unexpected end of data reading {what}")));
        }
        decode_varint(&mut self.buf)
            .map_err(|_| Error::format(offset, format!("truncated or overlong varint reading {what}")))
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        match self.buf.split_first() {
            Some((&b, rest)) => {
                self.buf = rest;
                Ok(b)
            }
            None => Err(self.error(format!("unexpected end of data reading {what}"))),
        }
    }

    pub(crate) fn bool(&mut self, what: &str) -> Result<bool> {
        let offset = self.offset();
        match self.u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(Error::format(offset, format!("invalid boolean {b} for {what}"))),
        }
    }

    pub(crate) fn bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(self.error(format!(
                "{what} needs {n} bytes, only {} left",
                self.buf.len()
            )));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    /// Reads an element count, rejecting counts that cannot fit in the rest
    /// of the section (every element takes at least one byte).
    pub(crate) fn count(&mut self, what: &str) -> Result<usize> {
        let offset = self.offset();
        let n = self.uvarint(what)?;
        if n > self.buf.len() as u64 {
            return Err(Error::format(
                offset,
                format!("{what} count {n} exceeds the {} remaining bytes", self.buf.len()),
            ));
        }
        Ok(n as usize)
    }

    /// Reads a uvarint that must fit in `u32`
    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        let offset = self.offset();
        let v = self.uvarint(what)?;
        u32::try_from(v).map_err(|_| Error::format(offset, format!("{what} {v} out of range")))
    }

    pub(crate) fn mpint(&mut self, what: &str) -> Result<Integer> {
        let offset = self.offset();
        let header = self.uvarint(what)?;
        let negative = header & 1 == 1;
        let len = usize::try_from(header >> 1)
            .map_err(|_| Error::format(offset, format!("{what} length out of range")))?;
        let magnitude = self.bytes(len, what)?;
        if magnitude.first() == Some(&0) || (negative && magnitude.is_empty()) {
            return Err(Error::format(offset, format!("non-canonical integer for {what}")));
        }
        Ok(Integer::from_parts(negative, magnitude.to_vec()))
    }
}

/// Append-only section buffer
#[derive(Debug, Default)]
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn uvarint(&mut self, v: u64) {
        encode_varint(v, &mut self.buf);
    }

    pub(crate) fn u8(&mut self, b: u8) {
        self.buf.put_u8(b);
    }

    pub(crate) fn bool(&mut self, b: bool) {
        self.buf.put_u8(u8::from(b));
    }

    pub(crate) fn bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub(crate) fn len_prefixed(&mut self, data: &[u8]) {
        self.uvarint(data.len() as u64);
        self.bytes(data);
    }

    pub(crate) fn mpint(&mut self, value: &Integer) {
        let magnitude = value.magnitude();
        self.uvarint(((magnitude.len() as u64) << 1) | u64::from(value.is_negative()));
        self.bytes(magnitude);
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}
