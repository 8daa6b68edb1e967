//! Byte cursor and length-prefixed encoding helpers for TLS structures.
//!
//! Every length read from the wire is checked against the bytes that are
//! actually left before anything is sliced.

use crate::error::{Error, Result};

/// Read cursor over an encoded structure.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumed byte count.
    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn take(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(Error::Decode("length exceeds remaining bytes"));
        }

        let bytes = &self.data[self.offset..self.offset + length];
        self.offset += length;

        Ok(bytes)
    }

    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn u24(&mut self) -> Result<usize> {
        let [a, b, c] = self.take_array()?;
        Ok(((a as usize) << 16) | ((b as usize) << 8) | c as usize)
    }

    /// Opaque vector with a one byte length prefix.
    pub fn vec8(&mut self) -> Result<&'a [u8]> {
        let length = self.u8()? as usize;
        self.take(length)
    }

    /// Opaque vector with a two byte length prefix.
    pub fn vec16(&mut self) -> Result<&'a [u8]> {
        let length = self.u16()? as usize;
        self.take(length)
    }

    /// Opaque vector with a three byte length prefix.
    pub fn vec24(&mut self) -> Result<&'a [u8]> {
        let length = self.u24()?;
        self.take(length)
    }

    /// Fails unless the whole input was consumed.
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Decode("trailing bytes after structure"))
        }
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u24(out: &mut Vec<u8>, value: usize) {
    debug_assert!(value < 1 << 24);
    out.extend_from_slice(&(value as u32).to_be_bytes()[1..]);
}

/// Writes `body` behind a big-endian length prefix of `width` bytes (1, 2 or 3).
pub(crate) fn put_prefixed(out: &mut Vec<u8>, width: usize, body: impl FnOnce(&mut Vec<u8>)) {
    let start = out.len();
    out.resize(start + width, 0);
    body(out);

    let length = out.len() - start - width;
    debug_assert!(length < 1 << (8 * width));

    let bytes = (length as u32).to_be_bytes();
    out[start..start + width].copy_from_slice(&bytes[4 - width..]);
}

pub(crate) fn put_vec8(out: &mut Vec<u8>, bytes: &[u8]) {
    put_prefixed(out, 1, |out| out.extend_from_slice(bytes));
}

pub(crate) fn put_vec16(out: &mut Vec<u8>, bytes: &[u8]) {
    put_prefixed(out, 2, |out| out.extend_from_slice(bytes));
}

pub(crate) fn put_vec24(out: &mut Vec<u8>, bytes: &[u8]) {
    put_prefixed(out, 3, |out| out.extend_from_slice(bytes));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_are_bounded_by_input() {
        let mut reader = Reader::new(&[0x00, 0x05, 1, 2, 3]);
        assert!(reader.vec16().is_err());

        let mut reader = Reader::new(&[0x02, 9, 8, 7]);
        assert_eq!(reader.vec8().unwrap(), &[9, 8]);
        assert_eq!(reader.remaining(), 1);
        assert!(reader.finish().is_err());
        assert_eq!(reader.u8().unwrap(), 7);
        assert!(reader.finish().is_ok());
        assert!(reader.u8().is_err());
    }

    #[test]
    fn prefixes_are_backpatched() {
        let mut out = vec![0xaa];
        put_prefixed(&mut out, 3, |out| {
            put_u16(out, 0x0102);
            put_vec8(out, b"xy");
        });

        assert_eq!(out, [0xaa, 0, 0, 5, 1, 2, 2, b'x', b'y']);

        let mut reader = Reader::new(&out[1..]);
        let mut body = Reader::new(reader.vec24().unwrap());
        assert_eq!(body.u16().unwrap(), 0x0102);
        assert_eq!(body.vec8().unwrap(), b"xy");
    }
}
