//! Big-endian field access and the on-wire key representation.

use crate::error::{CodecError, Result};
use overlay_core::SortKey;
use std::fmt;

/// Forward-only reader over a byte buffer.
///
/// Every read checks the remaining length and reports the offset it failed at.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at the beginning of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Whether everything has been read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if len > available {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Consume a fixed-size array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// Consume one byte.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    /// Consume one signed byte.
    pub fn i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.array()?))
    }

    /// Consume a big-endian `u16`.
    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    /// Consume a big-endian 24-bit unsigned integer.
    pub fn u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    /// Consume a big-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }
}

pub(crate) fn put_u24(out: &mut Vec<u8>, field: &'static str, value: u32) -> Result<()> {
    if value > 0x00ff_ffff {
        return Err(CodecError::FieldOverflow {
            field,
            value: value.into(),
        });
    }
    out.extend_from_slice(&value.to_be_bytes()[1..]);
    Ok(())
}

/// A key as stored on the wire: whole seconds plus a signed millisecond offset.
///
/// Ordering is by `(base, offset)`, which agrees with [`SortKey`] ordering for every key whose
/// offset did not saturate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WireKey {
    /// Coarse timestamp in seconds.
    pub base: u32,
    /// Fine offset in milliseconds.
    pub offset: i8,
}

impl WireKey {
    /// Encoded size in bytes.
    pub const SIZE: usize = 5;

    /// Split `key` at the nearest second. Offsets beyond `i8` saturate.
    pub fn from_key(key: SortKey) -> Result<Self> {
        let base = u32::try_from(key.dt()).map_err(|_| CodecError::KeyOutOfRange { key })?;
        let offset = key.offset().clamp(i8::MIN.into(), i8::MAX.into()) as i8;
        Ok(Self { base, offset })
    }

    /// Key in milliseconds.
    pub fn to_key(self) -> SortKey {
        SortKey::from_parts(self.base.into(), self.offset.into())
    }

    /// Read a key from `input`.
    pub fn read(input: &mut ByteReader<'_>) -> Result<Self> {
        let base = input.u32()?;
        let offset = input.i8()?;
        Ok(Self { base, offset })
    }

    /// Append the encoded key to `out`.
    pub fn write(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.base.to_be_bytes());
        out.extend_from_slice(&self.offset.to_be_bytes());
    }
}

impl fmt::Display for WireKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:+})", self.base, self.offset)
    }
}
