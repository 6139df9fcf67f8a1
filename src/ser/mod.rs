//! Wire encoding primitives
//!
//! Everything that crosses the serialization boundary is built from four
//! primitives: a boolean flag (`0x00` / `0xff`), an unsigned LEB128 varuint,
//! fixed-length raw bytes, and nested objects encoded through their own
//! [`Codec`] implementation. Decoding is strict: truncated input, trailing
//! bytes, out-of-range integers and non-canonical varuints are all rejected.

use crate::model::Hash;
use crate::{Error, Result};
use integer_encoding::VarInt;

/// Longest LEB128 encoding of a u64
const MAX_VARUINT_LEN: usize = 10;

/// Deepest nesting of objects a decoder will follow
///
/// A merbinner tree over 256-bit keys nests at most 257 nodes deep. The
/// limit keeps recursive decoding well within a default thread stack.
pub const MAX_NESTING: usize = 300;

/// Types with a deterministic wire encoding
pub trait Codec: Sized {
    /// Append the encoding of `self`
    fn encode(&self, enc: &mut Encoder);

    /// Read a value, consuming exactly its encoding
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;

    /// Encode to a fresh byte vector
    fn serialize(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.into_bytes()
    }

    /// Decode from bytes, rejecting trailing data
    fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let value = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(value)
    }
}

/// Serialization context writing to an in-memory buffer
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { buf: Vec::new() }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(if value { 0xff } else { 0x00 });
    }

    pub fn write_varuint(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.encode_var_vec());
    }

    /// Write fixed-length bytes (no length prefix)
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a nested object
    pub fn write<T: Codec>(&mut self, value: &T) {
        value.encode(self);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Deserialization context reading from a byte slice
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_bytes(1)?[0] {
            0x00 => Ok(false),
            0xff => Ok(true),
            other => Err(Error::Malformed(format!("invalid bool byte {:#04x}", other))),
        }
    }

    pub fn read_varuint(&mut self) -> Result<u64> {
        let rest = &self.buf[self.pos..];
        let len = match rest.iter().position(|b| b & 0x80 == 0) {
            Some(i) => i + 1,
            None if rest.len() >= MAX_VARUINT_LEN => {
                return Err(Error::Malformed("varuint longer than 10 bytes".into()))
            }
            None => {
                return Err(Error::Truncated {
                    needed: rest.len() + 1,
                    available: rest.len(),
                })
            }
        };

        if len > MAX_VARUINT_LEN || (len == MAX_VARUINT_LEN && rest[len - 1] > 1) {
            return Err(Error::Malformed("varuint overflows u64".into()));
        }

        let (value, consumed) = u64::decode_var(&rest[..len])
            .ok_or_else(|| Error::Malformed("invalid varuint".into()))?;
        if consumed != len || value.required_space() != len {
            return Err(Error::Malformed("non-canonical varuint".into()));
        }

        self.pos += len;
        Ok(value)
    }

    /// Read fixed-length bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    /// Read a nested object
    pub fn read<T: Codec>(&mut self) -> Result<T> {
        T::decode(self)
    }

    /// Run `f` one nesting level deeper
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(Error::Malformed(format!(
                "objects nested deeper than {}",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Check that the whole input was consumed
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::Malformed(format!(
                "{} trailing bytes after value",
                self.remaining()
            )));
        }
        Ok(())
    }
}

impl Codec for bool {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_bool(*self);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_bool()
    }
}

macro_rules! impl_uint_codec {
    ($($ty:ty),*) => {
        $(
            impl Codec for $ty {
                fn encode(&self, enc: &mut Encoder) {
                    enc.write_varuint(u64::from(*self));
                }

                fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
                    let value = dec.read_varuint()?;
                    <$ty>::try_from(value).map_err(|_| {
                        Error::Malformed(format!(
                            "integer {} out of range for {}",
                            value,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

impl_uint_codec!(u8, u16, u32, u64);

impl<const N: usize> Codec for [u8; N] {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_bytes(self);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_array()
    }
}

impl Codec for Hash {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_bytes(self.as_bytes());
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Hash::from_bytes(dec.read_array()?))
    }
}
