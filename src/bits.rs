//! Immutable bit strings
//!
//! `Bits` is the key and path material of the merbinner tree. Bits are
//! packed MSB-first into a shared byte buffer with an explicit bit length;
//! the unused low bits of a trailing partial byte are never compared, hashed
//! or serialized. Prefix views and concatenation with an empty operand share
//! the existing buffer instead of copying it.

use crate::ser::{Codec, Decoder, Encoder};
use crate::{Error, Result};
use bytes::Bytes;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Bound, Not, RangeBounds};
use std::str::FromStr;

/// Immutable array of bits
#[derive(Clone, Default)]
pub struct Bits {
    buf: Bytes,
    len: usize,
}

impl Bits {
    /// The empty bit string
    pub fn new() -> Self {
        Bits::default()
    }

    /// Create bits from a buffer and an explicit length in bits
    ///
    /// The buffer is reused, not copied.
    pub fn from_bytes(buf: impl Into<Bytes>, len: usize) -> Result<Self> {
        let buf = buf.into();
        if buf.len() * 8 < len {
            return Err(Error::ValueOutOfRange(format!(
                "length {} longer than the {} bits in buffer",
                len,
                buf.len() * 8
            )));
        }
        if len == 0 {
            return Ok(Bits::new());
        }
        Ok(Bits { buf, len })
    }

    /// Every bit of a byte buffer
    pub fn from_whole_bytes(buf: impl Into<Bytes>) -> Self {
        let buf = buf.into();
        let len = buf.len() * 8;
        if len == 0 {
            return Bits::new();
        }
        Bits { buf, len }
    }

    /// Build bits from an iterator of truthy values
    pub fn from_bits<I, B>(bits: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Truthy>,
    {
        let mut buf = Vec::new();
        let mut byte = 0u8;
        let mut len = 0usize;
        for bit in bits {
            if bit.into().0 {
                byte |= 0x80 >> (len % 8);
            }
            len += 1;
            if len % 8 == 0 {
                buf.push(byte);
                byte = 0;
            }
        }
        if len % 8 != 0 {
            buf.push(byte);
        }
        if len == 0 {
            return Bits::new();
        }
        Bits {
            buf: Bytes::from(buf),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read a bit; negative indices count from the end
    pub fn get(&self, idx: isize) -> Result<bool> {
        let resolved = if idx < 0 {
            self.len as isize + idx
        } else {
            idx
        };
        if resolved < 0 || resolved as usize >= self.len {
            return Err(Error::IndexOutOfRange {
                index: idx as i64,
                length: self.len as u64,
            });
        }
        Ok(self.bit(resolved as usize))
    }

    /// Read a bit known to be in range
    pub(crate) fn bit(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        (self.buf[idx / 8] >> (7 - idx % 8)) & 1 == 1
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            bits: self,
            front: 0,
            back: self.len,
        }
    }

    /// Contiguous sub-range; bounds past the end are clamped
    ///
    /// Slices starting at bit zero share this buffer.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Bits {
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(self.len);
        let stop = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => self.len,
        }
        .min(self.len);

        if stop <= start {
            return Bits::new();
        }
        if start == 0 {
            if stop == self.len {
                return self.clone();
            }
            return Bits {
                buf: self.buf.clone(),
                len: stop,
            };
        }
        Bits::from_bits((start..stop).map(|i| self.bit(i)))
    }

    /// Concatenate two bit strings
    ///
    /// If either side is empty the other is returned as-is, sharing its
    /// buffer.
    pub fn concat(&self, rhs: &Bits) -> Bits {
        if self.is_empty() {
            return rhs.clone();
        }
        if rhs.is_empty() {
            return self.clone();
        }

        let offset = self.len % 8;
        let rhs_bytes = &rhs.buf[..byte_len(rhs.len)];
        let mut buf = Vec::with_capacity(byte_len(self.len + rhs.len) + 1);
        buf.extend_from_slice(self.full_width_prefix());

        if offset == 0 {
            buf.extend_from_slice(rhs_bytes);
        } else {
            // Each rhs byte straddles two output bytes
            let mut tail = self.tail_bits();
            for &byte in rhs_bytes {
                buf.push(tail | (byte >> offset));
                tail = byte << (8 - offset);
            }
            buf.push(tail);
        }

        Bits {
            buf: Bytes::from(buf),
            len: self.len + rhs.len,
        }
    }

    /// True if `prefix` is a leading sub-range of `self`
    pub fn starts_with(&self, prefix: &Bits) -> bool {
        match prefix.len.cmp(&self.len) {
            Ordering::Greater => false,
            Ordering::Equal => prefix == self,
            Ordering::Less => &self.slice(..prefix.len) == prefix,
        }
    }

    /// Longest bit string that is a prefix of both
    pub fn common_prefix(&self, other: &Bits) -> Bits {
        let (lhs, rhs) = if self.len <= other.len {
            (self, other)
        } else {
            (other, self)
        };

        let full_bytes = lhs.len / 8;
        let mut common = lhs.buf[..full_bytes]
            .iter()
            .zip(&rhs.buf[..full_bytes])
            .position(|(a, b)| a != b)
            .map_or(full_bytes * 8, |i| i * 8);

        if common < lhs.len {
            let mut diff = lhs.buf[common / 8] ^ rhs.buf[common / 8];
            while common < lhs.len && diff & 0x80 == 0 {
                diff <<= 1;
                common += 1;
            }
        }

        if common == lhs.len {
            lhs.clone()
        } else {
            Bits {
                buf: lhs.buf.clone(),
                len: common,
            }
        }
    }

    /// True if both share the same backing buffer
    pub fn shares_buffer(&self, other: &Bits) -> bool {
        self.buf.as_ptr() == other.buf.as_ptr()
    }

    /// Bytes that are fully covered by the bit length
    fn full_width_prefix(&self) -> &[u8] {
        &self.buf[..self.len / 8]
    }

    /// Trailing partial byte with its unused bits masked to zero
    fn tail_bits(&self) -> u8 {
        let odd = self.len % 8;
        if odd == 0 {
            0
        } else {
            self.buf[self.len / 8] & (0xffu8 << (8 - odd))
        }
    }
}

fn byte_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// A bit-like value accepted by [`Bits::from_bits`]
pub struct Truthy(bool);

impl From<bool> for Truthy {
    fn from(b: bool) -> Self {
        Truthy(b)
    }
}

macro_rules! impl_truthy_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Truthy {
                fn from(v: $ty) -> Self {
                    Truthy(v != 0)
                }
            }
        )*
    };
}

impl_truthy_int!(u8, u32, i32, u64, usize);

impl FromIterator<bool> for Bits {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Bits::from_bits(iter)
    }
}

impl FromStr for Bits {
    type Err = Error;

    /// Parse a string of `0` and `1` characters
    fn from_str(s: &str) -> Result<Self> {
        s.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(Error::ValueOutOfRange(format!(
                    "invalid bit character {:?}",
                    other
                ))),
            })
            .collect::<Result<Vec<bool>>>()
            .map(Bits::from_bits)
    }
}

impl PartialEq for Bits {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self.full_width_prefix() == other.full_width_prefix()
            && self.tail_bits() == other.tail_bits()
    }
}

impl Eq for Bits {}

impl Ord for Bits {
    fn cmp(&self, other: &Self) -> Ordering {
        self.full_width_prefix()
            .cmp(other.full_width_prefix())
            .then_with(|| self.tail_bits().cmp(&other.tail_bits()))
            .then_with(|| self.len.cmp(&other.len))
    }
}

impl PartialOrd for Bits {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Bits {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.len, state);
        std::hash::Hash::hash(self.full_width_prefix(), state);
        std::hash::Hash::hash(&self.tail_bits(), state);
    }
}

impl Add<&Bits> for &Bits {
    type Output = Bits;

    fn add(self, rhs: &Bits) -> Bits {
        self.concat(rhs)
    }
}

impl Add for Bits {
    type Output = Bits;

    fn add(self, rhs: Bits) -> Bits {
        self.concat(&rhs)
    }
}

impl Not for &Bits {
    type Output = Bits;

    fn not(self) -> Bits {
        if self.is_empty() {
            return self.clone();
        }
        // Unused tail bits end up as garbage, which is fine
        let inverted: Vec<u8> = self.buf[..byte_len(self.len)].iter().map(|b| !b).collect();
        Bits {
            buf: Bytes::from(inverted),
            len: self.len,
        }
    }
}

impl Not for Bits {
    type Output = Bits;

    fn not(self) -> Bits {
        !&self
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bits({})", self)
    }
}

impl Codec for Bits {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_varuint(self.len as u64);
        enc.write_bytes(self.full_width_prefix());
        if self.len % 8 != 0 {
            enc.write_bytes(&[self.tail_bits()]);
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let len = usize::try_from(dec.read_varuint()?)
            .map_err(|_| Error::Malformed("bit length does not fit in memory".into()))?;
        let bytes = dec.read_bytes(byte_len(len))?;
        let bits = Bits::from_bytes(Bytes::copy_from_slice(bytes), len)?;
        if let Some(&last) = bytes.last() {
            if len % 8 != 0 && last != bits.tail_bits() {
                return Err(Error::Malformed(format!(
                    "unused tail bits set in {:#04x}",
                    last
                )));
            }
        }
        Ok(bits)
    }
}

/// Iterator over the bits of a [`Bits`]
pub struct Iter<'a> {
    bits: &'a Bits,
    front: usize,
    back: usize,
}

impl Iterator for Iter<'_> {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.front == self.back {
            return None;
        }
        let bit = self.bits.bit(self.front);
        self.front += 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<bool> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        Some(self.bits.bit(self.back))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a Bits {
    type Item = bool;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bits {
        s.parse().unwrap()
    }

    fn to_vec(bits: &Bits) -> Vec<bool> {
        bits.iter().collect()
    }

    #[test]
    fn test_len() {
        assert_eq!(Bits::new().len(), 0);
        assert_eq!(Bits::from_bits([0u8]).len(), 1);
        assert_eq!(Bits::from_bits([0u8; 8]).len(), 8);
        assert_eq!(Bits::from_bits([0u8; 17]).len(), 17);
    }

    #[test]
    fn test_iter() {
        let bits = Bits::from_bits([0, 1, 1, 0, 1, 0, 0, 1, 1]);
        assert_eq!(
            to_vec(&bits),
            vec![false, true, true, false, true, false, false, true, true]
        );
        assert_eq!(bits.to_string(), "011010011");
        assert_eq!(bits.iter().rev().next(), Some(true));
    }

    #[test]
    fn test_packing_is_msb_first() {
        assert_eq!(b("10000000").serialize(), vec![0x08, 0x80]);
        assert_eq!(b("101").serialize(), vec![0x03, 0xa0]);
    }

    #[test]
    fn test_get_with_negative_index() {
        assert!(!b("0").get(0).unwrap());
        assert!(b("1").get(-1).unwrap());
        assert!(!b("01").get(-2).unwrap());
        assert!(!b("111111110").get(8).unwrap());
        assert!(!b("111111110").get(-1).unwrap());

        let long = Bits::from_bits((0..256).map(|i| i != 255));
        assert!(!long.get(255).unwrap());
        assert!(!long.get(-1).unwrap());
    }

    #[test]
    fn test_get_out_of_range() {
        assert_eq!(
            Bits::new().get(0),
            Err(Error::IndexOutOfRange {
                index: 0,
                length: 0
            })
        );
        assert!(b("01").get(2).is_err());
        assert!(b("01").get(-3).is_err());
    }

    #[test]
    fn test_from_bytes() {
        let bits = Bits::from_bytes(vec![0xf0], 4).unwrap();
        assert_eq!(bits, b("1111"));

        assert!(matches!(
            Bits::from_bytes(vec![0xff], 9),
            Err(Error::ValueOutOfRange(_))
        ));
        assert!(Bits::from_bytes(Vec::new(), 0).unwrap().is_empty());

        let whole = Bits::from_whole_bytes(vec![0x0f, 0x80]);
        assert_eq!(whole, b("0000111110000000"));
        assert!(Bits::from_whole_bytes(Vec::new()).is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "012".parse::<Bits>(),
            Err(Error::ValueOutOfRange(_))
        ));
    }

    #[test]
    fn test_equality_ignores_unused_bits() {
        let a = Bits::from_bytes(vec![0b1010_0000], 3).unwrap();
        let c = Bits::from_bytes(vec![0b1011_1111], 3).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b("1010"));
        assert_ne!(b("0"), b("00"));
    }

    #[test]
    fn test_hash_matches_equality() {
        use std::collections::HashSet;

        let a = Bits::from_bytes(vec![0b1010_0000, 0xff], 11).unwrap();
        let c = Bits::from_bytes(vec![0b1010_0000, 0xe0], 11).unwrap();
        let set: HashSet<Bits> = [a, c, b("1010"), b("0"), b("00")].into_iter().collect();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_ordering() {
        assert!(b("0") < b("1"));
        assert!(b("01") < b("10"));
        assert!(b("00000000") < b("00000001"));
        assert!(b("0") < b("00"));
        assert_eq!(b("101").cmp(&b("101")), Ordering::Equal);
    }

    #[test]
    fn test_slice_shares_prefix() {
        let bits = b("1011001110");
        let head = bits.slice(..4);
        assert_eq!(head, b("1011"));
        assert!(head.shares_buffer(&bits));

        let whole = bits.slice(..);
        assert!(whole.shares_buffer(&bits));
        assert_eq!(whole, bits);

        let mid = bits.slice(2..6);
        assert_eq!(mid, b("1100"));
        assert!(!mid.shares_buffer(&bits));

        assert!(bits.slice(..0).is_empty());
        assert_eq!(bits.slice(8..100), b("10"));
    }

    #[test]
    fn test_concat() {
        assert_eq!(&b("1") + &b("0"), b("10"));
        assert_eq!(&b("1111111") + &b("01"), b("111111101"));
        assert_eq!(&b("10101010") + &b("11"), b("1010101011"));
        assert_eq!(
            &b("101") + &b("1100110011"),
            b("1011100110011")
        );
    }

    #[test]
    fn test_concat_with_empty_is_by_reference() {
        let a = b("1101");
        let empty = Bits::new();
        assert!((&a + &empty).shares_buffer(&a));
        assert!((&empty + &a).shares_buffer(&a));
    }

    #[test]
    fn test_invert() {
        assert_eq!(!&b("1010"), b("0101"));
        assert_eq!(!&b("111111110"), b("000000001"));
        assert!((!&Bits::new()).is_empty());
        assert_eq!(!!b("10011"), b("10011"));
    }

    #[test]
    fn test_starts_with() {
        let bits = b("1011");
        assert!(bits.starts_with(&Bits::new()));
        assert!(bits.starts_with(&b("10")));
        assert!(bits.starts_with(&b("1011")));
        assert!(!bits.starts_with(&b("10110")));
        assert!(!bits.starts_with(&b("11")));
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(b("1011").common_prefix(&b("1001")), b("10"));
        assert_eq!(b("10").common_prefix(&b("1011")), b("10"));
        assert!(b("0").common_prefix(&b("1")).is_empty());
        assert_eq!(
            b("111111110000").common_prefix(&b("111111111")),
            b("11111111")
        );

        // A full match hands back the shorter operand itself
        let short = b("110");
        assert!(short.common_prefix(&b("1101")).shares_buffer(&short));
    }

    #[test]
    fn test_serialization() {
        assert_eq!(Bits::new().serialize(), vec![0x00]);
        assert_eq!(b("1").serialize(), vec![0x01, 0x80]);
        assert_eq!(b("11111111").serialize(), vec![0x08, 0xff]);
        assert_eq!(b("111111111").serialize(), vec![0x09, 0xff, 0x80]);

        let bits = b("1100101011");
        assert_eq!(Bits::deserialize(&bits.serialize()).unwrap(), bits);
    }

    #[test]
    fn test_serialization_masks_tail() {
        let bits = Bits::from_bytes(vec![0xff], 3).unwrap();
        assert_eq!(bits.serialize(), vec![0x03, 0xe0]);
    }

    #[test]
    fn test_deserialize_rejects_dirty_tail() {
        assert!(matches!(
            Bits::deserialize(&[0x03, 0xe1]),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            Bits::deserialize(&[0x09, 0xff]),
            Err(Error::Truncated { .. })
        ));
    }
}
