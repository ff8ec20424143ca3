//! Binary encoding and decoding traits for machine images.
//!
//! Everything the machine persists (headers, state bytes, creation bytes)
//! goes through these traits. All integers are big-endian and fixed-width so
//! that images are bit-identical on every node.
//!
//! # Binary Format
//!
//! - Integers: big-endian, fixed-width
//! - Arrays `[T; N]`: elements serialized sequentially without length prefix
//!
//! Variable-length sections (data segment, stacks) are framed explicitly by
//! their owners, so no generic `Vec<T>` codec is provided.
//!
//! # Example
//!
//! ```ignore
//! use crate::types::encoding::{Encode, Decode};
//!
//! let bytes = 0x0102u16.to_bytes();
//! assert_eq!(bytes, [0x01, 0x02]);
//! assert_eq!(u16::from_bytes(&bytes).unwrap(), 0x0102);
//! ```

use at_derive::Error;

/// Sink for writing encoded bytes.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

/// Counter for computing encoded size without allocating memory.
///
/// Used by `Encode::to_bytes` to pre-allocate exact capacity before encoding.
#[derive(Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of bytes counted.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Trait for types that can be serialized to binary format.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes to a new byte buffer with exact capacity.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before expected data was read.
    #[error("unexpected end of input: needed {needed} more bytes")]
    UnexpectedEof { needed: usize },
    /// Bytes remained after the value was fully decoded.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

/// Trait for types that can be deserialized from binary format.
pub trait Decode: Sized {
    /// Reads and decodes a value from the input buffer.
    ///
    /// Advances the input slice past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value from a byte slice, requiring all bytes to be consumed.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;

        if !input.is_empty() {
            return Err(DecodeError::TrailingBytes(input.len()));
        }

        Ok(value)
    }
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof {
            needed: n - input.len(),
        });
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_be_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    let bytes = read_bytes(input, std::mem::size_of::<$t>())?;
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    Ok(<$t>::from_be_bytes(buf))
                }
            }
        )*
    };
}

impl_int!(u8, u16, u32, u64, i64);

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode + Copy + Default, const N: usize> Decode for [T; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut array = [T::default(); N];
        for slot in array.iter_mut() {
            *slot = T::decode(input)?;
        }
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counter_accumulates() {
        let mut counter = SizeCounter::new();
        assert!(counter.is_empty());

        counter.write(&[1, 2, 3]);
        counter.write(&[4, 5]);
        assert_eq!(counter.len(), 5);
    }

    #[test]
    fn u32_big_endian() {
        let bytes = 0x12345678u32.to_bytes();
        assert_eq!(bytes, [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(bytes.capacity(), bytes.len());
        assert_eq!(u32::from_bytes(&bytes).unwrap(), 0x12345678);
    }

    #[test]
    fn i64_negative_values() {
        let bytes = (-2i64).to_bytes();
        assert_eq!(bytes, [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(i64::from_bytes(&bytes).unwrap(), -2);
    }

    #[test]
    fn array_has_no_length_prefix() {
        let words: [u64; 2] = [1, 0x0200];
        let bytes = words.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[7], 1);
        assert_eq!(bytes[14], 2);
        assert_eq!(<[u64; 2]>::from_bytes(&bytes).unwrap(), words);
    }

    #[test]
    fn unexpected_eof_reports_shortfall() {
        assert_eq!(
            u32::from_bytes(&[0x12, 0x34]),
            Err(DecodeError::UnexpectedEof { needed: 2 })
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert_eq!(
            u8::from_bytes(&[42, 0xff, 0xff]),
            Err(DecodeError::TrailingBytes(2))
        );
    }

    #[test]
    fn decode_advances_input() {
        let mut input: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05];

        assert_eq!(u8::decode(&mut input).unwrap(), 0x01);
        assert_eq!(u16::decode(&mut input).unwrap(), 0x0203);
        assert_eq!(input, &[0x04, 0x05]);
    }

    #[test]
    fn read_bytes_splits_input() {
        let mut input: &[u8] = &[9, 8, 7];
        assert_eq!(read_bytes(&mut input, 2).unwrap(), &[9, 8]);
        assert_eq!(input, &[7]);
    }
}
