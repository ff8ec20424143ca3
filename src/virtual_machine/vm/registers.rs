use crate::virtual_machine::header::{REGISTER_SIZE, VALUE_SIZE};
use at_derive::BinaryCodec;
use std::fmt;

/// One of the two 256-bit scratch registers, A or B.
///
/// Viewed either as 32 opaque bytes (hashes, addresses, messages) or as four
/// 64-bit words, word 0 being A1/B1. Byte form is the big-endian words in
/// order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, BinaryCodec)]
pub struct Register(pub [u64; 4]);

impl Register {
    pub const ZERO: Register = Register([0; 4]);

    pub fn from_be_bytes(bytes: &[u8; REGISTER_SIZE]) -> Self {
        let mut words = [0u64; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(VALUE_SIZE)) {
            let mut buf = [0u8; VALUE_SIZE];
            buf.copy_from_slice(chunk);
            *word = u64::from_be_bytes(buf);
        }
        Register(words)
    }

    /// Copies `bytes` into the front of a zeroed register, truncating past 32 bytes.
    pub fn from_prefix(bytes: &[u8]) -> Self {
        let mut buf = [0u8; REGISTER_SIZE];
        let len = bytes.len().min(REGISTER_SIZE);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self::from_be_bytes(&buf)
    }

    pub fn to_be_bytes(&self) -> [u8; REGISTER_SIZE] {
        let mut out = [0u8; REGISTER_SIZE];
        for (chunk, word) in out.chunks_exact_mut(VALUE_SIZE).zip(self.0) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Word `index` (0..4); A1 is word 0.
    pub fn word(&self, index: usize) -> u64 {
        self.0[index]
    }

    pub fn set_word(&mut self, index: usize, value: u64) {
        self.0[index] = value;
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    pub fn zip_with(self, other: Register, op: impl Fn(u64, u64) -> u64) -> Register {
        let mut words = self.0;
        for (word, rhs) in words.iter_mut().zip(other.0) {
            *word = op(*word, rhs);
        }
        Register(words)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_be_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn byte_view_is_big_endian_words() {
        let reg = Register([1, 0x0203, 0, u64::MAX]);
        let bytes = reg.to_be_bytes();
        assert_eq!(bytes[7], 1);
        assert_eq!(&bytes[14..16], &[2, 3]);
        assert_eq!(&bytes[24..], &[0xff; 8]);
        assert_eq!(Register::from_be_bytes(&bytes), reg);
    }

    #[test]
    fn prefix_is_zero_padded() {
        let reg = Register::from_prefix(b"AT");
        assert_eq!(reg.word(0), 0x4154_0000_0000_0000);
        assert_eq!(&reg.0[1..], &[0, 0, 0]);
    }

    #[test]
    fn codec_matches_byte_view() {
        let reg = Register([5, 6, 7, 8]);
        let encoded = Encode::to_bytes(&reg);
        assert_eq!(encoded, reg.to_be_bytes().to_vec());
        assert_eq!(Register::from_bytes(&encoded).unwrap(), reg);
    }

    #[test]
    fn words_and_zero() {
        let mut reg = Register::ZERO;
        assert!(reg.is_zero());
        reg.set_word(3, 9);
        assert_eq!(reg.word(3), 9);
        assert!(!reg.is_zero());
        assert_eq!(
            reg.zip_with(Register([1, 1, 1, 1]), |a, b| a ^ b),
            Register([1, 1, 1, 8])
        );
    }

    #[test]
    fn display_is_hex() {
        let shown = Register([0xab, 0, 0, 0]).to_string();
        assert_eq!(shown.len(), 64);
        assert!(shown.starts_with("00000000000000ab"));
    }
}
