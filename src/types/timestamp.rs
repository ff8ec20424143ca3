//! Packed block timestamps.
//!
//! A timestamp identifies a point on the chain as a block height plus a
//! transaction sequence number within that block. Machines see it as a
//! single `u64` with the height in the upper 32 bits, so plain integer
//! comparison orders timestamps chronologically.

use at_derive::BinaryCodec;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub struct Timestamp {
    pub block_height: u32,
    pub transaction_sequence: u32,
}

impl Timestamp {
    pub const fn new(block_height: u32, transaction_sequence: u32) -> Self {
        Self {
            block_height,
            transaction_sequence,
        }
    }

    /// Packs into the 64-bit form stored in data words.
    pub const fn to_u64(self) -> u64 {
        ((self.block_height as u64) << 32) | self.transaction_sequence as u64
    }

    pub const fn from_u64(packed: u64) -> Self {
        Self {
            block_height: (packed >> 32) as u32,
            transaction_sequence: packed as u32,
        }
    }
}

impl From<u64> for Timestamp {
    fn from(packed: u64) -> Self {
        Self::from_u64(packed)
    }
}

impl From<Timestamp> for u64 {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.to_u64()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_height, self.transaction_sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn packs_height_into_upper_half() {
        let ts = Timestamp::new(10, 3);
        assert_eq!(ts.to_u64(), 0x0000_000a_0000_0003);
        assert_eq!(Timestamp::from(0x0000_000a_0000_0003u64), ts);
    }

    #[test]
    fn numeric_order_matches_chain_order() {
        let earlier = Timestamp::new(9, 0xffff_ffff);
        let later = Timestamp::new(10, 0);
        assert!(earlier < later);
        assert!(earlier.to_u64() < later.to_u64());
        assert!(Timestamp::new(10, 1).to_u64() > later.to_u64());
    }

    #[test]
    fn encodes_like_packed_word() {
        let ts = Timestamp::new(0x0102_0304, 0x0506_0708);
        assert_eq!(ts.to_bytes(), ts.to_u64().to_bytes());
        assert_eq!(Timestamp::from_bytes(&ts.to_bytes()).unwrap(), ts);
    }

    #[test]
    fn display_shows_both_parts() {
        assert_eq!(Timestamp::new(8, 2).to_string(), "8:2");
    }
}
