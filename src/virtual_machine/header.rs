//! Fixed-size machine header and segment geometry.
//!
//! The header is written once at deployment and never changes. It fixes the
//! capacity of every segment, so all later bounds checks derive from it.

use crate::types::encoding::Decode;
use crate::virtual_machine::errors::ATError;
use at_derive::BinaryCodec;

/// Only header version understood by this machine.
pub const SUPPORTED_VERSION: u16 = 2;
/// Encoded header size in bytes.
pub const HEADER_LENGTH: usize = 20;
/// Size of one code page (an opcode byte).
pub const OPCODE_SIZE: usize = 1;
/// Size of one data word, and of one user-stack entry.
pub const VALUE_SIZE: usize = 8;
/// Size of one call-stack entry.
pub const ADDRESS_SIZE: usize = 4;
/// Size of each of the A and B registers.
pub const REGISTER_SIZE: usize = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, BinaryCodec)]
pub struct Header {
    pub version: u16,
    pub reserved: u16,
    pub code_pages: u16,
    pub data_pages: u16,
    pub call_stack_pages: u16,
    pub user_stack_pages: u16,
    pub min_activation_amount: u64,
}

impl Header {
    pub const fn new(
        code_pages: u16,
        data_pages: u16,
        call_stack_pages: u16,
        user_stack_pages: u16,
        min_activation_amount: u64,
    ) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            reserved: 0,
            code_pages,
            data_pages,
            call_stack_pages,
            user_stack_pages,
            min_activation_amount,
        }
    }

    /// Decodes and validates a header from the front of `input`.
    pub fn read(input: &mut &[u8]) -> Result<Self, ATError> {
        let header = Header::decode(input)
            .map_err(|err| ATError::InvalidHeader(err.to_string()))?;
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<(), ATError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ATError::InvalidHeader(format!(
                "unsupported version {}",
                self.version
            )));
        }
        Ok(())
    }

    pub const fn code_len(&self) -> usize {
        self.code_pages as usize * OPCODE_SIZE
    }

    pub const fn data_len(&self) -> usize {
        self.data_pages as usize * VALUE_SIZE
    }

    pub const fn call_stack_len(&self) -> usize {
        self.call_stack_pages as usize * ADDRESS_SIZE
    }

    pub const fn user_stack_len(&self) -> usize {
        self.user_stack_pages as usize * VALUE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Encode;

    fn sample() -> Header {
        Header::new(0x0200, 0x0200, 0x0010, 0x0010, 0)
    }

    #[test]
    fn layout_is_big_endian_and_fixed() {
        let bytes = Header::new(0x0102, 3, 4, 5, 0x0a0b).to_bytes();
        assert_eq!(bytes.len(), HEADER_LENGTH);
        assert_eq!(
            bytes,
            [0, 2, 0, 0, 1, 2, 0, 3, 0, 4, 0, 5, 0, 0, 0, 0, 0, 0, 0x0a, 0x0b]
        );
    }

    #[test]
    fn read_consumes_exactly_one_header() {
        let header = sample();
        let mut bytes = header.to_bytes();
        bytes.push(0x28);
        let mut input = &bytes[..];
        assert_eq!(Header::read(&mut input).unwrap(), header);
        assert_eq!(input, [0x28]);
    }

    #[test]
    fn segment_lengths() {
        let header = sample();
        assert_eq!(header.code_len(), 0x200);
        assert_eq!(header.data_len(), 0x1000);
        assert_eq!(header.call_stack_len(), 0x40);
        assert_eq!(header.user_stack_len(), 0x80);
    }

    #[test]
    fn rejects_other_versions() {
        let mut header = sample();
        header.version = 1;
        assert!(matches!(
            Header::read(&mut &header.to_bytes()[..]),
            Err(ATError::InvalidHeader(_))
        ));
    }

    #[test]
    fn rejects_short_input() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            Header::read(&mut &bytes[..12]),
            Err(ATError::InvalidHeader(_))
        ));
    }
}
