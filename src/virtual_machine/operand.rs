//! Operand kinds, their decoded forms, and the bounds-checking code reader.
//!
//! [`CodeReader`] is the only way the engine and the disassembler read
//! instruction bytes. Running out of code is a [`ATError::DecodeExhaustion`];
//! a decoded address outside its segment is a [`ATError::InvalidAddress`].

use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::function::Function;
use crate::virtual_machine::header::VALUE_SIZE;
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OperandKind {
    /// 8-byte immediate.
    Value,
    /// Data word written by the instruction.
    DestAddr,
    /// Data word holding the index of the word written.
    IndirectDestAddr,
    /// Data word holding a base index, followed by an [`OperandKind::Index`].
    IndirectDestAddrWithIndex,
    /// Data word read by the instruction.
    SrcAddr,
    /// Data word holding the index of the word read.
    IndirectSrcAddr,
    /// Data word holding a base index, followed by an [`OperandKind::Index`].
    IndirectSrcAddrWithIndex,
    /// Data word whose value is added to a preceding base index.
    Index,
    /// Absolute code address.
    CodeAddr,
    /// Signed 1-byte branch offset from the opcode's own address.
    Offset,
    /// 2-byte function code.
    Func,
}

impl OperandKind {
    /// Encoded width in bytes.
    pub const fn size(self) -> usize {
        match self {
            OperandKind::Value => 8,
            OperandKind::CodeAddr
            | OperandKind::DestAddr
            | OperandKind::IndirectDestAddr
            | OperandKind::IndirectDestAddrWithIndex
            | OperandKind::SrcAddr
            | OperandKind::IndirectSrcAddr
            | OperandKind::IndirectSrcAddrWithIndex
            | OperandKind::Index => 4,
            OperandKind::Offset => 1,
            OperandKind::Func => 2,
        }
    }

}

/// A decoded operand, for display. Data addresses carry word indexes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    Value(u64),
    DestAddr(u32),
    IndirectDestAddr(u32),
    IndirectDestAddrWithIndex(u32),
    SrcAddr(u32),
    IndirectSrcAddr(u32),
    IndirectSrcAddrWithIndex(u32),
    Index(u32),
    CodeAddr(u32),
    Offset { offset: i8, target: i64 },
    Func(Function),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Value(value) => write!(f, "#{:016x}", value),
            Operand::DestAddr(index) => write!(f, "@{:08x}", index),
            Operand::IndirectDestAddr(index) => write!(f, "@(${:08x})", index),
            Operand::IndirectDestAddrWithIndex(index) => write!(f, "@(${:08x}", index),
            Operand::SrcAddr(index) => write!(f, "${:08x}", index),
            Operand::IndirectSrcAddr(index) => write!(f, "$(${:08x})", index),
            Operand::IndirectSrcAddrWithIndex(index) => write!(f, "$(${:08x}", index),
            Operand::Index(index) => write!(f, "+ ${:08x})", index),
            Operand::CodeAddr(address) => write!(f, "[{:04x}]", address),
            Operand::Offset { offset, target } => write!(f, "PC+{:02x}=[{:04x}]", offset, target),
            Operand::Func(function) => write!(f, "{}", function),
        }
    }
}

/// Converts a word index into a byte offset of a whole word inside `data_len`.
pub fn word_offset(index: u64, data_len: usize) -> Result<usize, ATError> {
    usize::try_from(index)
        .ok()
        .and_then(|index| index.checked_mul(VALUE_SIZE))
        .filter(|offset| {
            offset
                .checked_add(VALUE_SIZE)
                .is_some_and(|end| end <= data_len)
        })
        .ok_or(ATError::InvalidAddress {
            segment: "data",
            address: index as i64,
        })
}

/// Cursor over one instruction's operand bytes.
pub struct CodeReader<'a> {
    code: &'a [u8],
    data_len: usize,
    opcode_pc: usize,
    pos: usize,
}

impl<'a> CodeReader<'a> {
    /// Starts reading operands of the instruction whose opcode is at `opcode_pc`.
    pub fn new(code: &'a [u8], data_len: usize, opcode_pc: usize) -> Self {
        Self {
            code,
            data_len,
            opcode_pc,
            pos: opcode_pc + 1,
        }
    }

    /// Offset of the next unread byte, i.e. the following instruction once all
    /// operands are consumed.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N], ATError> {
        let start = self.pos;
        let end = start.checked_add(N).filter(|&end| end <= self.code.len());
        let Some(end) = end else {
            return Err(ATError::DecodeExhaustion {
                pc: self.opcode_pc as u32,
                requested: N - self.code.len().saturating_sub(start).min(N),
            });
        };
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.code[start..end]);
        self.pos = end;
        Ok(buf)
    }

    pub fn value(&mut self) -> Result<u64, ATError> {
        Ok(u64::from_be_bytes(self.read_exact()?))
    }

    /// Reads a word index and returns its byte offset in the data segment.
    pub fn data_address(&mut self) -> Result<usize, ATError> {
        let index = u32::from_be_bytes(self.read_exact()?);
        word_offset(u64::from(index), self.data_len)
    }

    pub fn code_address(&mut self) -> Result<u32, ATError> {
        let address = u32::from_be_bytes(self.read_exact()?);
        if address as usize >= self.code.len() {
            return Err(ATError::InvalidAddress {
                segment: "code",
                address: i64::from(address),
            });
        }
        Ok(address)
    }

    /// Reads a branch offset and returns it with the jump target.
    ///
    /// The offset is validated against the byte following it, which must land
    /// inside code. The returned target is relative to the opcode and is only
    /// bounds-checked when the branch is taken.
    pub fn branch_offset(&mut self) -> Result<(i8, i64), ATError> {
        let [byte] = self.read_exact::<1>()?;
        let offset = byte as i8;
        let checked = self.pos as i64 + i64::from(offset);
        if checked < 0 || checked >= self.code.len() as i64 {
            return Err(ATError::InvalidAddress {
                segment: "branch",
                address: checked,
            });
        }
        Ok((offset, self.opcode_pc as i64 + i64::from(offset)))
    }

    pub fn function(&mut self) -> Result<Function, ATError> {
        Function::from_code(u16::from_be_bytes(self.read_exact()?))
    }

    /// Reads one operand of the given kind for display.
    pub fn operand(&mut self, kind: OperandKind) -> Result<Operand, ATError> {
        let index = |offset: usize| (offset / VALUE_SIZE) as u32;
        Ok(match kind {
            OperandKind::Value => Operand::Value(self.value()?),
            OperandKind::DestAddr => Operand::DestAddr(index(self.data_address()?)),
            OperandKind::IndirectDestAddr => Operand::IndirectDestAddr(index(self.data_address()?)),
            OperandKind::IndirectDestAddrWithIndex => {
                Operand::IndirectDestAddrWithIndex(index(self.data_address()?))
            }
            OperandKind::SrcAddr => Operand::SrcAddr(index(self.data_address()?)),
            OperandKind::IndirectSrcAddr => Operand::IndirectSrcAddr(index(self.data_address()?)),
            OperandKind::IndirectSrcAddrWithIndex => {
                Operand::IndirectSrcAddrWithIndex(index(self.data_address()?))
            }
            OperandKind::Index => Operand::Index(index(self.data_address()?)),
            OperandKind::CodeAddr => Operand::CodeAddr(self.code_address()?),
            OperandKind::Offset => {
                let (offset, target) = self.branch_offset()?;
                Operand::Offset { offset, target }
            }
            OperandKind::Func => Operand::Func(self.function()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::function::FunctionCode;

    #[test]
    fn word_offset_bounds() {
        assert_eq!(word_offset(0, 16).unwrap(), 0);
        assert_eq!(word_offset(1, 16).unwrap(), 8);
        assert!(word_offset(2, 16).is_err());
        assert!(word_offset(0, 7).is_err());
        assert!(word_offset(u64::MAX, 16).is_err());
    }

    #[test]
    fn reads_big_endian_operands() {
        let code = [0x01, 0x00, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0x12, 0x34];
        let mut reader = CodeReader::new(&code, 16, 0);
        assert_eq!(reader.data_address().unwrap(), 8);
        assert_eq!(reader.value().unwrap(), 0x1234);
        assert_eq!(reader.position(), code.len());
    }

    #[test]
    fn exhaustion_is_distinct_from_bad_address() {
        let code = [0x01, 0x00, 0x00];
        let mut reader = CodeReader::new(&code, 16, 0);
        assert_eq!(
            reader.data_address(),
            Err(ATError::DecodeExhaustion { pc: 0, requested: 2 })
        );

        let code = [0x03, 0x00, 0x00, 0x00, 0x02];
        let mut reader = CodeReader::new(&code, 16, 0);
        assert_eq!(
            reader.data_address(),
            Err(ATError::InvalidAddress {
                segment: "data",
                address: 2
            })
        );
    }

    #[test]
    fn branch_target_is_relative_to_opcode() {
        // NOP NOP BZR $0 -2
        let code = [0x7f, 0x7f, 0x1b, 0, 0, 0, 0, 0xfe];
        let mut reader = CodeReader::new(&code, 8, 2);
        reader.data_address().unwrap();
        assert_eq!(reader.branch_offset().unwrap(), (-2, 0));
    }

    #[test]
    fn backward_offset_is_checked_from_following_byte() {
        // BZR $0 -6 lands on the opcode; -7 lands before code
        let code = [0x1b, 0, 0, 0, 0, 0xfa];
        let mut reader = CodeReader::new(&code, 8, 0);
        reader.data_address().unwrap();
        assert_eq!(reader.branch_offset().unwrap(), (-6, -6));

        let code = [0x1b, 0, 0, 0, 0, 0xf9];
        let mut reader = CodeReader::new(&code, 8, 0);
        reader.data_address().unwrap();
        assert_eq!(
            reader.branch_offset(),
            Err(ATError::InvalidAddress {
                segment: "branch",
                address: -1
            })
        );
    }

    #[test]
    fn forward_offset_is_checked_from_following_byte() {
        // BZR $0 +0 in 6 bytes points one past the end
        let code = [0x1b, 0, 0, 0, 0, 0x00];
        let mut reader = CodeReader::new(&code, 8, 0);
        reader.data_address().unwrap();
        assert_eq!(
            reader.branch_offset(),
            Err(ATError::InvalidAddress {
                segment: "branch",
                address: 6
            })
        );

        let code = [0x1b, 0, 0, 0, 0, 0x00, 0x28];
        let mut reader = CodeReader::new(&code, 8, 0);
        reader.data_address().unwrap();
        assert_eq!(reader.branch_offset().unwrap(), (0, 0));
    }

    #[test]
    fn code_address_must_be_inside_code() {
        let code = [0x1a, 0, 0, 0, 0x05];
        assert!(CodeReader::new(&code, 0, 0).code_address().is_err());
        let code = [0x1a, 0, 0, 0, 0x04];
        assert_eq!(CodeReader::new(&code, 0, 0).code_address().unwrap(), 4);
    }

    #[test]
    fn operand_display() {
        let code = [0x33, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01];
        let mut reader = CodeReader::new(&code, 16, 0);
        let func = reader.operand(OperandKind::Func).unwrap();
        let src = reader.operand(OperandKind::SrcAddr).unwrap();
        assert_eq!(func, Operand::Func(Function::Known(FunctionCode::Echo)));
        assert_eq!(format!("{} {}", func, src), "\"ECHO\"{0001} $00000001");

        assert_eq!(Operand::Value(0x2a).to_string(), "#000000000000002a");
        assert_eq!(Operand::IndirectDestAddr(3).to_string(), "@($00000003)");
        assert_eq!(
            format!(
                "{} {}",
                Operand::IndirectSrcAddrWithIndex(1),
                Operand::Index(2)
            ),
            "$($00000001 + $00000002)"
        );
        assert_eq!(
            Operand::Offset { offset: -2, target: 0x10 }.to_string(),
            "PC+fe=[0010]"
        );
    }
}
