//! Human-readable listings of AT code, for auditing.

use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::isa::OpCode;
use crate::virtual_machine::operand::{CodeReader, OperandKind};

/// Lists `code` one instruction per line as `pppp: MNEMONIC operands`.
///
/// Operands are checked exactly as the engine would check them against a
/// data segment of `data_len` bytes. A run of zero bytes reaching the end of
/// `code` is capacity padding and ends the listing.
pub fn disassemble(code: &[u8], data_len: usize) -> Result<String, ATError> {
    let mut listing = String::new();
    let mut pc = 0;

    while pc < code.len() {
        if code[pc..].iter().all(|&byte| byte == 0) {
            break;
        }

        let byte = code[pc];
        let opcode = OpCode::try_from(byte).map_err(|_| ATError::InvalidOpCode {
            opcode: byte,
            pc: pc as u32,
        })?;

        let mut reader = CodeReader::new(code, data_len, pc);
        let mut line = format!("{pc:04x}: {}", opcode.mnemonic());
        for (i, &kind) in opcode.operands().iter().enumerate() {
            let operand = reader.operand(kind)?;
            let separator = match (i, kind) {
                (0, _) => " ",
                (_, OperandKind::Index) => " ",
                _ => ", ",
            };
            line.push_str(separator);
            line.push_str(&operand.to_string());
        }
        listing.push_str(&line);
        listing.push('\n');

        pc = reader.position();
    }
    Ok(listing)
}
