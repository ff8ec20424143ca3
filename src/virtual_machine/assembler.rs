//! Code generation for AT bytecode.
//!
//! [`OpCode::compile`] encodes a single instruction from loosely typed
//! arguments, narrowing each one to its operand width. [`Assembler`] strings
//! instructions together and resolves labels for jumps and branches once
//! the whole program is known.
//!
//! ```ignore
//! let mut asm = Assembler::new();
//! asm.emit(OpCode::SetVal, &[Arg::Int(0), Arg::Int(10)])?;
//! asm.label("loop")?;
//! asm.emit(OpCode::DecDat, &[Arg::Int(0)])?;
//! asm.emit(OpCode::BnzDat, &[Arg::Int(0), "loop".into()])?;
//! asm.emit(OpCode::FinImd, &[])?;
//! let code = asm.finish()?;
//! ```
//!
//! Every failure here is a [`ATError::CompilationError`].

use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::function::{FunctionCode, PLATFORM_FUNCTIONS};
use crate::virtual_machine::isa::OpCode;
use crate::virtual_machine::operand::OperandKind;
use std::collections::HashMap;

/// One instruction argument, before narrowing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    /// Value, word index, code address or relative branch offset.
    Int(i64),
    Func(FunctionCode),
    /// Raw code in the platform-specific range.
    PlatformFunc(u16),
    /// Code address or branch target, resolved by [`Assembler::finish`].
    Label(String),
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<FunctionCode> for Arg {
    fn from(code: FunctionCode) -> Self {
        Arg::Func(code)
    }
}

impl From<&str> for Arg {
    fn from(label: &str) -> Self {
        Arg::Label(label.to_string())
    }
}

fn narrow<T: TryFrom<i64>>(opcode: OpCode, kind: OperandKind, value: i64) -> Result<T, ATError> {
    T::try_from(value).map_err(|_| {
        ATError::compile(format!(
            "{value} does not fit a {kind:?} operand of {}",
            opcode.mnemonic()
        ))
    })
}

/// Encodes `opcode` with `args`. Labels are passed to `on_label` with the
/// operand's offset from the start of the instruction; a zero placeholder is
/// written in their place.
fn encode_instruction(
    opcode: OpCode,
    args: &[Arg],
    mut on_label: impl FnMut(usize, OperandKind, &str) -> Result<(), ATError>,
) -> Result<Vec<u8>, ATError> {
    let kinds = opcode.operands();
    if kinds.len() != args.len() {
        return Err(ATError::compile(format!(
            "{} takes {} operand(s), got {}",
            opcode.mnemonic(),
            kinds.len(),
            args.len()
        )));
    }

    let mut out = Vec::with_capacity(opcode.size());
    out.push(opcode.value());
    for (&kind, arg) in kinds.iter().zip(args) {
        match (kind, arg) {
            (OperandKind::CodeAddr | OperandKind::Offset, Arg::Label(label)) => {
                on_label(out.len(), kind, label)?;
                out.resize(out.len() + kind.size(), 0);
            }
            (OperandKind::Value, Arg::Int(value)) => out.extend_from_slice(&value.to_be_bytes()),
            (OperandKind::Offset, Arg::Int(offset)) => {
                out.push(narrow::<i8>(opcode, kind, *offset)? as u8)
            }
            (OperandKind::Func, Arg::Func(code)) => {
                code.check_signature(opcode)
                    .map_err(|err| ATError::compile(err.to_string()))?;
                out.extend_from_slice(&code.value().to_be_bytes());
            }
            (OperandKind::Func, Arg::PlatformFunc(code)) => {
                if !PLATFORM_FUNCTIONS.contains(code) {
                    return Err(ATError::compile(format!(
                        "{code:#06x} is not a platform-specific function code"
                    )));
                }
                out.extend_from_slice(&code.to_be_bytes());
            }
            (kind, Arg::Int(value)) if kind != OperandKind::Func => {
                out.extend_from_slice(&narrow::<u32>(opcode, kind, *value)?.to_be_bytes())
            }
            (kind, arg) => {
                return Err(ATError::compile(format!(
                    "{arg:?} cannot be used as a {kind:?} operand of {}",
                    opcode.mnemonic()
                )))
            }
        }
    }
    Ok(out)
}

impl OpCode {
    /// Encodes this opcode and its operands.
    pub fn compile(self, args: &[Arg]) -> Result<Vec<u8>, ATError> {
        encode_instruction(self, args, |_, _, label| {
            Err(ATError::compile(format!(
                "label {label} needs an Assembler to resolve"
            )))
        })
    }
}

#[derive(Clone, Debug)]
struct Fixup {
    /// Where the operand bytes live.
    at: usize,
    /// Start of the instruction, the base for branch offsets.
    opcode_pc: usize,
    kind: OperandKind,
    label: String,
}

/// Label-aware instruction emitter.
#[derive(Clone, Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the next emitted instruction.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Defines `name` at the current position.
    pub fn label(&mut self, name: impl Into<String>) -> Result<&mut Self, ATError> {
        let name = name.into();
        if self.labels.contains_key(&name) {
            return Err(ATError::compile(format!("duplicate label {name}")));
        }
        self.labels.insert(name, self.code.len());
        Ok(self)
    }

    pub fn emit(&mut self, opcode: OpCode, args: &[Arg]) -> Result<&mut Self, ATError> {
        let opcode_pc = self.code.len();
        let fixups = &mut self.fixups;
        let bytes = encode_instruction(opcode, args, |offset, kind, label| {
            fixups.push(Fixup {
                at: opcode_pc + offset,
                opcode_pc,
                kind,
                label: label.to_string(),
            });
            Ok(())
        })?;
        self.code.extend_from_slice(&bytes);
        Ok(self)
    }

    /// Appends raw bytes, e.g. deliberately malformed code.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Resolves every label reference and returns the code.
    pub fn finish(mut self) -> Result<Vec<u8>, ATError> {
        for fixup in &self.fixups {
            let target = *self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| ATError::compile(format!("undefined label {}", fixup.label)))?;
            match fixup.kind {
                OperandKind::CodeAddr => {
                    let address = u32::try_from(target)
                        .map_err(|_| ATError::compile(format!("label {} out of range", fixup.label)))?;
                    self.code[fixup.at..fixup.at + 4].copy_from_slice(&address.to_be_bytes());
                }
                _ => {
                    let offset = i8::try_from(target as i64 - fixup.opcode_pc as i64).map_err(|_| {
                        ATError::compile(format!(
                            "label {} is too far from the branch at {:#06x}",
                            fixup.label, fixup.opcode_pc
                        ))
                    })?;
                    self.code[fixup.at] = offset as u8;
                }
            }
        }
        Ok(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_set_val() {
        let code = OpCode::SetVal.compile(&[Arg::Int(3), Arg::Int(0x0102)]).unwrap();
        assert_eq!(code, [0x01, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    }

    #[test]
    fn compile_negative_value_is_twos_complement() {
        let code = OpCode::SetVal.compile(&[Arg::Int(0), Arg::Int(-1)]).unwrap();
        assert_eq!(&code[5..], &[0xff; 8]);
    }

    #[test]
    fn compile_rejects_unnarrowable_operands() {
        let err = OpCode::SetDat.compile(&[Arg::Int(-1), Arg::Int(0)]).unwrap_err();
        assert!(matches!(err, ATError::CompilationError(_)));

        let err = OpCode::JmpAdr.compile(&[Arg::Int(1 << 32)]).unwrap_err();
        assert!(matches!(err, ATError::CompilationError(_)));

        let err = OpCode::BzrDat.compile(&[Arg::Int(0), Arg::Int(128)]).unwrap_err();
        assert!(matches!(err, ATError::CompilationError(_)));
    }

    #[test]
    fn compile_rejects_wrong_argument_count() {
        let err = OpCode::AddDat.compile(&[Arg::Int(0)]).unwrap_err();
        assert!(matches!(err, ATError::CompilationError(_)));
    }

    #[test]
    fn compile_checks_function_signature() {
        let ok = OpCode::ExtFunRet
            .compile(&[FunctionCode::GetCurrentBalance.into(), Arg::Int(0)])
            .unwrap();
        assert_eq!(ok, [0x35, 0x04, 0x00, 0, 0, 0, 0]);

        let err = OpCode::ExtFun
            .compile(&[FunctionCode::GetCurrentBalance.into()])
            .unwrap_err();
        assert!(matches!(err, ATError::CompilationError(_)));
    }

    #[test]
    fn compile_platform_functions() {
        let ok = OpCode::ExtFunDat
            .compile(&[Arg::PlatformFunc(0x0501), Arg::Int(0)])
            .unwrap();
        assert_eq!(&ok[..3], &[0x33, 0x05, 0x01]);

        let err = OpCode::ExtFun.compile(&[Arg::PlatformFunc(0x0001)]).unwrap_err();
        assert!(matches!(err, ATError::CompilationError(_)));
    }

    #[test]
    fn compile_rejects_labels() {
        let err = OpCode::JmpAdr.compile(&["start".into()]).unwrap_err();
        assert!(matches!(err, ATError::CompilationError(_)));
    }

    #[test]
    fn assembler_resolves_forward_and_backward_labels() {
        let mut asm = Assembler::new();
        asm.label("top").unwrap();
        asm.emit(OpCode::BzrDat, &[Arg::Int(0), "end".into()]).unwrap();
        asm.emit(OpCode::JmpAdr, &["top".into()]).unwrap();
        asm.label("end").unwrap();
        asm.emit(OpCode::FinImd, &[]).unwrap();
        let code = asm.finish().unwrap();

        // BZR_DAT(6) JMP_ADR(5) FIN_IMD(1)
        assert_eq!(code.len(), 12);
        assert_eq!(code[5], 11);
        assert_eq!(&code[6..11], &[0x1a, 0, 0, 0, 0]);
        assert_eq!(code[11], 0x28);
    }

    #[test]
    fn assembler_rejects_duplicate_and_undefined_labels() {
        let mut asm = Assembler::new();
        asm.label("a").unwrap();
        assert!(matches!(asm.label("a"), Err(ATError::CompilationError(_))));

        let mut asm = Assembler::new();
        asm.emit(OpCode::JmpAdr, &["nowhere".into()]).unwrap();
        assert!(matches!(asm.finish(), Err(ATError::CompilationError(_))));
    }

    #[test]
    fn raw_bytes_pass_through() {
        let mut asm = Assembler::new();
        asm.raw(&[0xdd]);
        assert_eq!(asm.position(), 1);
        asm.emit(OpCode::FinImd, &[]).unwrap();
        assert_eq!(asm.finish().unwrap(), [0xdd, 0x28]);
    }

    #[test]
    fn assembler_rejects_far_branches() {
        let mut asm = Assembler::new();
        asm.emit(OpCode::BzrDat, &[Arg::Int(0), "far".into()]).unwrap();
        for _ in 0..200 {
            asm.emit(OpCode::Nop, &[]).unwrap();
        }
        asm.label("far").unwrap();
        assert!(matches!(asm.finish(), Err(ATError::CompilationError(_))));
    }
}
