//! Instruction set definitions (header version 2).
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical opcode table and feeds it to a callback macro, so the engine,
//! the code generator and the disassembler all derive from one list.
//!
//! This module generates:
//! - The [`OpCode`] enum with its byte values
//! - `TryFrom<u8>` for decoding opcodes
//! - Mnemonics, default step costs and operand layouts
//!
//! # Bytecode Format
//!
//! Every instruction is a 1-byte opcode followed by fixed-width big-endian
//! operands:
//! - Value: 8 bytes
//! - Data address (word index): 4 bytes
//! - Code address: 4 bytes
//! - Branch offset: 1 signed byte, relative to the opcode's own address
//! - Function code: 2 bytes

use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::operand::OperandKind;

/// Invokes a callback macro with the complete opcode table.
///
/// Each entry is `Name = byte, "MNEMONIC" => [field: Kind, ...], steps`
/// where `Kind` names an [`OperandKind`] variant.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Data moves
            // =========================
            /// NOP ; no operation
            Nop = 0x7f, "NOP" => [], 1,
            /// SET_VAL @addr, #value ; @addr = value
            SetVal = 0x01, "SET_VAL" => [dest: DestAddr, value: Value], 1,
            /// SET_DAT @addr1, $addr2 ; @addr1 = $addr2
            SetDat = 0x02, "SET_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// CLR_DAT @addr ; @addr = 0
            ClrDat = 0x03, "CLR_DAT" => [dest: DestAddr], 1,
            /// SET_IND @addr1, $($addr2) ; @addr1 = $($addr2)
            SetInd = 0x0e, "SET_IND" => [dest: DestAddr, src: IndirectSrcAddr], 1,
            /// SET_IDX @addr1, $($addr2 + $addr3) ; @addr1 = $($addr2 + $addr3)
            SetIdx = 0x0f, "SET_IDX" => [dest: DestAddr, base: IndirectSrcAddrWithIndex, index: Index], 1,
            /// IND_DAT @($addr1), $addr2 ; @($addr1) = $addr2
            IndDat = 0x14, "IND_DAT" => [dest: IndirectDestAddr, src: SrcAddr], 1,
            /// IDX_DAT @($addr1 + $addr2), $addr3 ; @($addr1 + $addr2) = $addr3
            IdxDat = 0x15, "IDX_DAT" => [base: IndirectDestAddrWithIndex, index: Index, src: SrcAddr], 1,
            // =========================
            // Arithmetic and bitwise
            // =========================
            /// INC_DAT @addr ; @addr += 1
            IncDat = 0x04, "INC_DAT" => [dest: DestAddr], 1,
            /// DEC_DAT @addr ; @addr -= 1
            DecDat = 0x05, "DEC_DAT" => [dest: DestAddr], 1,
            /// ADD_DAT @addr1, $addr2 ; @addr1 += $addr2
            AddDat = 0x06, "ADD_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// SUB_DAT @addr1, $addr2 ; @addr1 -= $addr2
            SubDat = 0x07, "SUB_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// MUL_DAT @addr1, $addr2 ; @addr1 *= $addr2
            MulDat = 0x08, "MUL_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// DIV_DAT @addr1, $addr2 ; @addr1 /= $addr2 (signed, faults on zero)
            DivDat = 0x09, "DIV_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// BOR_DAT @addr1, $addr2 ; @addr1 |= $addr2
            BorDat = 0x0a, "BOR_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// AND_DAT @addr1, $addr2 ; @addr1 &= $addr2
            AndDat = 0x0b, "AND_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// XOR_DAT @addr1, $addr2 ; @addr1 ^= $addr2
            XorDat = 0x0c, "XOR_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// NOT_DAT @addr ; @addr = !@addr
            NotDat = 0x0d, "NOT_DAT" => [dest: DestAddr], 1,
            /// MOD_DAT @addr1, $addr2 ; @addr1 %= $addr2 (signed, faults on zero)
            ModDat = 0x16, "MOD_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// SHL_DAT @addr1, $addr2 ; @addr1 <<= $addr2
            ShlDat = 0x17, "SHL_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// SHR_DAT @addr1, $addr2 ; @addr1 >>= $addr2 (logical)
            ShrDat = 0x18, "SHR_DAT" => [dest: DestAddr, src: SrcAddr], 1,
            /// ADD_VAL @addr, #value ; @addr += value
            AddVal = 0x46, "ADD_VAL" => [dest: DestAddr, value: Value], 1,
            /// SUB_VAL @addr, #value ; @addr -= value
            SubVal = 0x47, "SUB_VAL" => [dest: DestAddr, value: Value], 1,
            /// MUL_VAL @addr, #value ; @addr *= value
            MulVal = 0x48, "MUL_VAL" => [dest: DestAddr, value: Value], 1,
            /// DIV_VAL @addr, #value ; @addr /= value (signed, faults on zero)
            DivVal = 0x49, "DIV_VAL" => [dest: DestAddr, value: Value], 1,
            /// SHL_VAL @addr, #value ; @addr <<= value
            ShlVal = 0x4a, "SHL_VAL" => [dest: DestAddr, value: Value], 1,
            /// SHR_VAL @addr, #value ; @addr >>= value (logical)
            ShrVal = 0x4b, "SHR_VAL" => [dest: DestAddr, value: Value], 1,
            // =========================
            // Stacks
            // =========================
            /// PSH_DAT $addr ; push $addr onto the user stack
            PshDat = 0x10, "PSH_DAT" => [src: SrcAddr], 1,
            /// POP_DAT @addr ; pop the user stack into @addr
            PopDat = 0x11, "POP_DAT" => [dest: DestAddr], 1,
            /// JMP_SUB [addr] ; push return address, jump to addr
            JmpSub = 0x12, "JMP_SUB" => [target: CodeAddr], 1,
            /// RET_SUB ; pop return address and jump to it
            RetSub = 0x13, "RET_SUB" => [], 1,
            // =========================
            // Control flow
            // =========================
            /// JMP_ADR [addr] ; jump to addr
            JmpAdr = 0x1a, "JMP_ADR" => [target: CodeAddr], 1,
            /// BZR_DAT $addr, offset ; branch if $addr == 0
            BzrDat = 0x1b, "BZR_DAT" => [src: SrcAddr, target: Offset], 1,
            /// BNZ_DAT $addr, offset ; branch if $addr != 0
            BnzDat = 0x1e, "BNZ_DAT" => [src: SrcAddr, target: Offset], 1,
            /// BGT_DAT $addr1, $addr2, offset ; branch if $addr1 > $addr2 (signed)
            BgtDat = 0x1f, "BGT_DAT" => [lhs: SrcAddr, rhs: SrcAddr, target: Offset], 1,
            /// BLT_DAT $addr1, $addr2, offset ; branch if $addr1 < $addr2 (signed)
            BltDat = 0x20, "BLT_DAT" => [lhs: SrcAddr, rhs: SrcAddr, target: Offset], 1,
            /// BGE_DAT $addr1, $addr2, offset ; branch if $addr1 >= $addr2 (signed)
            BgeDat = 0x21, "BGE_DAT" => [lhs: SrcAddr, rhs: SrcAddr, target: Offset], 1,
            /// BLE_DAT $addr1, $addr2, offset ; branch if $addr1 <= $addr2 (signed)
            BleDat = 0x22, "BLE_DAT" => [lhs: SrcAddr, rhs: SrcAddr, target: Offset], 1,
            /// BEQ_DAT $addr1, $addr2, offset ; branch if $addr1 == $addr2
            BeqDat = 0x23, "BEQ_DAT" => [lhs: SrcAddr, rhs: SrcAddr, target: Offset], 1,
            /// BNE_DAT $addr1, $addr2, offset ; branch if $addr1 != $addr2
            BneDat = 0x24, "BNE_DAT" => [lhs: SrcAddr, rhs: SrcAddr, target: Offset], 1,
            // =========================
            // Lifecycle
            // =========================
            /// SLP_DAT $addr ; sleep until block height $addr
            SlpDat = 0x25, "SLP_DAT" => [src: SrcAddr], 1,
            /// FIZ_DAT $addr ; finish if $addr == 0
            FizDat = 0x26, "FIZ_DAT" => [src: SrcAddr], 1,
            /// STZ_DAT $addr ; stop if $addr == 0
            StzDat = 0x27, "STZ_DAT" => [src: SrcAddr], 1,
            /// FIN_IMD ; finish
            FinImd = 0x28, "FIN_IMD" => [], 1,
            /// STP_IMD ; stop, resume at the SET_PCS address next round
            StpImd = 0x29, "STP_IMD" => [], 1,
            /// SLP_IMD ; sleep until the next block
            SlpImd = 0x2a, "SLP_IMD" => [], 1,
            /// ERR_ADR [addr] ; install error handler at addr
            ErrAdr = 0x2b, "ERR_ADR" => [target: CodeAddr], 1,
            /// SLP_VAL #value ; sleep for value blocks
            SlpVal = 0x2c, "SLP_VAL" => [value: Value], 1,
            /// SET_PCS ; resume address = address after this instruction
            SetPcs = 0x30, "SET_PCS" => [], 1,
            // =========================
            // Function calls
            // =========================
            /// EXT_FUN func ; func()
            ExtFun = 0x32, "EXT_FUN" => [func: Func], 10,
            /// EXT_FUN_DAT func, $addr ; func($addr)
            ExtFunDat = 0x33, "EXT_FUN_DAT" => [func: Func, arg1: SrcAddr], 10,
            /// EXT_FUN_DAT_2 func, $addr1, $addr2 ; func($addr1, $addr2)
            ExtFunDat2 = 0x34, "EXT_FUN_DAT_2" => [func: Func, arg1: SrcAddr, arg2: SrcAddr], 10,
            /// EXT_FUN_RET func, @addr ; @addr = func()
            ExtFunRet = 0x35, "EXT_FUN_RET" => [func: Func, dest: DestAddr], 10,
            /// EXT_FUN_RET_DAT func, @addr1, $addr2 ; @addr1 = func($addr2)
            ExtFunRetDat = 0x36, "EXT_FUN_RET_DAT" => [func: Func, dest: DestAddr, arg1: SrcAddr], 10,
            /// EXT_FUN_RET_DAT_2 func, @addr1, $addr2, $addr3 ; @addr1 = func($addr2, $addr3)
            ExtFunRetDat2 = 0x37, "EXT_FUN_RET_DAT_2" => [func: Func, dest: DestAddr, arg1: SrcAddr, arg2: SrcAddr], 10,
            /// EXT_FUN_VAL func, #value ; func(value)
            ExtFunVal = 0x38, "EXT_FUN_VAL" => [func: Func, value: Value], 10,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $steps:expr
        ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for OpCode {
            type Error = ATError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(OpCode::$name), )*
                    _ => Err(ATError::InvalidOpCode { opcode: value, pc: 0 }),
                }
            }
        }

        impl OpCode {
            /// Every opcode, in table order.
            pub const ALL: &'static [OpCode] = &[ $( OpCode::$name, )* ];

            pub const fn value(self) -> u8 {
                self as u8
            }

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$name => $mnemonic, )*
                }
            }

            /// Default step cost; hosts may override it.
            pub const fn base_steps(self) -> u64 {
                match self {
                    $( OpCode::$name => $steps, )*
                }
            }

            /// Operand kinds in encoding order.
            pub const fn operands(self) -> &'static [OperandKind] {
                match self {
                    $( OpCode::$name => &[ $( OperandKind::$kind, )* ], )*
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl OpCode {
    /// Encoded size of the whole instruction in bytes.
    pub fn size(self) -> usize {
        1 + self.operands().iter().map(|kind| kind.size()).sum::<usize>()
    }

    /// For the `EXT_FUN*` family, the `(param_count, returns_value)` shape a
    /// function must have to be called through this opcode.
    pub const fn function_signature(self) -> Option<(u8, bool)> {
        match self {
            OpCode::ExtFun => Some((0, false)),
            OpCode::ExtFunDat | OpCode::ExtFunVal => Some((1, false)),
            OpCode::ExtFunDat2 => Some((2, false)),
            OpCode::ExtFunRet => Some((0, true)),
            OpCode::ExtFunRetDat => Some((1, true)),
            OpCode::ExtFunRetDat2 => Some((2, true)),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
