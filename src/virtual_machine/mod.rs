//! Deterministic bytecode machine for Automated Transactions.
//!
//! An AT is a small program deployed on a blockchain. Every validating node
//! runs it one round per block and must reach bit-identical state, so the
//! machine has no floating point, no dynamic allocation visible to programs,
//! and explicit wraparound on all arithmetic.
//!
//! # Architecture
//!
//! - **Segments**: immutable code, a data segment of 8-byte words, a bounded
//!   call stack and a bounded user stack, all sized by a fixed [`header::Header`]
//! - **Registers**: A and B, each four 64-bit words, used to exchange 256-bit
//!   values (hashes, addresses, transaction ids) with the host
//! - **Metering**: every opcode costs steps; steps cost balance. Running out of
//!   steps pauses the machine until the next round, running out of balance
//!   freezes it
//! - **Host seam**: everything chain-related goes through [`host::Host`]
//!
//! # Modules
//!
//! - [`assembler`]: code generation with label resolution
//! - [`disassembler`]: audit listings
//! - [`errors`]: the [`errors::ATError`] type
//! - [`function`]: function codes reachable through the `EXT_FUN*` opcodes
//! - [`header`]: machine header and segment geometry
//! - [`host`]: the host capability trait
//! - [`isa`]: opcode table
//! - [`operand`]: operand kinds and the bounds-checking code reader
//! - [`vm`]: the [`vm::Machine`] execution engine and its state bytes

pub mod assembler;
pub mod disassembler;
pub mod errors;
pub mod function;
pub mod header;
pub mod host;
pub mod isa;
pub mod operand;
pub mod vm;
