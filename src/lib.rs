//! Deterministic interpreter for CIYAM Automated Transactions.
//!
//! An Automated Transaction (AT) is a small bytecode program attached to a
//! blockchain account. Each new block the host runs one bounded round of the
//! program; between rounds the machine lives entirely in its serialized
//! state bytes, so every validating node replays it identically.

pub mod types;
pub mod utils;
pub mod virtual_machine;
