//! Utilities shared across the crate.

pub mod log;
