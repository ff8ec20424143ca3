//! Shared value types.
//!
//! - `encoding`: big-endian `Encode`/`Decode` traits used for every persisted image
//! - `timestamp`: packed (block height, transaction sequence) timestamps

pub mod encoding;
pub mod timestamp;
