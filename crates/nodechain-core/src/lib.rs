//! # Nodechain Core
//!
//! Pure primitives for nodechain: blocks, canonical serialization, and
//! proof-of-work sealing.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the block data structure.
//!
//! ## Key Types
//!
//! - [`Block`] - A sealed ledger entry
//! - [`BlockTemplate`] - The unsealed fields of a block, input to [`seal`]
//! - [`BlockHash`] - Lowercase hex SHA-512 digest (or the genesis sentinel)
//!
//! ## Canonicalization
//!
//! Block digests are computed over sorted-key JSON. See the [`canonical`] module.

pub mod block;
pub mod canonical;
pub mod error;
pub mod pow;
pub mod types;
pub mod validation;

pub use block::{now_timestamp, Block, BlockTemplate, RECORD_FIELDS};
pub use canonical::{block_preimage, canonical_json};
pub use error::{CoreError, ValidationError};
pub use pow::{digest, meets_difficulty, seal, DEFAULT_DIFFICULTY};
pub use types::BlockHash;
pub use validation::{validate_block, validate_block_structure, validate_successor};
