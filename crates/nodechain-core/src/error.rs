//! Error types for nodechain core.

use thiserror::Error;

use crate::types::BlockHash;

/// Core errors that can occur while encoding or decoding blocks.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("malformed block record: {0}")]
    MalformedRecord(String),
}

/// Validation errors for block structure, proof-of-work, and chain linkage.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid block index: expected {expected}, got {got}")]
    InvalidIndex { expected: u64, got: u64 },

    #[error("hash mismatch: block claims {claimed}, recomputed {computed}")]
    HashMismatch {
        claimed: BlockHash,
        computed: BlockHash,
    },

    #[error("insufficient proof-of-work: hash does not start with {difficulty} zero digits")]
    InsufficientWork { difficulty: usize },

    #[error("invalid previous hash: expected {expected}, got {got}")]
    InvalidPrevious { expected: BlockHash, got: BlockHash },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::EncodingError(msg) | CoreError::MalformedRecord(msg) => {
                ValidationError::StructuralError(msg)
            }
        }
    }
}
