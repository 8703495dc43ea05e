//! Error types for the ledger and gossip layer.

use nodechain_core::{BlockHash, CoreError, ValidationError};
use nodechain_net::NetError;
use nodechain_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The block failed validation; nothing was written.
    #[error("invalid block: {0}")]
    Validation(#[from] ValidationError),

    /// Encoding error while building a block.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Network error.
    #[error("network error: {0}")]
    Net(#[from] NetError),

    /// The identical block is already stored.
    #[error("block {index} already stored")]
    AlreadyExists { index: u64 },

    /// A different block occupies the index.
    #[error("conflict at index {index}: existing block {existing}")]
    Conflict { index: u64, existing: BlockHash },

    /// A stored block no longer validates.
    #[error("chain invalid at index {index}: {source}")]
    InvalidChain {
        index: u64,
        #[source]
        source: ValidationError,
    },

    /// The proof-of-work worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
