//! Store trait: the abstract interface for block persistence.
//!
//! This trait allows the ledger to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use nodechain_core::{Block, BlockHash};

use crate::error::Result;

/// Result of inserting a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Block was inserted successfully.
    Inserted,
    /// The same block (same hash) is already stored at this index.
    AlreadyExists,
    /// Conflict: a different block occupies this index.
    Conflict {
        /// Hash of the block already stored at this index.
        existing: BlockHash,
    },
}

/// The Store trait: async interface for block persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Keyed by index**: at most one block per index; committed rows are never
///   updated or deleted.
/// - **Atomic inserts**: the check for an occupied index and the insert happen
///   under one lock, so concurrent inserts of the same index cannot both succeed.
/// - **Consistent reads**: a read observes the table either before or after
///   any concurrent insert, never a partial row.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a block at `block.index`.
    ///
    /// # Returns
    /// - `Inserted` if the index was free.
    /// - `AlreadyExists` if the identical block is already stored.
    /// - `Conflict` if a different block occupies the index.
    async fn insert_block(&self, block: &Block) -> Result<InsertResult>;

    /// Get a block by index. `None` when absent.
    async fn get_block(&self, index: u64) -> Result<Option<Block>>;

    /// Get the highest-index block. `None` when the table is empty.
    async fn get_latest(&self) -> Result<Option<Block>>;

    /// Get blocks with `start <= index <= end`, ordered by index.
    async fn get_range(&self, start: u64, end: u64) -> Result<Vec<Block>>;

    /// Get every stored block, ordered by index.
    async fn get_all(&self) -> Result<Vec<Block>>;

    /// Check if any block is stored at `index`.
    async fn has_block(&self, index: u64) -> Result<bool>;

    /// Number of stored blocks.
    async fn count(&self) -> Result<u64>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    async fn insert_block(&self, block: &Block) -> Result<InsertResult> {
        (**self).insert_block(block).await
    }

    async fn get_block(&self, index: u64) -> Result<Option<Block>> {
        (**self).get_block(index).await
    }

    async fn get_latest(&self) -> Result<Option<Block>> {
        (**self).get_latest().await
    }

    async fn get_range(&self, start: u64, end: u64) -> Result<Vec<Block>> {
        (**self).get_range(start, end).await
    }

    async fn get_all(&self) -> Result<Vec<Block>> {
        (**self).get_all().await
    }

    async fn has_block(&self, index: u64) -> Result<bool> {
        (**self).has_block(index).await
    }

    async fn count(&self) -> Result<u64> {
        (**self).count().await
    }
}
