//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use nodechain_core::Block;

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<BTreeMap<u64, Block>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<u64, Block>>> {
        self.blocks
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<u64, Block>>> {
        self.blocks
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_block(&self, block: &Block) -> Result<InsertResult> {
        let mut blocks = self.write()?;

        if let Some(existing) = blocks.get(&block.index) {
            if existing.hash == block.hash {
                return Ok(InsertResult::AlreadyExists);
            }
            return Ok(InsertResult::Conflict {
                existing: existing.hash.clone(),
            });
        }

        blocks.insert(block.index, block.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_block(&self, index: u64) -> Result<Option<Block>> {
        Ok(self.read()?.get(&index).cloned())
    }

    async fn get_latest(&self) -> Result<Option<Block>> {
        Ok(self.read()?.values().next_back().cloned())
    }

    async fn get_range(&self, start: u64, end: u64) -> Result<Vec<Block>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.read()?.range(start..=end).map(|(_, b)| b.clone()).collect())
    }

    async fn get_all(&self) -> Result<Vec<Block>> {
        Ok(self.read()?.values().cloned().collect())
    }

    async fn has_block(&self, index: u64) -> Result<bool> {
        Ok(self.read()?.contains_key(&index))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }
}
