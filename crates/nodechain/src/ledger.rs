//! The Ledger: an append-only chain of proof-of-work blocks.
//!
//! Blocks are built against the current tip, sealed on a blocking thread,
//! and appended under a single lock so that validation and insertion see
//! the same tip. Reads go straight to the store.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use nodechain_core::{seal, validate_block, Block, BlockTemplate, DEFAULT_DIFFICULTY};
use nodechain_store::{InsertResult, Store};

use crate::error::{LedgerError, Result};

/// Configuration for a [`Ledger`].
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Leading zero hex digits a block hash must have.
    pub difficulty: usize,
    /// Validate blocks before appending. When false, any block is written
    /// as given, which only makes sense for compatibility testing.
    pub verify_blocks: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            verify_blocks: true,
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(difficulty: usize) -> Self {
        Self {
            difficulty,
            ..Default::default()
        }
    }
}

/// A proof-of-work ledger over any [`Store`].
pub struct Ledger<S: Store> {
    store: Arc<S>,
    config: LedgerConfig,
    /// Held across validate + insert.
    append_lock: Mutex<()>,
}

impl<S: Store> Ledger<S> {
    /// Create a ledger over `store`.
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Create a ledger over a store that is also used elsewhere.
    pub fn with_shared_store(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            append_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    /// Build and seal the block that would follow the current tip.
    ///
    /// The block is not persisted. It links to the sentinel when the chain
    /// is empty.
    pub async fn build_block(&self, payload: Value, kind: &str) -> Result<Block> {
        let tip = self.store.get_latest().await?;
        let template = BlockTemplate::next(tip.as_ref(), kind, payload);
        self.seal_template(template).await
    }

    /// Seal an arbitrary template on the blocking pool.
    pub async fn seal_template(&self, template: BlockTemplate) -> Result<Block> {
        let difficulty = self.config.difficulty;

        let block = tokio::task::spawn_blocking(move || seal(template, difficulty))
            .await
            .map_err(|e| LedgerError::Task(e.to_string()))??;

        debug!(index = block.index, nonce = block.nonce, hash = %block.hash, "block sealed");
        Ok(block)
    }

    /// Validate `block` against the current tip and persist it.
    ///
    /// Fails without writing if validation fails or the index is taken.
    pub async fn append(&self, block: &Block) -> Result<()> {
        let _guard = self.append_lock.lock().await;

        if self.config.verify_blocks {
            let tip = self.store.get_latest().await?;
            if let Err(e) = validate_block(block, tip.as_ref(), self.config.difficulty) {
                warn!(index = block.index, error = %e, "rejecting block");
                return Err(e.into());
            }
        }

        match self.store.insert_block(block).await? {
            InsertResult::Inserted => {
                info!(index = block.index, kind = %block.kind, hash = %block.hash, "block appended");
                Ok(())
            }
            InsertResult::AlreadyExists => Err(LedgerError::AlreadyExists { index: block.index }),
            InsertResult::Conflict { existing } => Err(LedgerError::Conflict {
                index: block.index,
                existing,
            }),
        }
    }

    /// Build a block on the current tip and append it.
    pub async fn mine(&self, payload: Value, kind: &str) -> Result<Block> {
        let block = self.build_block(payload, kind).await?;
        self.append(&block).await?;
        Ok(block)
    }

    /// The block at `index`, if stored.
    pub async fn get(&self, index: u64) -> Result<Option<Block>> {
        Ok(self.store.get_block(index).await?)
    }

    /// The tip, if the chain is not empty.
    pub async fn get_latest(&self) -> Result<Option<Block>> {
        Ok(self.store.get_latest().await?)
    }

    /// Number of stored blocks.
    pub async fn len(&self) -> Result<u64> {
        Ok(self.store.count().await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Every stored block in index order.
    pub async fn blocks(&self) -> Result<Vec<Block>> {
        Ok(self.store.get_all().await?)
    }

    /// Blocks with `start <= index <= end`.
    pub async fn range(&self, start: u64, end: u64) -> Result<Vec<Block>> {
        Ok(self.store.get_range(start, end).await?)
    }

    /// Re-validate every stored block and its link to the one before.
    ///
    /// Runs regardless of `verify_blocks`, so it can audit a chain that
    /// was filled without validation.
    pub async fn verify_chain(&self) -> Result<()> {
        let blocks = self.store.get_all().await?;
        let mut previous: Option<&Block> = None;

        for block in &blocks {
            validate_block(block, previous, self.config.difficulty).map_err(|source| {
                LedgerError::InvalidChain {
                    index: block.index,
                    source,
                }
            })?;
            previous = Some(block);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodechain_core::{BlockHash, ValidationError};
    use nodechain_store::MemoryStore;
    use serde_json::json;

    fn ledger(difficulty: usize) -> Ledger<MemoryStore> {
        Ledger::new(MemoryStore::new(), LedgerConfig::with_difficulty(difficulty))
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let ledger = ledger(1);
        assert!(ledger.get_latest().await.unwrap().is_none());
        assert!(ledger.get(1).await.unwrap().is_none());
        assert!(ledger.is_empty().await.unwrap());
        ledger.verify_chain().await.unwrap();
    }

    #[tokio::test]
    async fn test_build_block_on_empty_chain() {
        let ledger = ledger(2);
        let block = ledger.build_block(json!("x"), "t1").await.unwrap();

        assert_eq!(block.index, 1);
        assert!(block.previous_hash.is_sentinel());
        assert!(block.hash.as_str().starts_with("00"));
        // Not persisted until appended.
        assert!(ledger.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_append_links_blocks() {
        let ledger = ledger(2);

        let first = ledger.mine(json!("x"), "t1").await.unwrap();
        let second = ledger.mine(json!("y"), "t2").await.unwrap();

        assert_eq!(second.index, 2);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(ledger.get_latest().await.unwrap(), Some(second));
        assert_eq!(ledger.len().await.unwrap(), 2);
        ledger.verify_chain().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_tampered_block() {
        let ledger = ledger(1);
        let mut block = ledger.build_block(json!("x"), "t1").await.unwrap();
        block.payload = json!("forged");

        let result = ledger.append(&block).await;
        assert!(matches!(
            result,
            Err(LedgerError::Validation(ValidationError::HashMismatch { .. }))
        ));
        assert!(ledger.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_stale_block() {
        let ledger = ledger(1);
        let stale = ledger.build_block(json!("a"), "t").await.unwrap();
        ledger.mine(json!("b"), "t").await.unwrap();

        let result = ledger.append(&stale).await;
        assert!(matches!(
            result,
            Err(LedgerError::Validation(ValidationError::InvalidIndex { expected: 2, got: 1 }))
        ));
        assert_eq!(ledger.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unverified_append_accepts_anything() {
        let ledger = Ledger::new(
            MemoryStore::new(),
            LedgerConfig {
                difficulty: 4,
                verify_blocks: false,
            },
        );
        let block = BlockTemplate::genesis("t", json!(null))
            .into_block(0, BlockHash::from_hex_unchecked("not-a-hash"));

        ledger.append(&block).await.unwrap();
        assert!(matches!(
            ledger.append(&block).await,
            Err(LedgerError::AlreadyExists { index: 1 })
        ));
        assert!(matches!(
            ledger.verify_chain().await,
            Err(LedgerError::InvalidChain { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let ledger = Arc::new(ledger(1));
        let candidate = ledger.build_block(json!("x"), "t").await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ledger = ledger.clone();
                let block = candidate.clone();
                tokio::spawn(async move { ledger.append(&block).await.is_ok() })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(ledger.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_range() {
        let ledger = ledger(1);
        for n in 0..4 {
            ledger.mine(json!(n), "t").await.unwrap();
        }
        let range = ledger.range(2, 3).await.unwrap();
        assert_eq!(range.iter().map(|b| b.index).collect::<Vec<_>>(), vec![2, 3]);
    }
}
