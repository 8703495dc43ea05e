//! Chain state digests for comparing ledgers.
//!
//! After gossip settles, two nodes can compare a short digest of their
//! whole chains instead of exchanging every block.

use std::fmt;

use nodechain_store::Store;

use crate::error::Result;

const STATE_DOMAIN: &[u8] = b"nodechain-state-v0:";

/// Blake3 digest summarising a whole chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHash(pub [u8; 32]);

impl StateHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateHash({})", self.to_hex())
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Compute a deterministic state hash for a chain.
///
/// Algorithm:
/// 1. Get all blocks in index order
/// 2. Hash: H = Blake3(domain || (index_le || block_hash)*)
/// 3. Return final H, or `None` for an empty chain
pub async fn chain_state_hash<S: Store>(store: &S) -> Result<Option<StateHash>> {
    let blocks = store.get_all().await?;
    if blocks.is_empty() {
        return Ok(None);
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(STATE_DOMAIN);
    for block in &blocks {
        hasher.update(&block.index.to_le_bytes());
        hasher.update(block.hash.as_str().as_bytes());
    }

    Ok(Some(StateHash(*hasher.finalize().as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodechain_core::{seal, Block, BlockTemplate};
    use nodechain_store::MemoryStore;
    use serde_json::json;

    async fn chain_of(payloads: &[&str]) -> (MemoryStore, Vec<Block>) {
        let store = MemoryStore::new();
        let mut blocks: Vec<Block> = Vec::new();
        for payload in payloads {
            let template = BlockTemplate::next(blocks.last(), "t", json!(payload))
                .timestamp("2024-01-01T00:00:00.000000");
            let block = seal(template, 1).unwrap();
            store.insert_block(&block).await.unwrap();
            blocks.push(block);
        }
        (store, blocks)
    }

    #[tokio::test]
    async fn test_empty_chain_has_no_state_hash() {
        let store = MemoryStore::new();
        assert_eq!(chain_state_hash(&store).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_identical_chains_share_state_hash() {
        let (a, _) = chain_of(&["x", "y"]).await;
        let (b, _) = chain_of(&["x", "y"]).await;

        let state_a = chain_state_hash(&a).await.unwrap().unwrap();
        let state_b = chain_state_hash(&b).await.unwrap().unwrap();
        assert_eq!(state_a, state_b);
        assert_eq!(state_a.to_string(), state_a.to_hex()[..16]);
    }

    #[tokio::test]
    async fn test_divergent_tips_change_state_hash() {
        let (a, _) = chain_of(&["x", "y"]).await;
        let (b, _) = chain_of(&["x", "z"]).await;
        assert_ne!(
            chain_state_hash(&a).await.unwrap(),
            chain_state_hash(&b).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_prefix_chain_differs() {
        let (a, _) = chain_of(&["x"]).await;
        let (b, _) = chain_of(&["x", "y"]).await;
        assert_ne!(
            chain_state_hash(&a).await.unwrap(),
            chain_state_hash(&b).await.unwrap()
        );
    }
}
