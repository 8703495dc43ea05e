//! Gossip: propagating ledger blocks over the overlay.
//!
//! Blocks travel as JSON record tuples on the same channel as every other
//! application message. A receiver drops blocks whose index it already
//! holds and appends the rest. A peer can also ask for the whole chain with
//! a `{"type": "chain_request"}` control message.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use nodechain_core::Block;
use nodechain_net::{Message, MessageHandler, Node, NodeConfig, NodeId, PeerConnection};
use nodechain_store::{InsertResult, Store};

use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;

/// `type` of the control message that asks a peer to replay its chain.
pub const CHAIN_REQUEST: &str = "chain_request";

/// Configuration for gossip ingestion.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Append gossiped blocks through [`Ledger::append`], re-verifying
    /// proof-of-work and linkage. When false, blocks with an unseen index
    /// are written to the store as received.
    pub verify_gossip: bool,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            verify_gossip: true,
        }
    }
}

/// What happened to one gossiped block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipOutcome {
    /// The block was new and is now stored.
    Stored(u64),
    /// A block with this index is already stored.
    Known(u64),
    /// The block was not accepted.
    Rejected { index: u64, reason: String },
}

fn is_chain_request(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some(CHAIN_REQUEST)
}

/// Message handler that feeds gossiped blocks into a [`Ledger`].
pub struct GossipHandler<S: Store> {
    ledger: Arc<Ledger<S>>,
    config: GossipConfig,
    fallback: Option<Arc<dyn MessageHandler>>,
}

impl<S: Store + 'static> GossipHandler<S> {
    pub fn new(ledger: Arc<Ledger<S>>, config: GossipConfig) -> Self {
        Self {
            ledger,
            config,
            fallback: None,
        }
    }

    /// Pass messages that are neither blocks nor control messages, and all
    /// connection events, on to `fallback`.
    pub fn with_fallback(mut self, fallback: Arc<dyn MessageHandler>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger<S>> {
        &self.ledger
    }

    /// Store `block` unless its index is already taken.
    pub async fn ingest(&self, block: &Block) -> Result<GossipOutcome> {
        let index = block.index;
        if self.ledger.store().has_block(index).await? {
            return Ok(GossipOutcome::Known(index));
        }

        if self.config.verify_gossip {
            return match self.ledger.append(block).await {
                Ok(()) => Ok(GossipOutcome::Stored(index)),
                Err(LedgerError::AlreadyExists { .. }) => Ok(GossipOutcome::Known(index)),
                Err(e @ (LedgerError::Validation(_) | LedgerError::Conflict { .. })) => {
                    Ok(GossipOutcome::Rejected {
                        index,
                        reason: e.to_string(),
                    })
                }
                Err(e) => Err(e),
            };
        }

        match self.ledger.store().insert_block(block).await? {
            InsertResult::Inserted => {
                info!(index, hash = %block.hash, "gossiped block stored unverified");
                Ok(GossipOutcome::Stored(index))
            }
            InsertResult::AlreadyExists => Ok(GossipOutcome::Known(index)),
            InsertResult::Conflict { existing } => Ok(GossipOutcome::Rejected {
                index,
                reason: format!("index taken by {}", existing),
            }),
        }
    }

    /// Send every stored block to `peer`, one message each, in index order.
    /// Returns how many blocks were sent.
    pub async fn replay(&self, peer: &PeerConnection) -> Result<usize> {
        let blocks = self.ledger.blocks().await?;
        for block in &blocks {
            peer.send(&Message::Json(block.to_record())).await?;
        }
        debug!(peer_id = %peer.node_id(), blocks = blocks.len(), "chain replayed");
        Ok(blocks.len())
    }

    async fn handle_json(&self, peer: &Arc<PeerConnection>, value: Value) {
        if is_chain_request(&value) {
            if let Err(e) = self.replay(peer).await {
                warn!(peer_id = %peer.node_id(), error = %e, "chain replay failed");
            }
            return;
        }

        let block = match Block::from_value(&value) {
            Ok(block) => block,
            Err(_) => return self.pass_on(peer, Message::Json(value)).await,
        };

        match self.ingest(&block).await {
            Ok(GossipOutcome::Stored(index)) => {
                debug!(peer_id = %peer.node_id(), index, "gossiped block accepted");
            }
            Ok(GossipOutcome::Known(index)) => {
                debug!(peer_id = %peer.node_id(), index, "gossiped block already known");
            }
            Ok(GossipOutcome::Rejected { index, reason }) => {
                warn!(peer_id = %peer.node_id(), index, reason = %reason, "gossiped block rejected");
            }
            Err(e) => {
                warn!(peer_id = %peer.node_id(), index = block.index, error = %e, "gossip ingest failed");
            }
        }
    }

    async fn pass_on(&self, peer: &Arc<PeerConnection>, message: Message) {
        match &self.fallback {
            Some(fallback) => fallback.on_message(peer, message).await,
            None => debug!(peer_id = %peer.node_id(), ?message, "ignoring non-gossip message"),
        }
    }
}

#[async_trait]
impl<S: Store + 'static> MessageHandler for GossipHandler<S> {
    async fn on_message(&self, peer: &Arc<PeerConnection>, message: Message) {
        match message {
            Message::Json(value) => self.handle_json(peer, value).await,
            other => self.pass_on(peer, other).await,
        }
    }

    async fn on_peer_connected(&self, peer: &Arc<PeerConnection>) {
        if let Some(fallback) = &self.fallback {
            fallback.on_peer_connected(peer).await;
        }
    }

    async fn on_peer_disconnected(&self, peer: &Arc<PeerConnection>) {
        if let Some(fallback) = &self.fallback {
            fallback.on_peer_disconnected(peer).await;
        }
    }

    async fn on_reconnect_attempt(&self, host: &str, port: u16, trials: u32) -> bool {
        match &self.fallback {
            Some(fallback) => fallback.on_reconnect_attempt(host, port, trials).await,
            None => true,
        }
    }
}

/// A [`Node`] whose messages feed a [`Ledger`].
pub struct GossipNode<S: Store> {
    node: Node,
    ledger: Arc<Ledger<S>>,
    handler: Arc<GossipHandler<S>>,
}

impl<S: Store + 'static> GossipNode<S> {
    pub fn new(node_config: NodeConfig, ledger: Arc<Ledger<S>>, config: GossipConfig) -> Self {
        Self::from_handler(node_config, GossipHandler::new(ledger, config))
    }

    /// Build around a preconfigured handler, e.g. one with a fallback.
    pub fn from_handler(node_config: NodeConfig, handler: GossipHandler<S>) -> Self {
        let handler = Arc::new(handler);
        let node = Node::new(node_config, handler.clone());
        Self {
            node,
            ledger: handler.ledger.clone(),
            handler,
        }
    }

    /// The overlay node, for connecting and plain messaging.
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn ledger(&self) -> &Arc<Ledger<S>> {
        &self.ledger
    }

    pub fn handler(&self) -> &Arc<GossipHandler<S>> {
        &self.handler
    }

    pub async fn start(&self) -> Result<std::net::SocketAddr> {
        Ok(self.node.start().await?)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self.node.stop().await?)
    }

    /// Mine a block on the local tip, append it and broadcast it.
    pub async fn publish(&self, payload: Value, kind: &str) -> Result<Block> {
        let block = self.ledger.mine(payload, kind).await?;
        let delivered = self.announce(&block).await?;
        info!(index = block.index, peers = delivered, "block published");
        Ok(block)
    }

    /// Broadcast `block` to every connected peer. Returns how many
    /// connections accepted it.
    pub async fn announce(&self, block: &Block) -> Result<usize> {
        Ok(self
            .node
            .send_to_all(Message::Json(block.to_record()), &[])
            .await?)
    }

    /// Send every stored block, individually and in index order, to each
    /// connection whose remote identifier is `node_id`. Returns how many
    /// blocks were read from the ledger.
    pub async fn replay_to(&self, node_id: &NodeId) -> Result<usize> {
        let blocks = self.ledger.blocks().await?;
        for block in &blocks {
            self.node
                .send_to_node(node_id, Message::Json(block.to_record()))
                .await?;
        }
        debug!(peer_id = %node_id, blocks = blocks.len(), "chain replayed");
        Ok(blocks.len())
    }

    /// Ask every connection to `node_id` to replay its chain to us.
    pub async fn request_chain(&self, node_id: &NodeId) -> Result<usize> {
        Ok(self
            .node
            .send_to_node(node_id, json!({ "type": CHAIN_REQUEST }))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerConfig;
    use nodechain_core::{seal, BlockHash, BlockTemplate};
    use nodechain_store::MemoryStore;

    fn handler(verify: bool) -> GossipHandler<MemoryStore> {
        let ledger = Ledger::new(MemoryStore::new(), LedgerConfig::with_difficulty(1));
        GossipHandler::new(
            Arc::new(ledger),
            GossipConfig {
                verify_gossip: verify,
            },
        )
    }

    fn first_block(payload: &str) -> Block {
        seal(BlockTemplate::genesis("t", json!(payload)), 1).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_dedups_by_index() {
        let handler = handler(true);
        let block = first_block("x");

        assert_eq!(handler.ingest(&block).await.unwrap(), GossipOutcome::Stored(1));
        assert_eq!(handler.ingest(&block).await.unwrap(), GossipOutcome::Known(1));

        // A different block at a stored index is known, not a conflict.
        let rival = first_block("y");
        assert_eq!(handler.ingest(&rival).await.unwrap(), GossipOutcome::Known(1));
        assert_eq!(handler.ledger().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ingest_rejects_invalid_block() {
        let handler = handler(true);
        let mut block = first_block("x");
        block.payload = json!("forged");

        let outcome = handler.ingest(&block).await.unwrap();
        assert!(matches!(outcome, GossipOutcome::Rejected { index: 1, .. }));
        assert!(handler.ledger().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_ascii_previous_hash() {
        let handler = handler(true);
        let record = json!([1, format!("a{}", "é".repeat(10)), "t", "ts", "x", 0, "0".repeat(128)]);
        let block = Block::from_value(&record).unwrap();

        let outcome = handler.ingest(&block).await.unwrap();
        assert!(matches!(outcome, GossipOutcome::Rejected { index: 1, .. }));
        assert!(handler.ledger().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_unverified_ingest_stores_as_received() {
        let handler = handler(false);
        let block = BlockTemplate::genesis("t", json!(null))
            .into_block(0, BlockHash::from_hex_unchecked("bogus"));

        assert_eq!(handler.ingest(&block).await.unwrap(), GossipOutcome::Stored(1));
        assert_eq!(handler.ledger().get(1).await.unwrap(), Some(block));
    }

    #[test]
    fn test_chain_request_detection() {
        assert!(is_chain_request(&json!({"type": "chain_request"})));
        assert!(!is_chain_request(&json!({"type": "other"})));
        assert!(!is_chain_request(&json!(["chain_request"])));
    }
}
