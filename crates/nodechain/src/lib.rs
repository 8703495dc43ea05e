//! # Nodechain
//!
//! The unified API for nodechain: a proof-of-work ledger whose blocks are
//! gossiped between nodes of a small TCP overlay.
//!
//! ## Overview
//!
//! - **Ledger**: an append-only chain of blocks, each sealed by searching
//!   for a nonce whose SHA-512 digest has enough leading zero hex digits
//! - **Overlay**: nodes that accept and dial peers, exchange identifiers,
//!   broadcast framed messages and redial lost outbound links
//! - **Gossip**: blocks travel over the overlay as JSON records; receivers
//!   drop indices they already hold and append the rest
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nodechain::{GossipConfig, GossipNode, Ledger, LedgerConfig};
//! use nodechain::net::NodeConfig;
//! use nodechain::store::SqliteStore;
//! use serde_json::json;
//!
//! async fn example() -> nodechain::Result<()> {
//!     let store = SqliteStore::open("blockchain.db")?;
//!     let ledger = Arc::new(Ledger::new(store, LedgerConfig::default()));
//!
//!     let node = GossipNode::new(NodeConfig::new("127.0.0.1", 8001), ledger, GossipConfig::default());
//!     node.start().await?;
//!     node.node().connect("127.0.0.1", 8002, true).await?;
//!
//!     node.publish(json!({"to": "bob", "amount": 5}), "transfer").await?;
//!     node.stop().await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `nodechain::core` - Blocks, canonical encoding, proof-of-work
//! - `nodechain::store` - Storage abstraction and SQLite
//! - `nodechain::net` - The overlay node

pub mod convergence;
pub mod error;
pub mod gossip;
pub mod ledger;

pub use nodechain_core as core;
pub use nodechain_net as net;
pub use nodechain_store as store;

pub use convergence::{chain_state_hash, StateHash};
pub use error::{LedgerError, Result};
pub use gossip::{GossipConfig, GossipHandler, GossipNode, GossipOutcome, CHAIN_REQUEST};
pub use ledger::{Ledger, LedgerConfig};

pub use nodechain_core::{Block, BlockHash, BlockTemplate, DEFAULT_DIFFICULTY};
