//! # Nodechain Testkit
//!
//! Testing utilities for nodechain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Blocks with known nonces and hashes for cross-implementation verification
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Loopback nodes, event channels and small ledgers for integration tests
//!
//! ## Golden Vectors
//!
//! ```rust
//! use nodechain_testkit::vectors::{all_vectors, seal_vector};
//!
//! for vector in all_vectors() {
//!     let block = seal_vector(&vector).unwrap();
//!     assert_eq!(block.hash.as_str(), vector.expected_hash);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use nodechain_testkit::fixtures::spawn_node;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let (a, _a_events) = spawn_node("a").await?;
//!     let (b, mut b_events) = spawn_node("b").await?;
//!     b.connect("127.0.0.1", a.port(), false).await?;
//!     a.send_to_all("hello", &[]).await?;
//!     let (_from, message) = b_events.next_message().await.unwrap();
//!     assert_eq!(message.as_text(), Some("hello"));
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    eventually, eventually_async, init_tracing, loopback_config, spawn_node, spawn_node_with,
    ChannelHandler, EventReceiver, NodeEvent, TestLedger, SETTLE_TIMEOUT,
};
pub use generators::{genesis_template, message, payload};
pub use vectors::{all_vectors, block_from_vector, seal_vector, verify_all_vectors, GoldenVector};
