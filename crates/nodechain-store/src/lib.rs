//! # Nodechain Store
//!
//! Storage abstraction for the nodechain ledger: an append-only table of
//! blocks keyed by index, behind the [`Store`] trait, with SQLite and
//! in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a block
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nodechain_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("blockchain.db").unwrap();
//!     let latest = store.get_latest().await.unwrap();
//!     println!("tip: {:?}", latest.map(|b| b.index));
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **No validation**: the store persists what it is given; proof-of-work
//!   and linkage checks belong to the ledger.
//! - **Idempotent inserts**: inserting the same block twice returns `AlreadyExists`
//! - **Immutability**: a different block at an occupied index returns `Conflict`
//!   and leaves the stored block untouched

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};
