//! # Nodechain Net
//!
//! A small peer-to-peer overlay over raw TCP.
//!
//! ## Key Types
//!
//! - [`Node`] - Listener, peer sets, broadcast and the reconnect monitor
//! - [`PeerConnection`] - One live link with its own receive task
//! - [`MessageHandler`] - Application callbacks
//! - [`Message`] - Text, JSON or raw bytes
//! - [`Framing`] / [`FrameDecoder`] - The wire format
//!
//! ## Wire Protocol
//!
//! After the TCP connection opens, the accepting side reads the dialler's
//! identifier frame and answers with its own. Every later frame is one
//! application message. See [`frame`] for the framing and decode rules.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nodechain_net::{LoggingHandler, Node, NodeConfig};
//!
//! async fn example() -> nodechain_net::Result<()> {
//!     let node = Node::new(NodeConfig::new("127.0.0.1", 8001), Arc::new(LoggingHandler));
//!     node.start().await?;
//!     node.connect("127.0.0.1", 8002, true).await?;
//!     node.send_to_all("hello", &[]).await?;
//!     node.stop().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod identity;
pub mod node;
pub mod peer;
pub mod reconnect;
pub mod registry;

pub use config::NodeConfig;
pub use error::{NetError, Result};
pub use frame::{FrameDecoder, Framing, Message, DELIMITER, MAX_FRAME_LEN};
pub use handler::{LoggingHandler, MessageHandler};
pub use identity::NodeId;
pub use node::{ConnectOutcome, Node, NodeState};
pub use peer::{ConnectionId, Direction, PeerConnection};
pub use reconnect::{ReconnectAction, ReconnectEntry, ReconnectPolicy, ReconnectRegistry};
pub use registry::PeerRegistry;
