//! Error types for the network layer.

use std::io;

use thiserror::Error;

/// Errors that can occur in the overlay network.
#[derive(Debug, Error)]
pub enum NetError {
    /// Connection-fatal I/O failure. Only the affected peer is torn down.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be encoded. The connection stays up.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An incoming frame exceeded the size cap.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The identifier exchange did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The node was asked to dial its own address.
    #[error("refusing to connect to own address {host}:{port}")]
    SelfConnect { host: String, port: u16 },

    /// The peer is not in this node's peer sets.
    #[error("peer not connected: {0}")]
    PeerNotConnected(String),

    /// `start` was called on a node that is not freshly created.
    #[error("node already started")]
    AlreadyRunning,

    /// The operation needs a running node.
    #[error("node is not running")]
    NotRunning,

    /// The listening socket failed; fatal to the accept loop.
    #[error("accept failed: {0}")]
    Accept(io::Error),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, NetError>;
