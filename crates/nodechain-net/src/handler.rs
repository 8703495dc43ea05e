//! Application callbacks for a node.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::frame::Message;
use crate::peer::PeerConnection;

/// Receives a node's events.
///
/// Messages from one connection arrive in wire order; messages from
/// different connections may interleave. Callbacks run on the connection's
/// own task, so a slow handler only delays that connection.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// One decoded message from `peer`.
    async fn on_message(&self, peer: &Arc<PeerConnection>, message: Message);

    /// A connection finished its handshake and joined a peer set.
    async fn on_peer_connected(&self, _peer: &Arc<PeerConnection>) {}

    /// A connection ended and left its peer set.
    async fn on_peer_disconnected(&self, _peer: &Arc<PeerConnection>) {}

    /// The reconnect monitor is about to redial `host:port`.
    ///
    /// Returning `false` drops the address from the monitor.
    async fn on_reconnect_attempt(&self, host: &str, port: u16, trials: u32) -> bool {
        debug!(host, port, trials, "reconnecting");
        true
    }
}

/// Handler that only logs what it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn on_message(&self, peer: &Arc<PeerConnection>, message: Message) {
        info!(peer_id = %peer.node_id(), conn = %peer.id(), ?message, "message received");
    }
}
