//! Node configuration.

use std::time::Duration;

use crate::frame::Framing;
use crate::identity::NodeId;
use crate::reconnect::ReconnectPolicy;

/// Configuration for an overlay node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Host to bind and to announce as this node's address.
    pub host: String,

    /// Port to bind. `0` picks an ephemeral port at start.
    pub port: u16,

    /// Identifier announced to peers. Derived from the address when `None`.
    pub node_id: Option<NodeId>,

    /// Longest single wait on the listening socket before the accept loop
    /// re-checks shutdown and polls the reconnect monitor.
    pub accept_timeout: Duration,

    /// Longest single wait for bytes on a peer socket.
    pub read_timeout: Duration,

    /// Bound on dialling plus the identifier exchange.
    pub handshake_timeout: Duration,

    /// Pause between telling peers to stop and joining their tasks.
    pub shutdown_grace: Duration,

    /// Frame format. Every node in a network must use the same one.
    pub framing: Framing,

    /// Redial schedule for auto-reconnect links.
    pub reconnect: ReconnectPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            node_id: None,
            accept_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_millis(100),
            framing: Framing::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl NodeConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_node_id(mut self, id: impl Into<NodeId>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}
