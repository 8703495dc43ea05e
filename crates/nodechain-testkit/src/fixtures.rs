//! Test fixtures and helpers.
//!
//! Common setup code for multi-node integration tests: nodes on ephemeral
//! loopback ports whose events land in a channel, small ledgers, and a
//! polling helper for conditions that settle asynchronously.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

use nodechain::{Block, Ledger, LedgerConfig};
use nodechain_net::{
    ConnectionId, Message, MessageHandler, Node, NodeConfig, NodeId, PeerConnection,
};
use nodechain_store::MemoryStore;

/// How long helpers wait for something to happen over loopback.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// An event observed by a [`ChannelHandler`].
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Message {
        conn: ConnectionId,
        from: NodeId,
        message: Message,
    },
    Connected {
        conn: ConnectionId,
        node_id: NodeId,
    },
    Disconnected {
        conn: ConnectionId,
        node_id: NodeId,
    },
    ReconnectAttempt {
        host: String,
        port: u16,
        trials: u32,
    },
}

/// Message handler that forwards every event to a channel.
pub struct ChannelHandler {
    events: mpsc::UnboundedSender<NodeEvent>,
    allow_reconnect: bool,
}

impl ChannelHandler {
    pub fn new() -> (Arc<Self>, EventReceiver) {
        Self::with_reconnect(true)
    }

    /// `allow_reconnect` is returned from every reconnect attempt.
    pub fn with_reconnect(allow_reconnect: bool) -> (Arc<Self>, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                events,
                allow_reconnect,
            }),
            EventReceiver { rx },
        )
    }

    fn emit(&self, event: NodeEvent) {
        // The receiver may be gone once a test has its answer.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl MessageHandler for ChannelHandler {
    async fn on_message(&self, peer: &Arc<PeerConnection>, message: Message) {
        self.emit(NodeEvent::Message {
            conn: peer.id(),
            from: peer.node_id().clone(),
            message,
        });
    }

    async fn on_peer_connected(&self, peer: &Arc<PeerConnection>) {
        self.emit(NodeEvent::Connected {
            conn: peer.id(),
            node_id: peer.node_id().clone(),
        });
    }

    async fn on_peer_disconnected(&self, peer: &Arc<PeerConnection>) {
        self.emit(NodeEvent::Disconnected {
            conn: peer.id(),
            node_id: peer.node_id().clone(),
        });
    }

    async fn on_reconnect_attempt(&self, host: &str, port: u16, trials: u32) -> bool {
        self.emit(NodeEvent::ReconnectAttempt {
            host: host.to_string(),
            port,
            trials,
        });
        self.allow_reconnect
    }
}

/// Receiving end of a [`ChannelHandler`].
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<NodeEvent>,
}

impl EventReceiver {
    /// The next event, or `None` after [`SETTLE_TIMEOUT`].
    pub async fn next(&mut self) -> Option<NodeEvent> {
        timeout(SETTLE_TIMEOUT, self.rx.recv()).await.ok().flatten()
    }

    /// The next application message, skipping connection events.
    pub async fn next_message(&mut self) -> Option<(NodeId, Message)> {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        loop {
            let event = timeout(deadline.saturating_duration_since(Instant::now()), self.rx.recv())
                .await
                .ok()
                .flatten()?;
            if let NodeEvent::Message { from, message, .. } = event {
                return Some((from, message));
            }
        }
    }

    /// Events already queued, without waiting.
    pub fn drain(&mut self) -> Vec<NodeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Config for a loopback node on an ephemeral port with short waits.
pub fn loopback_config(node_id: &str) -> NodeConfig {
    let mut config = NodeConfig::new("127.0.0.1", 0).with_node_id(node_id);
    config.accept_timeout = Duration::from_millis(50);
    config.read_timeout = Duration::from_millis(50);
    config.handshake_timeout = Duration::from_secs(2);
    config
}

/// Start a node with `config` and a [`ChannelHandler`].
pub async fn spawn_node_with(config: NodeConfig) -> anyhow::Result<(Node, EventReceiver)> {
    let (handler, events) = ChannelHandler::new();
    let node = Node::new(config, handler);
    node.start().await.context("starting node")?;
    Ok((node, events))
}

/// Start a loopback node called `node_id`.
pub async fn spawn_node(node_id: &str) -> anyhow::Result<(Node, EventReceiver)> {
    spawn_node_with(loopback_config(node_id)).await
}

/// Poll `condition` until it holds or [`SETTLE_TIMEOUT`] passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    eventually_async(|| std::future::ready(condition())).await
}

/// Async form of [`eventually`].
pub async fn eventually_async<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// An in-memory ledger with a low difficulty.
pub struct TestLedger {
    pub ledger: Arc<Ledger<MemoryStore>>,
}

impl TestLedger {
    pub fn new() -> Self {
        Self::with_difficulty(1)
    }

    pub fn with_difficulty(difficulty: usize) -> Self {
        Self {
            ledger: Arc::new(Ledger::new(
                MemoryStore::new(),
                LedgerConfig::with_difficulty(difficulty),
            )),
        }
    }

    /// Mine `count` blocks with payloads `0..count`.
    pub async fn mine_chain(&self, count: u64) -> anyhow::Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for n in 0..count {
            blocks.push(self.ledger.mine(Value::from(n), "test").await?);
        }
        Ok(blocks)
    }

    pub fn shared(&self) -> Arc<Ledger<MemoryStore>> {
        self.ledger.clone()
    }
}

impl Default for TestLedger {
    fn default() -> Self {
        Self::new()
    }
}
