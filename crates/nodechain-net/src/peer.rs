//! A live connection to one remote node.
//!
//! Each connection owns the write half of its socket and runs a receive
//! loop on its own task. The loop splits incoming bytes into frames,
//! decodes each one and hands it to the owning node, in wire order. When
//! the loop ends, whether by [`PeerConnection::stop`], remote close or an
//! I/O error, the socket is closed and the node is told so it can drop the
//! connection from its peer sets.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{NetError, Result};
use crate::frame::{FrameDecoder, Framing, Message};
use crate::identity::NodeId;

const READ_CHUNK: usize = 4096;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Node-local handle for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The remote node dialled us.
    Inbound,
    /// We dialled the remote node.
    Outbound,
}

/// One established peer link.
pub struct PeerConnection {
    id: ConnectionId,
    node_id: NodeId,
    direction: Direction,
    /// Remote IP for inbound links, the dialled host for outbound ones.
    host: String,
    port: u16,
    framing: Framing,
    writer: Mutex<BoxedWriter>,
    shutdown: watch::Sender<bool>,
    info: RwLock<HashMap<String, Value>>,
}

impl PeerConnection {
    pub(crate) fn new(
        id: ConnectionId,
        node_id: NodeId,
        direction: Direction,
        host: String,
        port: u16,
        framing: Framing,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            id,
            node_id,
            direction,
            host,
            port,
            framing,
            writer: Mutex::new(Box::new(writer)),
            shutdown,
            info: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The identifier the remote node announced in the handshake.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether termination has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Request termination. Idempotent; the receive loop exits on its
    /// next wake.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Send one message.
    ///
    /// An encoding failure is returned and the link stays up. A socket
    /// failure stops the link.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let frame = self.framing.encode(message)?;
        self.send_frame(&frame).await
    }

    pub(crate) async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        if self.is_stopped() {
            return Err(NetError::PeerNotConnected(self.node_id.to_string()));
        }

        let mut writer = self.writer.lock().await;
        let written = match writer.write_all(frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            warn!(peer_id = %self.node_id, conn = %self.id, error = %e, "send failed, stopping peer");
            self.stop();
            return Err(NetError::Io(e));
        }
        Ok(())
    }

    /// Attach a node-local annotation.
    pub fn set_info(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.info
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Read back an annotation.
    pub fn info(&self, key: &str) -> Option<Value> {
        self.info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("direction", &self.direction)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl fmt::Display for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.node_id)
    }
}

/// Callbacks from a receive loop to the node that owns the connection.
#[async_trait]
pub(crate) trait PeerEvents: Send + Sync {
    /// One decoded frame.
    async fn frame_received(&self, peer: &Arc<PeerConnection>, message: Message);

    /// The loop has ended and the socket is closed.
    async fn peer_closed(&self, peer: &Arc<PeerConnection>);
}

/// Receive loop for one connection.
///
/// `decoder` may already hold bytes read during the handshake.
pub(crate) async fn receive_loop<R>(
    peer: Arc<PeerConnection>,
    mut reader: R,
    mut decoder: FrameDecoder,
    read_timeout: Duration,
    events: Arc<dyn PeerEvents>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut shutdown = peer.shutdown.subscribe();
    let mut chunk = vec![0u8; READ_CHUNK];

    let reason: String = 'receive: loop {
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    events
                        .frame_received(&peer, Message::decode(&frame))
                        .await
                }
                Ok(None) => break,
                Err(e) => break 'receive e.to_string(),
            }
        }

        if *shutdown.borrow() {
            break 'receive "stopped".into();
        }

        tokio::select! {
            _ = shutdown.changed() => {}
            read = timeout(read_timeout, reader.read(&mut chunk)) => match read {
                // Bounded wait expired with nothing to read.
                Err(_) => {}
                Ok(Ok(0)) => break 'receive "closed by remote".into(),
                Ok(Ok(n)) => decoder.extend(&chunk[..n]),
                Ok(Err(e)) => break 'receive e.to_string(),
            },
        }
    };

    peer.stop();
    if let Err(e) = peer.writer.lock().await.shutdown().await {
        debug!(conn = %peer.id, error = %e, "socket shutdown failed");
    }
    drop(reader);

    debug!(peer_id = %peer.node_id, conn = %peer.id, reason = %reason, "peer connection ended");
    events.peer_closed(&peer).await;
}
