//! The overlay node.
//!
//! A node listens on one TCP address, accepts inbound connections, dials
//! outbound ones, and keeps both in a [`PeerRegistry`]. The accept loop runs
//! on its own task; each wake (a new connection or the accept timeout) is
//! followed by one reconnect monitor poll.
//!
//! ## Lifecycle
//!
//! `Created` → [`Node::start`] → `Listening` → `Running` → [`Node::stop`] →
//! `Stopping` → `Stopped`. Stopping tells every peer to stop, waits
//! [`NodeConfig::shutdown_grace`], joins every peer task and closes the
//! listener.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::error::{NetError, Result};
use crate::frame::{FrameDecoder, Message};
use crate::handler::MessageHandler;
use crate::handshake::exchange_identifiers;
use crate::identity::NodeId;
use crate::peer::{receive_loop, ConnectionId, Direction, PeerConnection, PeerEvents};
use crate::reconnect::{ReconnectAction, ReconnectEntry, ReconnectRegistry};
use crate::registry::PeerRegistry;

const LISTEN_BACKLOG: u32 = 1024;

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Listening,
    Running,
    Stopping,
    Stopped,
}

/// Result of [`Node::connect`].
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    /// A new outbound connection was established.
    Connected(Arc<PeerConnection>),
    /// An equivalent link already existed; no new connection was kept.
    AlreadyConnected(Arc<PeerConnection>),
}

impl ConnectOutcome {
    pub fn peer(&self) -> &Arc<PeerConnection> {
        match self {
            ConnectOutcome::Connected(peer) | ConnectOutcome::AlreadyConnected(peer) => peer,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ConnectOutcome::Connected(_))
    }
}

/// A peer-to-peer overlay node.
///
/// Dropping a running node signals its tasks to shut down; call
/// [`Node::stop`] to wait for them.
pub struct Node {
    shared: Arc<Shared>,
    accept_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

struct Shared {
    config: NodeConfig,
    id: NodeId,
    local_addr: RwLock<Option<SocketAddr>>,
    state: Mutex<NodeState>,
    peers: PeerRegistry,
    reconnect: Mutex<ReconnectRegistry>,
    /// Serializes monitor polls so two polls never redial the same address.
    reconnect_poll: tokio::sync::Mutex<()>,
    handler: Arc<dyn MessageHandler>,
    shutdown: watch::Sender<bool>,
    next_connection: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Node {
    /// Create a node. Nothing is bound until [`Node::start`].
    pub fn new(config: NodeConfig, handler: Arc<dyn MessageHandler>) -> Self {
        let id = config
            .node_id
            .clone()
            .unwrap_or_else(|| NodeId::derive(&config.host, config.port));
        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                reconnect: Mutex::new(ReconnectRegistry::new(config.reconnect.clone())),
                config,
                id,
                local_addr: RwLock::new(None),
                state: Mutex::new(NodeState::Created),
                peers: PeerRegistry::new(),
                reconnect_poll: tokio::sync::Mutex::new(()),
                handler,
                shutdown,
                next_connection: AtomicU64::new(1),
                messages_sent: AtomicU64::new(0),
                messages_received: AtomicU64::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
            accept_task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.shared.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    pub fn host(&self) -> &str {
        &self.shared.config.host
    }

    /// The bound port once started, the configured one before.
    pub fn port(&self) -> u16 {
        self.shared.port()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr()
    }

    pub fn state(&self) -> NodeState {
        *lock(&self.shared.state)
    }

    /// Bind the listener and spawn the accept loop.
    pub async fn start(&self) -> Result<SocketAddr> {
        {
            let mut state = lock(&self.shared.state);
            if *state != NodeState::Created {
                return Err(NetError::AlreadyRunning);
            }
            *state = NodeState::Listening;
        }

        let listener = match bind(&self.shared.config.host, self.shared.config.port).await {
            Ok(listener) => listener,
            Err(e) => {
                *lock(&self.shared.state) = NodeState::Created;
                return Err(NetError::Io(e));
            }
        };
        let addr = listener.local_addr()?;
        *self
            .shared
            .local_addr
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(addr);
        info!(node_id = %self.shared.id, %addr, "node listening");

        let handle = tokio::spawn(accept_loop(self.shared.clone(), listener));
        *lock(&self.accept_task) = Some(handle);
        *lock(&self.shared.state) = NodeState::Running;

        Ok(addr)
    }

    /// Stop the node and wait for every task to finish.
    ///
    /// Returns the accept loop's error if the listener failed.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            match *state {
                NodeState::Listening | NodeState::Running => *state = NodeState::Stopping,
                _ => return Err(NetError::NotRunning),
            }
        }
        info!(node_id = %self.shared.id, "stopping node");
        self.shared.shutdown.send_replace(true);

        let handle = lock(&self.accept_task).take();
        let result = match handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(NetError::Task(e.to_string())),
            },
            None => Ok(()),
        };

        // The loop already drained peers unless it never ran.
        self.shared.shutdown_peers().await;

        *lock(&self.shared.state) = NodeState::Stopped;
        info!(node_id = %self.shared.id, "node stopped");
        result
    }

    /// Dial `host:port` and exchange identifiers.
    ///
    /// With `auto_reconnect`, the address is handed to the reconnect
    /// monitor, at most once per address.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        auto_reconnect: bool,
    ) -> Result<ConnectOutcome> {
        self.shared.connect(host, port, auto_reconnect).await
    }

    /// Close an outbound connection. The reconnect monitor keeps its entry.
    pub fn disconnect(&self, peer: &PeerConnection) -> Result<()> {
        if peer.direction() != Direction::Outbound || !self.shared.peers.contains(peer.id()) {
            return Err(NetError::PeerNotConnected(peer.node_id().to_string()));
        }
        debug!(peer_id = %peer.node_id(), conn = %peer.id(), "disconnecting");
        peer.stop();
        Ok(())
    }

    /// Send to one connection in this node's peer sets.
    pub async fn send_to_one(
        &self,
        peer: &PeerConnection,
        message: impl Into<Message>,
    ) -> Result<()> {
        self.shared.messages_sent.fetch_add(1, Ordering::Relaxed);
        if !self.shared.peers.contains(peer.id()) {
            return Err(NetError::PeerNotConnected(peer.node_id().to_string()));
        }
        peer.send(&message.into()).await
    }

    /// Send to every connection carrying `node_id`. Returns how many
    /// connections accepted the message.
    pub async fn send_to_node(&self, node_id: &NodeId, message: impl Into<Message>) -> Result<usize> {
        let message = message.into();
        let mut delivered = 0;
        for peer in self.shared.peers.find_by_node_id(node_id) {
            match self.send_to_one(&peer, message.clone()).await {
                Ok(()) => delivered += 1,
                Err(NetError::Encoding(e)) => return Err(NetError::Encoding(e)),
                Err(e) => warn!(peer_id = %node_id, conn = %peer.id(), error = %e, "send failed"),
            }
        }
        Ok(delivered)
    }

    /// Send to every connection not listed in `exclude`.
    ///
    /// Each delivery is independent: a failing peer is stopped and skipped.
    /// Returns how many connections accepted the message.
    pub async fn send_to_all(
        &self,
        message: impl Into<Message>,
        exclude: &[ConnectionId],
    ) -> Result<usize> {
        self.shared.messages_sent.fetch_add(1, Ordering::Relaxed);
        let frame = self.shared.config.framing.encode(&message.into())?;

        let mut delivered = 0;
        for peer in self.shared.peers.all() {
            if exclude.contains(&peer.id()) {
                continue;
            }
            match peer.send_frame(&frame).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(peer_id = %peer.node_id(), conn = %peer.id(), error = %e, "broadcast to peer failed"),
            }
        }
        Ok(delivered)
    }

    /// Run one reconnect monitor cycle now.
    pub async fn poll_reconnects(&self) {
        self.shared.poll_reconnects().await
    }

    /// Snapshot of the reconnect monitor's entries.
    pub fn reconnect_entries(&self) -> Vec<ReconnectEntry> {
        lock(&self.shared.reconnect).entries().to_vec()
    }

    /// Remove `host:port` from the reconnect monitor.
    pub fn forget_reconnect(&self, host: &str, port: u16) -> bool {
        lock(&self.shared.reconnect).remove(host, port)
    }

    /// `(inbound, outbound)` connection counts.
    pub fn peer_counts(&self) -> (usize, usize) {
        self.shared.peers.counts()
    }

    pub fn inbound_peers(&self) -> Vec<Arc<PeerConnection>> {
        self.shared.peers.inbound()
    }

    pub fn outbound_peers(&self) -> Vec<Arc<PeerConnection>> {
        self.shared.peers.outbound()
    }

    pub fn all_peers(&self) -> Vec<Arc<PeerConnection>> {
        self.shared.peers.all()
    }

    /// Connections in either direction whose remote announced `node_id`.
    pub fn find_peers(&self, node_id: &NodeId) -> Vec<Arc<PeerConnection>> {
        self.shared.peers.find_by_node_id(node_id)
    }

    pub fn messages_sent(&self) -> u64 {
        self.shared.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.shared.messages_received.load(Ordering::Relaxed)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}

impl Shared {
    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn port(&self) -> u16 {
        self.local_addr().map_or(self.config.port, |addr| addr.port())
    }

    fn is_running(&self) -> bool {
        *lock(&self.state) == NodeState::Running && !*self.shutdown.borrow()
    }

    fn is_own_address(&self, host: &str, port: u16) -> bool {
        if port != self.port() {
            return false;
        }
        host == self.config.host
            || self.local_addr().is_some_and(|addr| {
                host.parse::<IpAddr>().is_ok_and(|ip| ip == addr.ip())
            })
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn connect(
        self: &Arc<Self>,
        host: &str,
        port: u16,
        auto_reconnect: bool,
    ) -> Result<ConnectOutcome> {
        if self.is_own_address(host, port) {
            return Err(NetError::SelfConnect {
                host: host.to_string(),
                port,
            });
        }
        if !self.is_running() {
            return Err(NetError::NotRunning);
        }

        if let Some(peer) = self.peers.find_outbound(host, port) {
            debug!(peer_id = %peer.node_id(), host, port, "already connected");
            return Ok(ConnectOutcome::AlreadyConnected(peer));
        }

        let limit = self.config.handshake_timeout;
        let mut stream = match timeout(limit, TcpStream::connect((host, port))).await {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(NetError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {}:{} timed out", host, port),
                )))
            }
        };

        let (remote_id, decoder) = exchange_identifiers(
            &mut stream,
            Direction::Outbound,
            &self.id,
            self.config.framing,
            limit,
        )
        .await?;

        if let Some(peer) = self.peers.find_inbound(host, &remote_id) {
            debug!(peer_id = %remote_id, host, port, "already connected inbound");
            return Ok(ConnectOutcome::AlreadyConnected(peer));
        }

        let peer = self
            .spawn_peer(stream, remote_id, Direction::Outbound, host.to_string(), port, decoder)
            .await;

        if auto_reconnect && lock(&self.reconnect).register(host, port) {
            debug!(host, port, "reconnect enabled");
        }

        Ok(ConnectOutcome::Connected(peer))
    }

    /// Complete the handshake for an accepted socket on its own task, so a
    /// slow client never holds up the accept loop.
    fn admit(self: &Arc<Self>, stream: TcpStream, remote: SocketAddr) {
        let shared = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut stream = stream;
            let exchanged = tokio::select! {
                exchanged = exchange_identifiers(
                    &mut stream,
                    Direction::Inbound,
                    &shared.id,
                    shared.config.framing,
                    shared.config.handshake_timeout,
                ) => exchanged,
                _ = shutdown.changed() => return,
            };

            match exchanged {
                Ok((remote_id, decoder)) => {
                    if *shared.shutdown.borrow() {
                        return;
                    }
                    shared
                        .spawn_peer(
                            stream,
                            remote_id,
                            Direction::Inbound,
                            remote.ip().to_string(),
                            remote.port(),
                            decoder,
                        )
                        .await;
                }
                Err(e) => warn!(%remote, error = %e, "inbound handshake failed"),
            }
        });
        self.track(handle);
    }

    async fn spawn_peer(
        self: &Arc<Self>,
        stream: TcpStream,
        remote_id: NodeId,
        direction: Direction,
        host: String,
        port: u16,
        decoder: FrameDecoder,
    ) -> Arc<PeerConnection> {
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let (reader, writer) = stream.into_split();
        let peer = PeerConnection::new(
            id,
            remote_id,
            direction,
            host,
            port,
            self.config.framing,
            writer,
        );

        self.peers.insert(peer.clone());
        info!(
            node_id = %self.id,
            peer_id = %peer.node_id(),
            conn = %id,
            ?direction,
            remote = %format!("{}:{}", peer.host(), peer.port()),
            "peer connected"
        );
        self.handler.on_peer_connected(&peer).await;

        let events: Arc<dyn PeerEvents> = self.clone();
        let handle = tokio::spawn(receive_loop(
            peer.clone(),
            reader,
            decoder,
            self.config.read_timeout,
            events,
        ));
        self.track(handle);

        peer
    }

    async fn poll_reconnects(self: &Arc<Self>) {
        let _poll = self.reconnect_poll.lock().await;

        let actions = {
            let mut registry = lock(&self.reconnect);
            registry.poll(Instant::now(), |host, port| {
                self.peers.find_outbound(host, port).is_some()
            })
        };

        for action in actions {
            match action {
                ReconnectAction::GiveUp { host, port, trials } => {
                    info!(host, port, trials, "giving up on reconnect");
                }
                ReconnectAction::Attempt { host, port, trials } => {
                    if !self.handler.on_reconnect_attempt(&host, port, trials).await {
                        lock(&self.reconnect).remove(&host, port);
                        info!(host, port, trials, "reconnect cancelled by handler");
                        continue;
                    }

                    match self.connect(&host, port, true).await {
                        Ok(_) => {
                            info!(host, port, trials, "reconnected");
                            lock(&self.reconnect).record_success(&host, port);
                        }
                        Err(e) => {
                            debug!(host, port, trials, error = %e, "reconnect failed");
                            lock(&self.reconnect).record_failure(&host, port, Instant::now());
                        }
                    }
                }
            }
        }
    }

    /// Stop every peer, wait the grace period, join every task.
    async fn shutdown_peers(&self) {
        let mut first = true;
        loop {
            for peer in self.peers.all() {
                peer.stop();
            }

            let tasks = std::mem::take(&mut *lock(&self.tasks));
            if tasks.is_empty() {
                break;
            }
            if first {
                sleep(self.config.shutdown_grace).await;
                first = false;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "peer task failed");
                }
            }
        }
    }
}

#[async_trait]
impl PeerEvents for Shared {
    async fn frame_received(&self, peer: &Arc<PeerConnection>, message: Message) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.handler.on_message(peer, message).await;
    }

    async fn peer_closed(&self, peer: &Arc<PeerConnection>) {
        if self.peers.remove(peer.id()).is_some() {
            info!(node_id = %self.id, peer_id = %peer.node_id(), conn = %peer.id(), "peer disconnected");
            self.handler.on_peer_disconnected(peer).await;
        }
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) -> Result<()> {
    let mut shutdown = shared.shutdown.subscribe();

    let result = loop {
        if *shutdown.borrow() {
            break Ok(());
        }

        tokio::select! {
            _ = shutdown.changed() => continue,
            accepted = timeout(shared.config.accept_timeout, listener.accept()) => match accepted {
                // Bounded wait expired; fall through to the monitor.
                Err(_) => {}
                Ok(Ok((stream, remote))) => {
                    debug!(%remote, "inbound connection");
                    shared.admit(stream, remote);
                }
                Ok(Err(e)) => {
                    error!(node_id = %shared.id, error = %e, "accept failed");
                    break Err(NetError::Accept(e));
                }
            },
        }

        shared.poll_reconnects().await;
    };

    shared.shutdown_peers().await;
    drop(listener);
    result
}

async fn bind(host: &str, port: u16) -> io::Result<TcpListener> {
    let mut last_err = None;
    for addr in lookup_host((host, port)).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        match socket.bind(addr) {
            Ok(()) => return socket.listen(LISTEN_BACKLOG),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{} resolved to no addresses", host),
        )
    }))
}
