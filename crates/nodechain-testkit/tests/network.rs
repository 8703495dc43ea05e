//! Multi-node scenarios over real loopback sockets.

use std::time::Duration;

use serde_json::json;

use nodechain_net::{Direction, Framing, Message, NetError, Node, NodeId, ReconnectPolicy};
use nodechain_testkit::fixtures::{
    eventually, init_tracing, loopback_config, spawn_node, spawn_node_with, ChannelHandler,
    NodeEvent,
};

const LOCALHOST: &str = "127.0.0.1";

async fn stop_all(nodes: &[&Node]) {
    for node in nodes {
        node.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_handshake_registers_both_sides() {
    init_tracing();
    let (a, _a_events) = spawn_node("node-a").await.unwrap();
    let (b, _b_events) = spawn_node("node-b").await.unwrap();

    let outcome = b.connect(LOCALHOST, a.port(), false).await.unwrap();
    assert!(outcome.is_new());
    assert_eq!(outcome.peer().node_id(), &NodeId::from("node-a"));
    assert_eq!(outcome.peer().direction(), Direction::Outbound);

    assert!(eventually(|| a.peer_counts() == (1, 0)).await);
    assert_eq!(a.inbound_peers()[0].node_id(), &NodeId::from("node-b"));
    assert_eq!(b.peer_counts(), (0, 1));
    assert_eq!(b.outbound_peers()[0].node_id(), &NodeId::from("node-a"));

    stop_all(&[&a, &b]).await;
}

#[tokio::test]
async fn test_broadcast_text_reaches_peer() {
    let (a, _a_events) = spawn_node("node-a").await.unwrap();
    let (b, mut b_events) = spawn_node("node-b").await.unwrap();
    b.connect(LOCALHOST, a.port(), false).await.unwrap();
    assert!(eventually(|| a.peer_counts() == (1, 0)).await);

    assert_eq!(a.send_to_all("hello", &[]).await.unwrap(), 1);

    let (from, message) = b_events.next_message().await.unwrap();
    assert_eq!(from, NodeId::from("node-a"));
    assert_eq!(message, Message::Text("hello".into()));
    assert!(eventually(|| b.messages_received() == 1).await);

    stop_all(&[&a, &b]).await;
}

#[tokio::test]
async fn test_structured_message_reaches_peer() {
    let (a, _a_events) = spawn_node("node-a").await.unwrap();
    let (b, mut b_events) = spawn_node("node-b").await.unwrap();
    b.connect(LOCALHOST, a.port(), false).await.unwrap();
    assert!(eventually(|| a.peer_counts() == (1, 0)).await);

    let peer = a.inbound_peers().remove(0);
    a.send_to_one(&peer, json!({"kind": "ping"})).await.unwrap();

    let (_, message) = b_events.next_message().await.unwrap();
    assert_eq!(message.as_json(), Some(&json!({"kind": "ping"})));

    stop_all(&[&a, &b]).await;
}

#[tokio::test]
async fn test_messages_arrive_in_order() {
    let (a, mut a_events) = spawn_node("node-a").await.unwrap();
    let (b, _b_events) = spawn_node("node-b").await.unwrap();
    let peer = b.connect(LOCALHOST, a.port(), false).await.unwrap().peer().clone();
    assert!(eventually(|| a.peer_counts() == (1, 0)).await);

    for n in 0..20 {
        b.send_to_one(&peer, json!({"n": n})).await.unwrap();
    }

    for n in 0..20 {
        let (_, message) = a_events.next_message().await.unwrap();
        assert_eq!(message.as_json(), Some(&json!({"n": n})));
    }

    stop_all(&[&a, &b]).await;
}

#[tokio::test]
async fn test_broadcast_respects_exclusions() {
    let (hub, _hub_events) = spawn_node("hub").await.unwrap();
    let (b, mut b_events) = spawn_node("node-b").await.unwrap();
    let (c, mut c_events) = spawn_node("node-c").await.unwrap();
    b.connect(LOCALHOST, hub.port(), false).await.unwrap();
    c.connect(LOCALHOST, hub.port(), false).await.unwrap();
    assert!(eventually(|| hub.peer_counts() == (2, 0)).await);

    let excluded = hub
        .find_peers(&NodeId::from("node-b"))
        .iter()
        .map(|p| p.id())
        .collect::<Vec<_>>();
    assert_eq!(hub.send_to_all("only c", &excluded).await.unwrap(), 1);

    let (_, message) = c_events.next_message().await.unwrap();
    assert_eq!(message.as_text(), Some("only c"));

    // Anything b receives next must be the follow-up, not the excluded one.
    hub.send_to_all("everyone", &[]).await.unwrap();
    let (_, message) = b_events.next_message().await.unwrap();
    assert_eq!(message.as_text(), Some("everyone"));

    stop_all(&[&hub, &b, &c]).await;
}

#[tokio::test]
async fn test_broadcast_skips_stopped_peer() {
    let (hub, _hub_events) = spawn_node("hub").await.unwrap();
    let (b, _b_events) = spawn_node("node-b").await.unwrap();
    let (c, mut c_events) = spawn_node("node-c").await.unwrap();
    b.connect(LOCALHOST, hub.port(), false).await.unwrap();
    c.connect(LOCALHOST, hub.port(), false).await.unwrap();
    assert!(eventually(|| hub.peer_counts() == (2, 0)).await);

    // Stop the hub's link to b right before broadcasting.
    let to_b = hub.find_peers(&NodeId::from("node-b")).remove(0);
    to_b.stop();
    assert_eq!(hub.send_to_all("still delivered", &[]).await.unwrap(), 1);

    let (_, message) = c_events.next_message().await.unwrap();
    assert_eq!(message.as_text(), Some("still delivered"));

    assert!(eventually(|| hub.peer_counts() == (1, 0)).await);
    assert_eq!(hub.all_peers()[0].node_id(), &NodeId::from("node-c"));
    assert!(eventually(|| b.peer_counts() == (0, 0)).await);

    stop_all(&[&hub, &b, &c]).await;
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (a, _a_events) = spawn_node("node-a").await.unwrap();
    let (b, _b_events) = spawn_node("node-b").await.unwrap();

    let first = b.connect(LOCALHOST, a.port(), false).await.unwrap();
    let second = b.connect(LOCALHOST, a.port(), false).await.unwrap();
    assert!(first.is_new());
    assert!(!second.is_new());
    assert_eq!(first.peer().id(), second.peer().id());

    // a already holds an inbound link from b, so dialling back adds nothing.
    assert!(eventually(|| a.peer_counts() == (1, 0)).await);
    let back = a.connect(LOCALHOST, b.port(), false).await.unwrap();
    assert!(!back.is_new());
    assert_eq!(back.peer().direction(), Direction::Inbound);
    assert_eq!(a.peer_counts(), (1, 0));

    stop_all(&[&a, &b]).await;
}

#[tokio::test]
async fn test_refuses_self_connect() {
    let (a, _a_events) = spawn_node("node-a").await.unwrap();
    assert!(matches!(
        a.connect(LOCALHOST, a.port(), false).await,
        Err(NetError::SelfConnect { .. })
    ));
    a.stop().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_notifies_both_sides() {
    let (a, mut a_events) = spawn_node("node-a").await.unwrap();
    let (b, mut b_events) = spawn_node("node-b").await.unwrap();
    let peer = b.connect(LOCALHOST, a.port(), false).await.unwrap().peer().clone();
    assert!(eventually(|| a.peer_counts() == (1, 0)).await);

    // Only the dialling side may disconnect.
    let inbound = a.inbound_peers().remove(0);
    assert!(matches!(a.disconnect(&inbound), Err(NetError::PeerNotConnected(_))));

    b.disconnect(&peer).unwrap();

    assert!(eventually(|| b.peer_counts() == (0, 0)).await);
    assert!(eventually(|| a.peer_counts() == (0, 0)).await);

    let disconnected = |events: Vec<NodeEvent>| {
        events
            .iter()
            .any(|e| matches!(e, NodeEvent::Disconnected { .. }))
    };
    assert!(disconnected(b_events.drain()));
    assert!(disconnected(a_events.drain()));
    assert!(b.disconnect(&peer).is_err());

    stop_all(&[&a, &b]).await;
}

#[tokio::test]
async fn test_stop_closes_peer_links() {
    let (a, _a_events) = spawn_node("node-a").await.unwrap();
    let (b, _b_events) = spawn_node("node-b").await.unwrap();
    b.connect(LOCALHOST, a.port(), false).await.unwrap();
    assert!(eventually(|| a.peer_counts() == (1, 0)).await);

    a.stop().await.unwrap();
    assert_eq!(a.peer_counts(), (0, 0));
    assert!(eventually(|| b.peer_counts() == (0, 0)).await);

    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_length_prefixed_framing_carries_delimiter_bytes() {
    let config = |id: &str| loopback_config(id).with_framing(Framing::LengthPrefixed);
    let (a, _a_events) = spawn_node_with(config("node-a")).await.unwrap();
    let (b, mut b_events) = spawn_node_with(config("node-b")).await.unwrap();
    b.connect(LOCALHOST, a.port(), false).await.unwrap();
    assert!(eventually(|| a.peer_counts() == (1, 0)).await);

    let payload = vec![0xff, 0x04, 0x00, 0x04];
    a.send_to_all(payload.clone(), &[]).await.unwrap();

    let (_, message) = b_events.next_message().await.unwrap();
    assert_eq!(message.as_bytes(), Some(payload.as_slice()));

    stop_all(&[&a, &b]).await;
}

#[tokio::test]
async fn test_reconnect_trials_rise_then_reset() {
    init_tracing();
    let (b, _b_events) = spawn_node("node-b").await.unwrap();
    let b_port = b.port();

    // A long accept timeout keeps the accept loop from polling on its own,
    // so only the explicit polls below drive the monitor.
    let mut a_config = loopback_config("node-a").with_reconnect(ReconnectPolicy::immediate());
    a_config.accept_timeout = Duration::from_secs(30);
    let (a, mut a_events) = spawn_node_with(a_config).await.unwrap();

    a.connect(LOCALHOST, b_port, true).await.unwrap();
    assert_eq!(a.reconnect_entries().len(), 1);
    assert_eq!(a.reconnect_entries()[0].trials, 0);

    b.stop().await.unwrap();
    assert!(eventually(|| a.peer_counts() == (0, 0)).await);

    a.poll_reconnects().await;
    assert_eq!(a.reconnect_entries()[0].trials, 1);
    a.poll_reconnects().await;
    assert_eq!(a.reconnect_entries()[0].trials, 2);

    let attempts: Vec<u32> = a_events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            NodeEvent::ReconnectAttempt { trials, .. } => Some(trials),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);

    let mut b_config = loopback_config("node-b");
    b_config.port = b_port;
    let (b, _b_events) = spawn_node_with(b_config).await.unwrap();

    a.poll_reconnects().await;
    assert_eq!(a.peer_counts(), (0, 1));
    assert_eq!(a.reconnect_entries().len(), 1);
    assert_eq!(a.reconnect_entries()[0].trials, 0);

    a.poll_reconnects().await;
    assert_eq!(a.reconnect_entries()[0].trials, 0);

    stop_all(&[&a, &b]).await;
}

#[tokio::test]
async fn test_handler_can_cancel_reconnect() {
    let (b, _b_events) = spawn_node("node-b").await.unwrap();

    let mut a_config = loopback_config("node-a").with_reconnect(ReconnectPolicy::immediate());
    a_config.accept_timeout = Duration::from_secs(30);
    let (handler, _a_events) = ChannelHandler::with_reconnect(false);
    let a = Node::new(a_config, handler);
    a.start().await.unwrap();

    a.connect(LOCALHOST, b.port(), true).await.unwrap();
    b.stop().await.unwrap();
    assert!(eventually(|| a.peer_counts() == (0, 0)).await);

    a.poll_reconnects().await;
    assert!(a.reconnect_entries().is_empty());

    a.stop().await.unwrap();
}
