//! End-to-end tests over real WebSockets.
//!
//! Each test serves the gateway router on an ephemeral port and talks to it
//! with a `tokio-tungstenite` client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::{SinkExt, StreamExt};
use relay_test_utils::TestRelay;
use serde_json::{json, Value};
use session_relay::gateway::{gateway_router, GatewayState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

async fn start_gateway() -> (SocketAddr, TestRelay) {
    start_gateway_with_buffer(32).await
}

async fn start_gateway_with_buffer(connection_buffer: usize) -> (SocketAddr, TestRelay) {
    let relay = TestRelay::start(false);
    let app = gateway_router(GatewayState {
        relay: relay.handle.clone(),
        connection_buffer,
        cancel_token: relay.handle.child_token(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, relay)
}

/// Connect and consume the hello frame. Returns the client and its ID.
async fn open(addr: SocketAddr) -> (Client, String) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let hello = next_json(&mut ws).await;
    assert_eq!(hello["event"], "connected");
    let conn_id = hello["data"]["conn_id"]
        .as_str()
        .expect("hello carries conn_id")
        .to_string();
    (ws, conn_id)
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("no frame in time")
            .expect("stream ended")
            .expect("receive failed");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(ws: &mut Client, event: Value) {
    ws.send(Message::Text(event.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_hello_then_join_snapshot() {
    let (addr, _relay) = start_gateway().await;
    let (mut ws, conn_id) = open(addr).await;

    send(&mut ws, json!({"event": "join", "data": "R1"})).await;

    assert_eq!(
        next_json(&mut ws).await,
        json!({"event": "member-joined", "data": {"conn_id": conn_id, "members": [conn_id]}})
    );
}

#[tokio::test]
async fn test_chat_echoed_to_every_member() {
    let (addr, _relay) = start_gateway().await;
    let (mut alice, alice_id) = open(addr).await;
    let (mut bob, bob_id) = open(addr).await;

    send(&mut alice, json!({"event": "join", "data": "R1"})).await;
    assert_eq!(next_json(&mut alice).await["event"], "member-joined");
    send(&mut bob, json!({"event": "join", "data": "R1"})).await;
    assert_eq!(
        next_json(&mut bob).await["data"]["members"],
        json!([alice_id, bob_id])
    );
    assert_eq!(next_json(&mut alice).await["event"], "member-joined");

    send(
        &mut alice,
        json!({"event": "chat", "data": {"payload": "hi", "sender_name": "Alice"}}),
    )
    .await;

    let expected = json!({
        "event": "chat",
        "data": {"payload": "hi", "sender_name": "Alice", "sender": alice_id}
    });
    assert_eq!(next_json(&mut alice).await, expected);
    assert_eq!(next_json(&mut bob).await, expected);
}

#[tokio::test]
async fn test_joiner_receives_history_longer_than_its_mailbox() {
    let (addr, _relay) = start_gateway_with_buffer(4).await;
    let (mut alice, alice_id) = open(addr).await;

    send(&mut alice, json!({"event": "join", "data": "R1"})).await;
    assert_eq!(next_json(&mut alice).await["event"], "member-joined");
    for i in 0..10 {
        send(
            &mut alice,
            json!({"event": "chat", "data": {"payload": format!("m{i}"), "sender_name": "Alice"}}),
        )
        .await;
        assert_eq!(next_json(&mut alice).await["event"], "chat");
    }

    let (mut bob, _) = open(addr).await;
    send(&mut bob, json!({"event": "join", "data": "R1"})).await;

    assert_eq!(next_json(&mut bob).await["event"], "member-joined");
    for i in 0..10 {
        assert_eq!(
            next_json(&mut bob).await,
            json!({
                "event": "chat",
                "data": {"payload": format!("m{i}"), "sender_name": "Alice", "sender": alice_id}
            })
        );
    }
}

#[tokio::test]
async fn test_single_slot_mailbox_still_delivers_after_hello() {
    let (addr, _relay) = start_gateway_with_buffer(1).await;
    let (mut ws, conn_id) = open(addr).await;

    send(&mut ws, json!({"event": "join", "data": "R1"})).await;

    assert_eq!(
        next_json(&mut ws).await,
        json!({"event": "member-joined", "data": {"conn_id": conn_id, "members": [conn_id]}})
    );
}

#[tokio::test]
async fn test_undecodable_frame_gets_error_event() {
    let (addr, _relay) = start_gateway().await;
    let (mut ws, _) = open(addr).await;

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    send(&mut ws, json!({"event": "disconnect", "data": null})).await;

    for _ in 0..2 {
        let frame = next_json(&mut ws).await;
        assert_eq!(frame["event"], "error");
        assert_eq!(frame["data"]["code"], 1);
    }

    // The connection stays usable.
    send(&mut ws, json!({"event": "join", "data": "R1"})).await;
    assert_eq!(next_json(&mut ws).await["event"], "member-joined");
}

#[tokio::test]
async fn test_socket_close_sends_member_left() {
    let (addr, relay) = start_gateway().await;
    let (mut alice, _) = open(addr).await;
    let (mut bob, bob_id) = open(addr).await;

    send(&mut alice, json!({"event": "join", "data": "R1"})).await;
    assert_eq!(next_json(&mut alice).await["event"], "member-joined");
    send(&mut bob, json!({"event": "join", "data": "R1"})).await;
    assert_eq!(next_json(&mut alice).await["event"], "member-joined");

    bob.close(None).await.unwrap();

    assert_eq!(
        next_json(&mut alice).await,
        json!({"event": "member-left", "data": {"conn_id": bob_id}})
    );
    assert_eq!(relay.status().await.connection_count, 1);
}

#[tokio::test]
async fn test_upgrade_refused_after_relay_shutdown() {
    let (addr, relay) = start_gateway().await;
    relay.handle.shutdown(FRAME_TIMEOUT).await.unwrap();

    match connect_async(format!("ws://{addr}/ws")).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 503);
        }
        Err(e) => unreachable!("expected 503 refusal, got {e}"),
        Ok(_) => unreachable!("upgrade accepted during shutdown"),
    }
}
