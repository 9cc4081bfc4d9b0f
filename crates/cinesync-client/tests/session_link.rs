//! Session client against an in-process websocket server.
//!
//! Covers the connect handshake, room and consent events driven by server
//! pushes, keepalive replies, outbound commands and teardown.

use std::time::Duration;

use cinesync_client::{ConnectionStatus, SessionClient, SessionConfig, SessionEvent};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Test-side handle on the single accepted connection.
struct FakeServer {
    /// Frames received from the client, `stats` requests filtered out.
    inbound: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<String>,
    closed: mpsc::UnboundedReceiver<()>,
}

impl FakeServer {
    fn push(&self, value: Value) {
        self.outbound.send(value.to_string()).unwrap();
    }

    async fn next_message(&mut self) -> Value {
        timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server task ended")
    }
}

async fn start_server() -> (String, FakeServer) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (inbound_tx, inbound) = mpsc::unbounded_channel();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (closed_tx, closed) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut sink, mut source) = ws.split();
        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let value: Value = serde_json::from_str(text.as_str()).unwrap();
                        if value["type"] != "stats" {
                            let _ = inbound_tx.send(value);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                },
                text = outbound_rx.recv() => match text {
                    Some(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = closed_tx.send(());
    });

    (
        format!("ws://{}/ws", addr),
        FakeServer {
            inbound,
            outbound,
            closed,
        },
    )
}

fn config(server: String) -> SessionConfig {
    SessionConfig {
        server,
        ..SessionConfig::default()
    }
}

async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

#[tokio::test]
async fn test_connect_host_and_consent_flow() {
    let (url, mut server) = start_server().await;
    let (client, mut events) = SessionClient::new(config(url));

    client.connect().await.unwrap();
    assert_eq!(client.status(), ConnectionStatus::Connected);
    wait_for(&mut events, |e| {
        *e == SessionEvent::StatusChanged(ConnectionStatus::Connected)
    })
    .await;

    assert!(client.host("example.com/movie.mp4").unwrap());
    let host = server.next_message().await;
    assert_eq!(host["type"], "host");
    assert_eq!(host["url"], "https://example.com/movie.mp4");
    assert_eq!(host["width"], 720);
    assert_eq!(host["height"], 405);

    server.push(json!({"type": "hosted", "roomCode": "ABCD", "width": 1280, "height": 720}));
    let room = wait_for(&mut events, |e| matches!(e, SessionEvent::RoomChanged(_))).await;
    let SessionEvent::RoomChanged(identity) = room else {
        unreachable!()
    };
    assert_eq!(identity.room_code.as_deref(), Some("ABCD"));
    assert!(identity.is_host);

    server.push(json!({
        "type": "prepare",
        "url": "https://example.com/movie.mp4",
        "mediaId": "m1",
        "positionSeconds": 12.5
    }));
    let needed = wait_for(&mut events, |e| matches!(e, SessionEvent::ConsentNeeded(_))).await;
    let SessionEvent::ConsentNeeded(consent) = needed else {
        unreachable!()
    };
    assert_eq!(consent.media_id.as_deref(), Some("m1"));
    assert_eq!(consent.start_seconds, 12.5);
    assert_eq!(client.pending_consent(), Some(consent.clone()));

    let resolved = client.acknowledge_consent(true).unwrap();
    assert_eq!(resolved, consent);
    assert!(client.pending_consent().is_none());
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::ConsentResolved { accepted: true, .. })
    })
    .await;

    client.disconnect();
}

#[tokio::test]
async fn test_ping_gets_pong_and_commands_reach_server() {
    let (url, mut server) = start_server().await;
    let (client, _events) = SessionClient::new(config(url));
    client.connect().await.unwrap();

    server.push(json!({"type": "ping"}));
    assert_eq!(server.next_message().await, json!({"type": "pong"}));

    assert!(client.set_playing(true));
    assert_eq!(
        server.next_message().await,
        json!({"type": "play", "isPlaying": true})
    );

    assert!(client.seek(-3.0));
    assert_eq!(
        server.next_message().await,
        json!({"type": "seek", "positionSeconds": 0.0})
    );

    assert!(client.set_room_layout(99_999, 10));
    assert_eq!(
        server.next_message().await,
        json!({"type": "layout", "width": 3840, "height": 180})
    );

    client.disconnect();
}

#[tokio::test]
async fn test_connect_while_connected_keeps_existing_link() {
    let (url, mut server) = start_server().await;
    let (client, mut events) = SessionClient::new(config(url));
    client.connect().await.unwrap();
    server.push(json!({"type": "joined", "roomCode": "ROOM"}));
    wait_for(&mut events, |e| matches!(e, SessionEvent::RoomChanged(_))).await;

    client.connect().await.unwrap();
    let notice = wait_for(&mut events, |e| matches!(e, SessionEvent::Notice(_))).await;
    assert_eq!(notice, SessionEvent::Notice("already connected".into()));
    assert_eq!(client.status(), ConnectionStatus::Connected);
    // No reconnect happened, so the session was not reset.
    assert_eq!(client.identity().room_code.as_deref(), Some("ROOM"));

    // The fake server accepts once; the original socket still carries traffic.
    server.push(json!({"type": "ping"}));
    assert_eq!(server.next_message().await, json!({"type": "pong"}));
    assert!(server.closed.try_recv().is_err());

    client.disconnect();
}

#[tokio::test]
async fn test_disconnect_resets_session_and_closes_socket() {
    let (url, mut server) = start_server().await;
    let (client, mut events) = SessionClient::new(config(url));
    client.connect().await.unwrap();

    server.push(json!({"type": "joined", "roomCode": "ROOM"}));
    server.push(json!({
        "type": "state",
        "url": "https://example.com/a.mp4",
        "mediaId": "a",
        "isPlaying": true,
        "positionSeconds": 40.0,
        "serverTimeMs": 1000
    }));
    wait_for(&mut events, |e| matches!(e, SessionEvent::StateChanged(_))).await;
    assert_eq!(client.identity().room_code.as_deref(), Some("ROOM"));
    assert!(client.room_state().is_playing);

    client.disconnect();
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(client.identity().room_code.is_none());
    assert!(client.room_state().media_id.is_none());
    assert!(client.pending_consent().is_none());
    assert!(!client.set_playing(false));

    timeout(WAIT, server.closed.recv())
        .await
        .expect("server never saw the socket close");
}

#[tokio::test]
async fn test_server_hangup_drops_to_disconnected() {
    let (url, server) = start_server().await;
    let (client, mut events) = SessionClient::new(config(url));
    client.connect().await.unwrap();

    // Dropping the outbound sender ends the server task, which closes the socket.
    drop(server);
    wait_for(&mut events, |e| {
        *e == SessionEvent::StatusChanged(ConnectionStatus::Disconnected)
    })
    .await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    // A fresh connect is allowed after the loss.
    let (url, _server) = start_server().await;
    let (client, _events) = SessionClient::new(config(url));
    client.connect().await.unwrap();
    assert!(client.is_connected());
    client.disconnect();
}

#[tokio::test]
async fn test_connect_failure_reports_and_stays_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, mut events) = SessionClient::new(config(format!("ws://{}/ws", addr)));
    assert!(client.connect().await.is_err());
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    wait_for(&mut events, |e| matches!(e, SessionEvent::Notice(_))).await;
}

#[tokio::test]
async fn test_join_rejects_empty_code_without_connecting() {
    let (client, _events) = SessionClient::new(SessionConfig::default());
    assert!(client.join("   ").await.is_err());
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}
