//! The host over real sockets on a loopback port.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lanmafia::core::protocol::{ClientMessage, ServerMessage, SessionEndReason};
use lanmafia::core::websocket_host::Host;
use lanmafia::error::ErrorKind;
use lanmafia::EngineConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_host() -> SocketAddr {
    let host = Host::bind("127.0.0.1:0", EngineConfig::default()).await.unwrap();
    let addr = host.local_addr();
    tokio::spawn(host.run());
    addr
}

async fn connect(addr: SocketAddr) -> Socket {
    let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

async fn send(ws: &mut Socket, message: &ClientMessage) {
    let json = serde_json::to_string(message).unwrap();
    ws.send(Message::Text(json)).await.unwrap();
}

/// Next server message, skipping control frames. `None` once the socket closes.
async fn next(ws: &mut Socket) -> Option<ServerMessage> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame within 5s")?;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn next_matching(ws: &mut Socket, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
    loop {
        let message = next(ws).await.expect("socket closed early");
        if pred(&message) {
            return message;
        }
    }
}

#[tokio::test]
async fn join_welcomes_and_first_joiner_hosts() {
    let addr = start_host().await;
    let mut alice = connect(addr).await;
    send(&mut alice, &ClientMessage::Join { name: "alice".into() }).await;
    let welcome = next_matching(&mut alice, |m| matches!(m, ServerMessage::Welcome { .. })).await;
    assert!(matches!(welcome, ServerMessage::Welcome { is_host: true, .. }));

    let mut bob = connect(addr).await;
    send(&mut bob, &ClientMessage::Join { name: "bob".into() }).await;
    let welcome = next_matching(&mut bob, |m| matches!(m, ServerMessage::Welcome { .. })).await;
    assert!(matches!(welcome, ServerMessage::Welcome { is_host: false, .. }));

    // Alice hears about bob through a roster broadcast.
    let roster = next_matching(&mut alice, |m| {
        matches!(m, ServerMessage::RosterUpdated { players } if players.len() == 2)
    })
    .await;
    let ServerMessage::RosterUpdated { players } = roster else {
        unreachable!()
    };
    assert_eq!(players[1].name, "bob");
}

#[tokio::test]
async fn malformed_frames_are_rejected_without_dropping_the_socket() {
    let addr = start_host().await;
    let mut ws = connect(addr).await;
    ws.send(Message::Text("{\"type\":\"teleport\"}".into())).await.unwrap();
    let reply = next(&mut ws).await.unwrap();
    assert!(matches!(reply, ServerMessage::ActionRejected { kind: ErrorKind::Validation, .. }));

    send(&mut ws, &ClientMessage::Join { name: "carol".into() }).await;
    let welcome = next_matching(&mut ws, |m| matches!(m, ServerMessage::Welcome { .. })).await;
    assert!(matches!(welcome, ServerMessage::Welcome { is_host: true, .. }));
}

#[tokio::test]
async fn host_disconnect_ends_the_session_for_everyone() {
    let addr = start_host().await;
    let mut host = connect(addr).await;
    send(&mut host, &ClientMessage::Join { name: "host".into() }).await;
    next_matching(&mut host, |m| matches!(m, ServerMessage::Welcome { .. })).await;

    let mut guest = connect(addr).await;
    send(&mut guest, &ClientMessage::Join { name: "guest".into() }).await;
    next_matching(&mut guest, |m| matches!(m, ServerMessage::Welcome { .. })).await;

    host.close(None).await.unwrap();

    let ended = next_matching(&mut guest, |m| matches!(m, ServerMessage::SessionEnded { .. })).await;
    assert_eq!(ended, ServerMessage::SessionEnded { reason: SessionEndReason::HostLeft });
    // The server closes the socket right after the goodbye.
    assert_eq!(next(&mut guest).await, None);
}
