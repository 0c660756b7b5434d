#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! WebSocket acceptance tests against a real listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use peerwire_core::config::SessionConfig;
use peerwire_relay::Relay;
use peerwire_relay::bus::{BusClient, MemoryBus};
use peerwire_relay::server::{self, AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);
const WS_PATH: &str = "/video/connections";

async fn start_server() -> (SocketAddr, Arc<Relay>) {
    start_server_with_limit(64 * 1024).await
}

async fn start_server_with_limit(max_frame_bytes: usize) -> (SocketAddr, Arc<Relay>) {
    let bus: Arc<dyn BusClient> = Arc::new(MemoryBus::new());
    let relay = Arc::new(Relay::new(bus, SessionConfig::default()));
    let router = server::build_router(
        AppState {
            relay: Arc::clone(&relay),
            max_frame_bytes,
        },
        WS_PATH,
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, router, std::future::pending()));
    (addr, relay)
}

async fn connect(addr: SocketAddr, me: &str, peer: &str) -> Client {
    let url = format!("ws://{addr}{WS_PATH}?userID={me}&peerID={peer}");
    let (client, _response) = connect_async(url).await.unwrap();
    client
}

async fn wait_for_sessions(relay: &Relay, expected: usize) {
    timeout(WAIT, async {
        while relay.session_count().await != expected {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn next_data(client: &mut Client) -> Message {
    loop {
        let msg = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        if msg.is_text() || msg.is_binary() {
            return msg;
        }
    }
}

#[tokio::test]
async fn paired_clients_exchange_frames() {
    let (addr, relay) = start_server().await;
    let mut alice = connect(addr, "alice", "bob").await;
    let mut bob = connect(addr, "bob", "alice").await;
    wait_for_sessions(&relay, 2).await;

    alice.send(Message::text("offer")).await.unwrap();
    assert_eq!(next_data(&mut bob).await, Message::text("offer"));

    bob.send(Message::binary(vec![0xde, 0xad, 0xbe, 0xef]))
        .await
        .unwrap();
    assert_eq!(
        next_data(&mut alice).await,
        Message::binary(vec![0xde, 0xad, 0xbe, 0xef])
    );

    // Neither side hears its own frame back.
    assert!(
        timeout(Duration::from_millis(100), alice.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn client_close_ends_the_session() {
    let (addr, relay) = start_server().await;
    let mut alice = connect(addr, "alice", "bob").await;
    wait_for_sessions(&relay, 1).await;

    alice.close(None).await.unwrap();
    wait_for_sessions(&relay, 0).await;
}

#[tokio::test]
async fn invalid_participant_is_rejected_before_upgrade() {
    let (addr, relay) = start_server().await;

    for query in [
        "userID=&peerID=bob",
        "peerID=bob",
        "userID=a.b&peerID=bob",
        "userID=a-b&peerID=c",
    ] {
        let url = format!("ws://{addr}{WS_PATH}?{query}");
        let err = connect_async(url).await.unwrap_err();
        assert!(
            matches!(&err, WsError::Http(resp) if resp.status() == 400),
            "unexpected error for {query}: {err}"
        );
    }
    assert_eq!(relay.session_count().await, 0);
}

#[tokio::test]
async fn health_reports_session_count() {
    let (addr, relay) = start_server().await;
    let _alice = connect(addr, "alice", "bob").await;
    wait_for_sessions(&relay, 1).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sessions"], 1);
}

#[tokio::test]
async fn oversized_frame_ends_the_session() {
    let (addr, relay) = start_server_with_limit(1024).await;
    let mut alice = connect(addr, "alice", "bob").await;
    let mut bob = connect(addr, "bob", "alice").await;
    wait_for_sessions(&relay, 2).await;

    alice.send(Message::text("x".repeat(4096))).await.unwrap();

    wait_for_sessions(&relay, 1).await;
    // Bob stays paired and never sees the rejected frame.
    assert!(
        timeout(Duration::from_millis(100), bob.next())
            .await
            .is_err()
    );
}
