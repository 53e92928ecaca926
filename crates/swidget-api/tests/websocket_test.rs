#![allow(clippy::unwrap_used)]
// Integration tests for `WebSocketChannel` against local socket servers.

use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::Receiver;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use swidget_api::{
    ChannelState, InboundMessage, MessageKind, ReconnectPolicy, StopReason, TransportConfig, WebSocketChannel,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_failed_attempts: 5,
        reconnect_delay: Duration::from_millis(10),
        handshake_timeout: Duration::from_secs(2),
    }
}

fn ws_url(addr: std::net::SocketAddr) -> Url {
    Url::parse(&format!("ws://{addr}/api/v1/sock?x-secret-key=test")).unwrap()
}

fn channel_for(addr: std::net::SocketAddr) -> (WebSocketChannel, Receiver<InboundMessage>) {
    WebSocketChannel::new(ws_url(addr), &TransportConfig::default(), fast_policy()).unwrap()
}

async fn next_text<S>(stream: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            _ => continue,
        }
    }
}

// ── Failure classification ──────────────────────────────────────────

#[tokio::test]
async fn test_handshake_401_stops_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0_u8; 1024];
        let _ = stream.read(&mut buf).await.unwrap();
        stream
            .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    let (channel, _inbound) = channel_for(addr);
    channel.listen().await;
    server.await.unwrap();

    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(channel.stop_reason(), Some(StopReason::AuthorizationFailure));
    assert_eq!(channel.failed_attempts(), 0);
}

#[tokio::test]
async fn test_401_after_dropped_handshakes_stops_as_auth_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // Hang up on the first two upgrades before answering.
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        }
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0_u8; 1024];
        let _ = stream.read(&mut buf).await.unwrap();
        stream
            .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    let (channel, _inbound) = channel_for(addr);
    tokio::time::timeout(Duration::from_secs(10), channel.listen())
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(channel.stop_reason(), Some(StopReason::AuthorizationFailure));
    assert_eq!(channel.failed_attempts(), 2);
}

#[tokio::test]
async fn test_other_handshake_status_stops_as_unknown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0_u8; 1024];
        let _ = stream.read(&mut buf).await.unwrap();
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    let (channel, _inbound) = channel_for(addr);
    channel.listen().await;

    assert_eq!(channel.stop_reason(), Some(StopReason::Unknown));
}

#[tokio::test]
async fn test_refused_connection_exhausts_retries() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let (channel, _inbound) = channel_for(addr);
    tokio::time::timeout(Duration::from_secs(10), channel.listen())
        .await
        .unwrap();

    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(channel.stop_reason(), Some(StopReason::TooManyRetries));
    assert_eq!(channel.failed_attempts(), 5);
}

// ── Live session ────────────────────────────────────────────────────

#[tokio::test]
async fn test_bootstrap_dispatch_and_send() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let first = next_text(&mut ws).await;
        let second = next_text(&mut ws).await;

        ws.send(Message::text(
            json!({
                "request_id": "state",
                "connection": { "rssi": -60 },
                "host": { "components": { "0": { "toggle": { "state": "on" } } } }
            })
            .to_string(),
        ))
        .await
        .unwrap();

        let command = next_text(&mut ws).await;

        // Drain until the client closes.
        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                break;
            }
        }
        (first, second, command)
    });

    let (channel, mut inbound) = channel_for(addr);
    channel.start().await;

    let message = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.kind(), MessageKind::State);
    assert_eq!(message.body["connection"]["rssi"], -60);
    assert!(channel.is_connected());

    let body = json!({ "host": { "components": { "0": { "toggle": { "state": "off" } } } } });
    channel.send_command(&body).unwrap();

    let (first, second, command) = tokio::time::timeout(Duration::from_secs(5), async {
        // The server finishes once it sees our close frame.
        let handle = tokio::spawn({
            let channel = channel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                channel.close().await;
            }
        });
        let result = server.await.unwrap();
        handle.await.unwrap();
        result
    })
    .await
    .unwrap();

    assert_eq!(first, json!({ "type": "summary", "request_id": "1" }));
    assert_eq!(second, json!({ "type": "state", "request_id": "2" }));
    assert_eq!(command["type"], "command");
    assert_eq!(command["request_id"], "command");
    let payload: Value = serde_json::from_str(command["payload"].as_str().unwrap()).unwrap();
    assert_eq!(payload, body);

    // Second close is a no-op.
    channel.close().await;
    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(channel.stop_reason(), Some(StopReason::Closed));
    assert!(channel.send("{}").is_err());
}

#[tokio::test]
async fn test_peer_close_triggers_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        for round in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = next_text(&mut ws).await;
            let _ = next_text(&mut ws).await;
            ws.send(Message::text(
                json!({ "request_id": "DYNAMIC_UPDATE", "round": round }).to_string(),
            ))
            .await
            .unwrap();
            if round == 0 {
                ws.close(None).await.unwrap();
            } else {
                while let Some(Ok(frame)) = ws.next().await {
                    if frame.is_close() {
                        break;
                    }
                }
            }
        }
    });

    let (channel, mut inbound) = channel_for(addr);
    channel.start().await;

    for expected in 0..2 {
        let message = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.kind(), MessageKind::Summary);
        assert_eq!(message.body["round"], expected);
    }

    channel.close().await;
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(channel.stop_reason(), Some(StopReason::Closed));
    assert_eq!(channel.failed_attempts(), 0);
}
