//! The websocket subscription channel against a local websocket server.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::Span;
use wallet_watch::monitor::{subscribe_request, LogsSubscription, SignatureFeed, SubscriptionError};

const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

type ServerSocket = WebSocketStream<tokio::net::TcpStream>;

/// Serve exactly one connection with `script`.
async fn serve_once<F, Fut>(script: F) -> SocketAddr
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });
    addr
}

fn channel(addr: SocketAddr, idle_timeout: Duration) -> LogsSubscription {
    LogsSubscription::new(
        format!("ws://{addr}"),
        WALLET,
        Duration::from_secs(2),
        idle_timeout,
        Span::none(),
    )
}

/// Read the subscribe request and check it byte for byte against the expected schema.
async fn expect_subscribe(ws: &mut ServerSocket) {
    let frame = ws.next().await.unwrap().unwrap();
    let request: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(request, subscribe_request(WALLET));
}

fn notification(signature: &str) -> Message {
    Message::Text(
        json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": { "slot": 5208469 },
                    "value": { "signature": signature, "err": null, "logs": [] }
                },
                "subscription": 24040
            }
        })
        .to_string(),
    )
}

#[tokio::test]
async fn test_signatures_are_queued_in_order() {
    let addr = serve_once(|mut ws| async move {
        expect_subscribe(&mut ws).await;
        ws.send(Message::Text(r#"{"jsonrpc":"2.0","result":24040,"id":1}"#.to_string()))
            .await
            .unwrap();
        ws.send(notification("sig-a")).await.unwrap();
        ws.send(Message::Text(r#"{"jsonrpc":"2.0","method":"logsNotification","params":{"result":{"value":{}}}}"#.to_string()))
            .await
            .unwrap();
        ws.send(notification("sig-b")).await.unwrap();
        // keep the connection open
        while ws.next().await.is_some() {}
    })
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = channel(addr, Duration::from_secs(5));
    let task = tokio::spawn(async move { subscription.stream_signatures(tx).await });

    let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("sig-a"));
    assert_eq!(second.as_deref(), Some("sig-b"));
    assert!(rx.try_recv().is_err());

    task.abort();
}

#[tokio::test]
async fn test_rejected_subscription_is_fatal() {
    let addr = serve_once(|mut ws| async move {
        expect_subscribe(&mut ws).await;
        ws.send(Message::Text(
            r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params"},"id":1}"#.to_string(),
        ))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = timeout(
        Duration::from_secs(5),
        channel(addr, Duration::from_secs(5)).stream_signatures(tx),
    )
    .await
    .unwrap();

    match result {
        Err(SubscriptionError::Rejected { code, message }) => {
            assert_eq!(code, Some(-32602));
            assert_eq!(message, "Invalid params");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_close_is_fatal() {
    let addr = serve_once(|mut ws| async move {
        expect_subscribe(&mut ws).await;
        ws.send(Message::Text(r#"{"jsonrpc":"2.0","result":1,"id":1}"#.to_string()))
            .await
            .unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "maintenance".into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = timeout(
        Duration::from_secs(5),
        channel(addr, Duration::from_secs(5)).stream_signatures(tx),
    )
    .await
    .unwrap();

    match result {
        Err(SubscriptionError::Closed { reason }) => assert!(reason.contains("maintenance")),
        other => panic!("expected a close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_garbage_message_is_fatal() {
    let addr = serve_once(|mut ws| async move {
        expect_subscribe(&mut ws).await;
        ws.send(Message::Text(r#"{"jsonrpc":"2.0","result":1,"id":1}"#.to_string()))
            .await
            .unwrap();
        ws.send(Message::Text("<html>bad gateway</html>".to_string()))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = timeout(
        Duration::from_secs(5),
        channel(addr, Duration::from_secs(5)).stream_signatures(tx),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(SubscriptionError::Malformed(_))));
}

#[tokio::test]
async fn test_silent_server_stalls_the_channel() {
    let addr = serve_once(|mut ws| async move {
        expect_subscribe(&mut ws).await;
        ws.send(Message::Text(r#"{"jsonrpc":"2.0","result":1,"id":1}"#.to_string()))
            .await
            .unwrap();
        // hold the socket without reading, so pings go unanswered
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(ws);
    })
    .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = timeout(
        Duration::from_secs(5),
        channel(addr, Duration::from_millis(200)).stream_signatures(tx),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(SubscriptionError::Stalled(_))));
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_to_connect() {
    // grab a free port and release it
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = channel(addr, Duration::from_secs(5)).stream_signatures(tx).await;
    assert!(matches!(result, Err(SubscriptionError::Connect { .. })));
}

#[tokio::test]
async fn test_invalid_url_is_rejected() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = LogsSubscription::new("not a url", WALLET, Duration::from_secs(1), Duration::from_secs(1), Span::none())
        .stream_signatures(tx)
        .await;
    assert!(matches!(result, Err(SubscriptionError::InvalidUrl { .. })));
}
