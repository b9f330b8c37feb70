//! Tests for Tether concurrency and response correlation.
//!
//! Uses real WebSocket servers on loopback to verify:
//! - Concurrent requests don't block each other at the client level
//! - Response correlation works with out-of-order responses
//! - Timeouts fire instead of blocking forever
//! - Abandoned tickets don't poison later requests

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tether::{RequestFrame, ResponseFrame, Tether, TetherError, TetherOptions};
use tokio::net::TcpListener;
use tokio::sync::Barrier;
use tokio_tungstenite::tungstenite::Message;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn next_request(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> RequestFrame {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("unexpected ws event: {:?}", other),
        }
    }
}

fn echo_response(request: &RequestFrame) -> ResponseFrame {
    ResponseFrame::ok(
        request.rid,
        json!({"echo": request.data.clone(), "uid": request.uid}),
    )
}

/// Server that echoes each request as it arrives.
async fn echo_server(listener: TcpListener, request_count: usize) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    for _ in 0..request_count {
        let request = next_request(&mut ws).await;
        ws.send(Message::Text(echo_response(&request).to_text()))
            .await
            .unwrap();
    }
}

/// Server that collects all requests first, then responds in reverse order.
async fn reordering_server(listener: TcpListener, request_count: usize) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let mut requests = Vec::new();
    for _ in 0..request_count {
        requests.push(next_request(&mut ws).await);
    }

    for request in requests.into_iter().rev() {
        ws.send(Message::Text(echo_response(&request).to_text()))
            .await
            .unwrap();
    }
}

/// Test that concurrent calls with distinct tagged payloads each receive
/// only their own tagged response.
#[tokio::test]
async fn test_concurrent_calls_no_cross_delivery() {
    let request_count = 5;
    let (listener, url) = bind().await;
    let server = tokio::spawn(echo_server(listener, request_count));

    let tether = Tether::connect(&url, "test-app", TetherOptions::default())
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(request_count));
    let mut handles = Vec::new();

    for i in 0..request_count {
        let tether = Arc::clone(&tether);
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let result = tether.call(json!({"tag": i}), &format!("user-{}", i)).await;
            (i, result)
        }));
    }

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        let result = result.unwrap_or_else(|e| panic!("request {} failed: {}", i, e));
        assert_eq!(result["echo"]["tag"], json!(i), "cross-delivered response");
        assert_eq!(result["uid"], json!(format!("user-{}", i)));
    }

    server.abort();
}

/// Test that responses are correctly correlated even when out of order.
#[tokio::test]
async fn test_response_correlation_with_reordering() {
    let request_count = 4;
    let (listener, url) = bind().await;
    let server = tokio::spawn(reordering_server(listener, request_count));

    let tether = Tether::connect(&url, "test-app", TetherOptions::default())
        .await
        .unwrap();

    // Submit everything before awaiting anything, so the server can collect
    // all requests and reverse them
    let mut tickets = Vec::new();
    for i in 0..request_count {
        let ticket = tether.submit(json!({"tag": i}), "u1").await.unwrap();
        tickets.push((i, ticket));
    }

    for (i, ticket) in tickets {
        let result = tether.response(ticket).await.unwrap();
        assert_eq!(result["echo"]["tag"], json!(i), "cross-delivered response");
    }

    server.abort();
}

/// Test that the deadline fires instead of blocking forever.
#[tokio::test]
async fn test_timeout_on_silent_peer() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let options = TetherOptions {
        timeout: Duration::from_millis(300),
    };
    let tether = Tether::connect(&url, "test-app", options).await.unwrap();

    let start = Instant::now();
    let result = tether.call(json!({"prompt": "x"}), "u1").await;
    let elapsed = start.elapsed();

    match result {
        Err(TetherError::Timeout(_)) => {}
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert!(
        elapsed >= Duration::from_millis(300),
        "timed out early: {:?}",
        elapsed
    );

    server.abort();
}

/// Test that an abandoned ticket's late response is discarded and doesn't
/// interfere with later requests.
#[tokio::test]
async fn test_abandoned_ticket_is_harmless() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(echo_server(listener, 2));

    let tether = Tether::connect(&url, "test-app", TetherOptions::default())
        .await
        .unwrap();

    // Submit and drop the ticket - the response becomes an orphan
    let abandoned = tether.submit(json!({"tag": "left"}), "u1").await.unwrap();
    drop(abandoned);

    let result = tether.call(json!({"tag": "kept"}), "u1").await.unwrap();
    assert_eq!(result["echo"]["tag"], "kept");

    server.abort();
}

/// Test that an error frame from the app surfaces as an Execution error for
/// its caller only.
#[tokio::test]
async fn test_error_frame_surfaces_execution_error() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        for _ in 0..2 {
            let request = next_request(&mut ws).await;
            let response = if request.data["fail"] == json!(true) {
                ResponseFrame::err(request.rid, "model exploded")
            } else {
                echo_response(&request)
            };
            ws.send(Message::Text(response.to_text())).await.unwrap();
        }
    });

    let tether = Tether::connect(&url, "test-app", TetherOptions::default())
        .await
        .unwrap();

    let failing = tether.submit(json!({"fail": true}), "u1").await.unwrap();
    let passing = tether.submit(json!({"fail": false}), "u1").await.unwrap();

    match tether.response(failing).await {
        Err(TetherError::Execution(message)) => assert!(message.contains("model exploded")),
        other => panic!("expected Execution, got {:?}", other),
    }

    // The failure above didn't touch the other outstanding request
    let result = tether.response(passing).await.unwrap();
    assert_eq!(result["echo"]["fail"], json!(false));

    server.abort();
}
