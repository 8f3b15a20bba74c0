//! Integration tests for the streaming session against a real WebSocket
//! peer on an ephemeral port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use simbridge::streaming::{StreamState, StreamingSession};

use super::test_helpers::{closed_port, spawn_stream_server, test_config, wait_until};

fn session_for(port: u16) -> StreamingSession {
    StreamingSession::new(&test_config(port, 3009))
}

fn to_json(raw: &str) -> Value {
    serde_json::from_str(raw).expect("client sent json")
}

#[tokio::test]
async fn dispatches_frames_and_audio_to_consumers() {
    let script = vec![
        r#"{"type":"frame","frame":{"seq":1}}"#.to_owned(),
        r#"{"type":"audio","audio":{"seq":1}}"#.to_owned(),
        r#"{"type":"status","status":{"fps":60}}"#.to_owned(),
        r#"{"type":"unknown"}"#.to_owned(),
        "definitely not json".to_owned(),
        r#"{"type":"frame","frame":{"seq":2}}"#.to_owned(),
    ];
    let peer = spawn_stream_server(script, false).await;
    let mut session = session_for(peer.port);

    let frames = Arc::new(AtomicUsize::new(0));
    let audio = Arc::new(AtomicUsize::new(0));
    let frame_counter = Arc::clone(&frames);
    session.set_frame_callback(move |_| {
        frame_counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    });
    let audio_counter = Arc::clone(&audio);
    session.set_audio_callback(move |_| {
        audio_counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    });

    assert!(session.connect().await);
    assert!(wait_until(|| frames.load(Ordering::SeqCst) == 2).await);
    assert_eq!(audio.load(Ordering::SeqCst), 1);
    assert!(session.is_connected(), "malformed messages must not end the loop");

    session.disconnect().await;
}

#[tokio::test]
async fn callbacks_run_sequentially_in_arrival_order() {
    let script = (1..=5)
        .map(|seq| json!({ "type": "frame", "frame": seq }).to_string())
        .collect();
    let peer = spawn_stream_server(script, false).await;
    let mut session = session_for(peer.port);

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicUsize::new(0));
    {
        let seen = Arc::clone(&seen);
        let in_flight = Arc::clone(&in_flight);
        let overlapped = Arc::clone(&overlapped);
        session.set_frame_callback(move |payload| {
            let seen = Arc::clone(&seen);
            let in_flight = Arc::clone(&in_flight);
            let overlapped = Arc::clone(&overlapped);
            async move {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                seen.lock().push(payload);
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });
    }

    assert!(session.connect().await);
    assert!(wait_until(|| seen.lock().len() == 5).await);
    assert_eq!(*seen.lock(), (1..=5).map(Value::from).collect::<Vec<_>>());
    assert_eq!(overlapped.load(Ordering::SeqCst), 0);

    session.disconnect().await;
}

#[tokio::test]
async fn latest_callback_wins() {
    let script = vec![r#"{"type":"frame","frame":1}"#.to_owned()];
    let peer = spawn_stream_server(script, false).await;
    let mut session = session_for(peer.port);

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&first);
    session.set_frame_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    });
    let counter = Arc::clone(&second);
    session.set_frame_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    });

    assert!(session.connect().await);
    assert!(wait_until(|| second.load(Ordering::SeqCst) == 1).await);
    assert_eq!(first.load(Ordering::SeqCst), 0);

    session.disconnect().await;
}

#[tokio::test]
async fn start_streaming_connects_and_sends_start_message() {
    let mut peer = spawn_stream_server(Vec::new(), false).await;
    let mut session = session_for(peer.port);

    assert!(session.start_streaming().await);
    assert_eq!(session.state(), StreamState::Streaming);
    assert_eq!(
        to_json(&peer.next_received().await),
        json!({ "type": "start_streaming", "format": "webrtc" })
    );

    session.disconnect().await;
}

#[tokio::test]
async fn double_start_opens_one_connection() {
    let mut peer = spawn_stream_server(Vec::new(), false).await;
    let mut session = session_for(peer.port);

    assert!(session.start_streaming().await);
    assert!(session.start_streaming().await);

    peer.next_received().await;
    peer.next_received().await;
    assert_eq!(peer.connection_count(), 1);
    assert!(session.is_streaming());

    session.disconnect().await;
}

#[tokio::test]
async fn stop_streaming_keeps_connection_open() {
    let mut peer = spawn_stream_server(Vec::new(), false).await;
    let mut session = session_for(peer.port);

    assert!(session.start_streaming().await);
    session.stop_streaming().await;

    assert_eq!(session.state(), StreamState::Connected);
    peer.next_received().await;
    assert_eq!(
        to_json(&peer.next_received().await),
        json!({ "type": "stop_streaming" })
    );

    session.disconnect().await;
    assert_eq!(session.state(), StreamState::Disconnected);
}

#[tokio::test]
async fn stop_streaming_while_disconnected_is_a_no_op() {
    let peer = spawn_stream_server(Vec::new(), false).await;
    let mut session = session_for(peer.port);

    session.stop_streaming().await;

    assert_eq!(session.state(), StreamState::Disconnected);
    assert_eq!(peer.connection_count(), 0);
}

#[tokio::test]
async fn connect_failure_stays_disconnected() {
    let port = closed_port().await;
    let mut session = session_for(port);

    assert!(!session.connect().await);
    assert!(!session.start_streaming().await);
    assert_eq!(session.state(), StreamState::Disconnected);
}

#[tokio::test]
async fn send_message_requires_connection() {
    let port = closed_port().await;
    let session = session_for(port);

    let err = session
        .send_message(&json!({ "type": "ping" }))
        .await
        .expect_err("must fail while disconnected");
    assert!(err.to_string().starts_with("streaming:"));
}

#[tokio::test]
async fn peer_close_returns_to_disconnected() {
    let peer = spawn_stream_server(Vec::new(), true).await;
    let mut session = session_for(peer.port);

    assert!(session.start_streaming().await);
    assert!(wait_until(|| !session.is_connected()).await);
    assert_eq!(session.state(), StreamState::Disconnected);
}

#[tokio::test]
async fn reconnect_after_disconnect_opens_new_connection() {
    let peer = spawn_stream_server(Vec::new(), false).await;
    let mut session = session_for(peer.port);

    assert!(session.connect().await);
    session.disconnect().await;
    assert!(session.connect().await);

    assert!(wait_until(|| peer.connection_count() == 2).await);
    assert_eq!(session.state(), StreamState::Connected);

    session.disconnect().await;
}

#[test]
fn status_reports_urls() {
    let session = session_for(9000);

    let status = session.status();

    assert_eq!(status.state, StreamState::Disconnected);
    assert!(!status.is_connected);
    assert!(!status.is_streaming);
    assert_eq!(status.port, 9000);
    assert_eq!(status.base_url, "http://127.0.0.1:9000");
    assert_eq!(status.stream_url, "http://127.0.0.1:9000/streaming/webrtc-client");
    assert_eq!(session.endpoint(), "ws://127.0.0.1:9000/streaming/webrtc");
}
