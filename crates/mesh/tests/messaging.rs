//! Messenger tests over real sockets.
//!
//! Covers the request/response exchange between two messengers on
//! loopback, and the failure taxonomy of `send`: unreachable peer,
//! unregistered path, undecodable response body.

use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;

use meshlink_core::NodeIdentity;
use meshlink_mesh::{MeshError, Messenger, Payload, PeerDescriptor};

// =============================================================================
// Helpers
// =============================================================================

fn free_tcp_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn loopback_identity(port: u16) -> NodeIdentity {
    NodeIdentity::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port).unwrap()
}

fn descriptor_for(identity: &NodeIdentity) -> PeerDescriptor {
    PeerDescriptor::from(identity)
}

/// Serve a messenger on a fresh loopback port; returns it with the
/// shutdown sender kept alive for the test's duration.
async fn serve_messenger(messenger: &Messenger) -> watch::Sender<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    messenger.serve(shutdown_rx).await.unwrap();
    shutdown_tx
}

// =============================================================================
// Request/response exchange
// =============================================================================

#[tokio::test]
async fn test_registered_handler_answers_requests() {
    let identity = loopback_identity(free_tcp_port());
    let server = Messenger::new(identity.clone());
    server
        .register("/ping", |_, ctx| {
            let mut reply = Payload::new();
            reply.insert("id".into(), json!(ctx.local.id().as_str()));
            reply
        })
        .await;
    let _shutdown = serve_messenger(&server).await;

    let caller = Messenger::new(loopback_identity(free_tcp_port()));
    let reply = caller
        .send(&descriptor_for(&identity), "/ping", Payload::new())
        .await
        .unwrap();

    assert_eq!(reply.get("id"), Some(&json!(identity.id().as_str())));
}

#[tokio::test]
async fn test_handler_sees_request_payload() {
    let identity = loopback_identity(free_tcp_port());
    let server = Messenger::new(identity.clone());
    server
        .register("/echo", |payload, _| {
            let mut reply = Payload::new();
            reply.insert("echoed".into(), json!(payload));
            reply
        })
        .await;
    let _shutdown = serve_messenger(&server).await;

    let mut payload = Payload::new();
    payload.insert("value".into(), json!(42));

    let caller = Messenger::new(loopback_identity(free_tcp_port()));
    let reply = caller
        .send(&descriptor_for(&identity), "/echo", payload)
        .await
        .unwrap();

    assert_eq!(reply.get("echoed"), Some(&json!({ "value": 42 })));
}

// =============================================================================
// Failure taxonomy
// =============================================================================

#[tokio::test]
async fn test_send_to_closed_port_fails_fast() {
    let nobody = loopback_identity(free_tcp_port());
    let timeout = Duration::from_secs(2);
    let caller = Messenger::new(loopback_identity(free_tcp_port())).with_send_timeout(timeout);

    let started = Instant::now();
    let err = caller
        .send(&descriptor_for(&nobody), "/ping", Payload::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MeshError::ConnectionFailed { .. }));
    assert!(started.elapsed() < timeout + Duration::from_secs(1));
}

#[tokio::test]
async fn test_unregistered_path_is_not_found_and_server_survives() {
    let identity = loopback_identity(free_tcp_port());
    let server = Messenger::new(identity.clone());
    server
        .register("/ping", |_, _| {
            let mut reply = Payload::new();
            reply.insert("pong".into(), json!(true));
            reply
        })
        .await;
    let _shutdown = serve_messenger(&server).await;

    let caller = Messenger::new(loopback_identity(free_tcp_port()));
    let err = caller
        .send(&descriptor_for(&identity), "/unregistered", Payload::new())
        .await
        .unwrap_err();
    match err {
        MeshError::PeerStatus { status, .. } => assert_eq!(status.as_u16(), 404),
        other => panic!("expected PeerStatus, got {:?}", other),
    }

    // The serving loop must still answer after the miss.
    let reply = caller
        .send(&descriptor_for(&identity), "/ping", Payload::new())
        .await
        .unwrap();
    assert_eq!(reply.get("pong"), Some(&json!(true)));
}

#[tokio::test]
async fn test_non_object_response_body_is_malformed() {
    // A server that answers 200 with a body that is not a JSON object.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf).await;
        let body = b"[1,2,3]";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();
    });

    let peer = PeerDescriptor::new(addr.ip(), addr.port());
    let caller = Messenger::new(loopback_identity(free_tcp_port()));
    let err = caller.send(&peer, "/ping", Payload::new()).await.unwrap_err();
    assert!(matches!(err, MeshError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_re_registration_replaces_handler() {
    let identity = loopback_identity(free_tcp_port());
    let server = Messenger::new(identity.clone());
    server
        .register("/version", |_, _| {
            let mut reply = Payload::new();
            reply.insert("v".into(), json!(1));
            reply
        })
        .await;
    server
        .register("/version", |_, _| {
            let mut reply = Payload::new();
            reply.insert("v".into(), json!(2));
            reply
        })
        .await;
    let _shutdown = serve_messenger(&server).await;

    let caller = Messenger::new(loopback_identity(free_tcp_port()));
    let reply = caller
        .send(&descriptor_for(&identity), "/version", Payload::new())
        .await
        .unwrap();
    assert_eq!(reply.get("v"), Some(&json!(2)));
}
