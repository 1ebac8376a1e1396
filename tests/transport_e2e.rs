//! End-to-end transport tests over loopback TCP.

mod common;

use std::time::Duration;

use common::*;
use localp2p::security::Authenticator;
use localp2p::transport::{HandshakeError, TransportError};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_two_nodes_exchange_message() {
    let (alpha, alpha_port) = start_transport("alpha").await;
    let (beta, _) = start_transport("beta").await;
    let mut inbox = alpha.messages().unwrap();

    let peer_id = beta.connect_to_peer("127.0.0.1", alpha_port).await.unwrap();
    assert_eq!(peer_id, "alpha");
    assert!(has_peer(&beta, "alpha").await);

    let alpha_ref = &alpha;
    assert!(wait_until(WAIT, move || has_peer(alpha_ref, "beta")).await);

    beta.send_message("alpha", "hello").await.unwrap();

    let message = tokio::time::timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(message.kind, "message");
    assert_eq!(message.from, "beta");
    assert_eq!(message.to, "alpha");
    assert_eq!(message.content, "hello");

    let listing = alpha.connections().await;
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].peer_id, "beta");
    assert!(listing[0].authenticated);

    beta.shutdown().await;
    alpha.shutdown().await;
}

#[tokio::test]
async fn test_different_keys_never_authenticate() {
    let (alpha, alpha_port) = start_transport("alpha").await;
    let (beta, _) = start_transport_with("beta", OTHER_PSK, transport_config()).await;

    match beta.connect_to_peer("127.0.0.1", alpha_port).await {
        Err(TransportError::Handshake(_)) => {}
        other => panic!("expected handshake failure, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(alpha.connections().await.is_empty());
    assert!(beta.connections().await.is_empty());

    beta.shutdown().await;
    alpha.shutdown().await;
}

#[tokio::test]
async fn test_silent_client_times_out_and_is_dropped() {
    let mut config = transport_config();
    config.handshake_timeout_secs = 1;
    let (alpha, alpha_port) = start_transport_with("alpha", PSK, config).await;

    let stream = TcpStream::connect(("127.0.0.1", alpha_port)).await.unwrap();
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let challenge: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(challenge["type"], "challenge");
    assert_eq!(challenge["node_id"], "alpha");

    // Say nothing. The acceptor gives up and closes the socket.
    let mut rest = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(3), reader.read_to_end(&mut rest)).await;
    assert!(matches!(read, Ok(Ok(0))), "socket should be closed after the deadline");
    assert!(alpha.connections().await.is_empty());

    alpha.shutdown().await;
}

#[tokio::test]
async fn test_initiator_times_out_against_silent_server() {
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = silent.local_addr().unwrap().port();
    let _holder = tokio::spawn(async move {
        let (_socket, _) = silent.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let mut config = transport_config();
    config.handshake_timeout_secs = 1;
    let beta = transport_with("beta", PSK, config);

    match beta.connect_to_peer("127.0.0.1", port).await {
        Err(TransportError::Handshake(HandshakeError::Timeout(_))) => {}
        other => panic!("expected handshake timeout, got {:?}", other),
    }
    assert!(beta.connections().await.is_empty());
}

/// Drive the initiator side by hand as `node_id` and return the open socket.
async fn raw_handshake(port: u16, node_id: &str) -> BufReader<TcpStream> {
    let auth = Authenticator::from_hex(node_id, PSK).unwrap();
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut stream = BufReader::new(stream);

    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    let challenge: Value = serde_json::from_str(&line).unwrap();
    let challenge = challenge["challenge"].as_str().unwrap().to_string();

    let counter = auth.generate_challenge();
    let reply = json!({
        "type": "response",
        "node_id": node_id,
        "response": auth.compute_response(&challenge),
        "challenge": counter,
    });
    stream.get_mut().write_all(format!("{}\n", reply).as_bytes()).await.unwrap();

    line.clear();
    stream.read_line(&mut line).await.unwrap();
    let proof: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(proof["type"], "response");
    let peer_id = proof["node_id"].as_str().unwrap();
    assert!(auth.verify_response(peer_id, &counter, proof["response"].as_str().unwrap()));

    stream
}

#[tokio::test]
async fn test_spoofed_sender_is_overwritten() {
    let (alpha, alpha_port) = start_transport("alpha").await;
    let mut inbox = alpha.messages().unwrap();

    let mut mallory = raw_handshake(alpha_port, "mallory").await;
    let alpha_ref = &alpha;
    assert!(wait_until(WAIT, move || has_peer(alpha_ref, "mallory")).await);

    let frames = [
        json!({"type": "ping"}).to_string(),
        "{not json".to_string(),
        String::new(),
        json!({
            "type": "message",
            "from": "admin",
            "to": "alpha",
            "content": "trust me",
            "timestamp": "2024-01-01T00:00:00Z",
        })
        .to_string(),
    ];
    for frame in frames {
        mallory.get_mut().write_all(format!("{}\n", frame).as_bytes()).await.unwrap();
    }

    let message = tokio::time::timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(message.from, "mallory");
    assert_eq!(message.content, "trust me");
    assert!(has_peer(&alpha, "mallory").await);

    alpha.shutdown().await;
}

#[tokio::test]
async fn test_peer_eof_removes_entry() {
    let (alpha, alpha_port) = start_transport("alpha").await;

    let mallory = raw_handshake(alpha_port, "mallory").await;
    let alpha_ref = &alpha;
    assert!(wait_until(WAIT, move || has_peer(alpha_ref, "mallory")).await);

    drop(mallory);
    assert!(wait_until(WAIT, move || async move { !has_peer(alpha_ref, "mallory").await }).await);

    alpha.shutdown().await;
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let mut config = transport_config();
    config.max_frame_bytes = 256;
    let (alpha, alpha_port) = start_transport_with("alpha", PSK, config).await;

    let mut mallory = raw_handshake(alpha_port, "mallory").await;
    let alpha_ref = &alpha;
    assert!(wait_until(WAIT, move || has_peer(alpha_ref, "mallory")).await);

    let huge = format!("{}\n", "x".repeat(1024));
    mallory.get_mut().write_all(huge.as_bytes()).await.unwrap();

    assert!(wait_until(WAIT, move || async move { !has_peer(alpha_ref, "mallory").await }).await);
    alpha.shutdown().await;
}

#[tokio::test]
async fn test_reaper_evicts_idle_connection() {
    let mut config = transport_config();
    config.reap_interval_secs = 1;
    config.stale_after_secs = 1;
    let (alpha, alpha_port) = start_transport_with("alpha", PSK, config).await;
    let (beta, _) = start_transport("beta").await;

    beta.connect_to_peer("127.0.0.1", alpha_port).await.unwrap();
    let alpha_ref = &alpha;
    let beta_ref = &beta;
    assert!(wait_until(WAIT, move || has_peer(alpha_ref, "beta")).await);

    // Nothing is sent; alpha evicts beta and closes the socket, so beta's
    // read loop sees EOF and drops alpha as well.
    assert!(wait_until(WAIT, move || async move { !has_peer(alpha_ref, "beta").await }).await);
    assert!(wait_until(WAIT, move || async move { !has_peer(beta_ref, "alpha").await }).await);

    beta.shutdown().await;
    alpha.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_replaces_connection() {
    let (alpha, alpha_port) = start_transport("alpha").await;
    let (beta, _) = start_transport("beta").await;
    let mut inbox = alpha.messages().unwrap();

    beta.connect_to_peer("127.0.0.1", alpha_port).await.unwrap();
    let alpha_ref = &alpha;
    assert!(wait_until(WAIT, move || has_peer(alpha_ref, "beta")).await);
    let first = alpha.table().lookup("beta").await.unwrap();

    beta.connect_to_peer("127.0.0.1", alpha_port).await.unwrap();
    let first_id = first.id();
    assert!(
        wait_until(WAIT, move || async move {
            matches!(alpha_ref.table().lookup("beta").await, Some(conn) if conn.id() != first_id)
        })
        .await
    );
    assert!(first.is_closed());

    // Let the superseded read loops on both sides run to completion.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(alpha.connections().await.len(), 1);
    assert_eq!(beta.connections().await.len(), 1);

    beta.send_message("alpha", "still here").await.unwrap();
    let message = tokio::time::timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(message.content, "still here");

    beta.shutdown().await;
    alpha.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_peers() {
    let (alpha, alpha_port) = start_transport("alpha").await;
    let (beta, _) = start_transport("beta").await;

    beta.connect_to_peer("127.0.0.1", alpha_port).await.unwrap();
    let alpha_ref = &alpha;
    let beta_ref = &beta;
    assert!(wait_until(WAIT, move || has_peer(alpha_ref, "beta")).await);

    assert!(alpha.shutdown().await);
    assert!(alpha.connections().await.is_empty());
    assert_eq!(alpha.active_handlers(), 0);
    assert!(wait_until(WAIT, move || async move { !has_peer(beta_ref, "alpha").await }).await);

    assert!(matches!(
        alpha.connect_to_peer("127.0.0.1", alpha_port).await,
        Err(TransportError::ShuttingDown)
    ));
    beta.shutdown().await;
}

#[tokio::test]
async fn test_inbound_handshake_finishing_after_shutdown_is_discarded() {
    let (alpha, alpha_port) = start_transport("alpha").await;
    let auth = Authenticator::from_hex("mallory", PSK).unwrap();

    let stream = TcpStream::connect(("127.0.0.1", alpha_port)).await.unwrap();
    let mut stream = BufReader::new(stream);
    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    let challenge: Value = serde_json::from_str(&line).unwrap();
    let challenge = challenge["challenge"].as_str().unwrap().to_string();

    // Shutdown begins while the acceptor waits for our response.
    let closer = alpha.clone();
    let shutting_down = tokio::spawn(async move { closer.shutdown().await });
    let alpha_ref = &alpha;
    assert!(wait_until(WAIT, move || async move { alpha_ref.is_shutting_down() }).await);

    let reply = json!({
        "type": "response",
        "node_id": "mallory",
        "response": auth.compute_response(&challenge),
        "challenge": auth.generate_challenge(),
    });
    stream.get_mut().write_all(format!("{}\n", reply).as_bytes()).await.unwrap();

    line.clear();
    stream.read_line(&mut line).await.unwrap();
    let proof: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(proof["type"], "response");

    let mut rest = Vec::new();
    let read = tokio::time::timeout(WAIT, stream.read_to_end(&mut rest)).await;
    assert!(matches!(read, Ok(Ok(0))), "authenticated socket should still be dropped");

    assert!(tokio::time::timeout(WAIT, shutting_down).await.unwrap().unwrap());
    assert!(alpha.connections().await.is_empty());
    assert_eq!(alpha.active_handlers(), 0);
}

#[tokio::test]
async fn test_outbound_handshake_finishing_after_shutdown_is_discarded() {
    let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = server.local_addr().unwrap().port();
    let (answered_tx, answered_rx) = tokio::sync::oneshot::channel::<()>();
    let (proceed_tx, proceed_rx) = tokio::sync::oneshot::channel::<()>();

    // A hand-driven acceptor that stalls before sending its proof.
    let acceptor = tokio::spawn(async move {
        let auth = Authenticator::from_hex("alpha", PSK).unwrap();
        let (socket, _) = server.accept().await.unwrap();
        let mut socket = BufReader::new(socket);

        let challenge = auth.generate_challenge();
        let frame = json!({"type": "challenge", "node_id": "alpha", "challenge": challenge});
        socket.get_mut().write_all(format!("{}\n", frame).as_bytes()).await.unwrap();

        let mut line = String::new();
        socket.read_line(&mut line).await.unwrap();
        let reply: Value = serde_json::from_str(&line).unwrap();
        assert!(auth.verify_response("beta", &challenge, reply["response"].as_str().unwrap()));
        let counter = reply["challenge"].as_str().unwrap().to_string();

        answered_tx.send(()).unwrap();
        proceed_rx.await.unwrap();

        let proof = json!({
            "type": "response",
            "node_id": "alpha",
            "response": auth.compute_response(&counter),
        });
        socket.get_mut().write_all(format!("{}\n", proof).as_bytes()).await.unwrap();

        let mut rest = Vec::new();
        socket.read_to_end(&mut rest).await.unwrap();
        rest
    });

    let beta = transport_with("beta", PSK, transport_config());
    let dialer = beta.clone();
    let dial = tokio::spawn(async move { dialer.connect_to_peer("127.0.0.1", port).await });

    tokio::time::timeout(WAIT, answered_rx).await.unwrap().unwrap();
    assert!(beta.shutdown().await);
    proceed_tx.send(()).unwrap();

    match tokio::time::timeout(WAIT, dial).await.unwrap().unwrap() {
        Err(TransportError::ShuttingDown) => {}
        other => panic!("expected ShuttingDown, got {:?}", other),
    }
    assert!(beta.connections().await.is_empty());

    let leftover = tokio::time::timeout(WAIT, acceptor).await.unwrap().unwrap();
    assert!(leftover.is_empty());
}

#[tokio::test]
async fn test_reaper_releases_read_loop_blocked_on_full_queue() {
    let mut config = transport_config();
    config.queue_capacity = 1;
    config.reap_interval_secs = 1;
    config.stale_after_secs = 1;
    let (alpha, alpha_port) = start_transport_with("alpha", PSK, config).await;
    // Held but never drained.
    let mut inbox = alpha.messages().unwrap();
    let (beta, _) = start_transport("beta").await;

    beta.connect_to_peer("127.0.0.1", alpha_port).await.unwrap();
    let alpha_ref = &alpha;
    let beta_ref = &beta;
    assert!(wait_until(WAIT, move || has_peer(alpha_ref, "beta")).await);

    // "one" fills the queue and alpha's read loop blocks pushing "two".
    for content in ["one", "two", "three"] {
        beta.send_message("alpha", content).await.unwrap();
    }

    assert!(wait_until(WAIT, move || async move { !has_peer(alpha_ref, "beta").await }).await);
    assert!(wait_until(WAIT, move || async move { !has_peer(beta_ref, "alpha").await }).await);
    assert!(wait_until(WAIT, move || async move { alpha_ref.active_handlers() == 0 }).await);

    assert_eq!(inbox.try_recv().unwrap().content, "one");
    assert!(inbox.try_recv().is_none());

    beta.shutdown().await;
    alpha.shutdown().await;
}
