//! Engine edge-case tests (originally unit tests in `engine.rs`)
//!
//! These live as integration tests because the in-memory transport harness
//! itself links against `relisock-core`.

use std::sync::Arc;

use relisock_core::{
    DeliveryEngine, EngineConfig, JsonCodec, Packet, PacketCodec, ReliableSocket, RelisockError,
    Seq, SeqPayload, SessionId, Transport,
};
use relisock_harness::MemoryTransport;

async fn attached(engine: &DeliveryEngine) -> (ReliableSocket, Arc<MemoryTransport>) {
    let transport = MemoryTransport::new();
    let socket = engine.attach(transport.clone() as Arc<dyn Transport>).await;
    (socket, transport)
}

fn encode(packet: &Packet) -> Vec<u8> {
    JsonCodec::new().encode(packet).unwrap()
}

#[tokio::test]
async fn test_malformed_frame_is_reported_and_dropped() {
    let engine = DeliveryEngine::new();
    let (socket, transport) = attached(&engine).await;

    let result = engine.handle_incoming(&socket, b"2{broken").await;
    assert!(result.is_err());
    assert!(transport.sent_frames().is_empty());
    assert_eq!(engine.stats().await.packets_dropped, 1);
}

#[tokio::test]
async fn test_open_on_established_socket_is_a_violation() {
    let engine = DeliveryEngine::new();
    let (socket, transport) = attached(&engine).await;

    engine.handle_incoming(&socket, &encode(&Packet::Open)).await.unwrap();
    assert!(socket.is_established());

    let err = engine
        .handle_incoming(&socket, &encode(&Packet::Open))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelisockError::Session(relisock_core::errors::SessionError::ProtocolViolation { .. })
    ));
    assert!(transport.is_closed());
}

#[tokio::test]
async fn test_non_numeric_ack_is_tolerated() {
    let engine = DeliveryEngine::new();
    let (socket, _transport) = attached(&engine).await;
    engine.handle_incoming(&socket, &encode(&Packet::Open)).await.unwrap();

    engine
        .handle_incoming(
            &socket,
            &encode(&Packet::Ack {
                raw: "garbage".into(),
            }),
        )
        .await
        .unwrap();
    // Not counted as a drop; leniency is intentional
    assert_eq!(engine.stats().await.packets_dropped, 0);
}

#[tokio::test]
async fn test_message_before_open_is_dropped() {
    let engine = DeliveryEngine::new();
    let (socket, transport) = attached(&engine).await;

    engine
        .handle_incoming(
            &socket,
            &encode(&Packet::Message {
                entries: vec![SeqPayload::new(Seq::new(0), b"early".to_vec())],
            }),
        )
        .await
        .unwrap();

    assert!(transport.sent_frames().is_empty());
    assert_eq!(engine.stats().await.packets_dropped, 1);
}

#[tokio::test]
async fn test_recon_unknown_session_fails_explicitly() {
    let engine = DeliveryEngine::new();
    let (socket, _transport) = attached(&engine).await;

    let err = engine
        .handle_incoming(
            &socket,
            &encode(&Packet::Recon {
                session: SessionId::new("no-such-session"),
                last: Seq::new(0),
            }),
        )
        .await
        .unwrap_err();
    assert!(err.is_unknown_session());
    assert!(!socket.is_established());
}

#[tokio::test]
async fn test_evict_idle_closes_links() {
    use relisock_core::EvictionPolicy;
    use core::time::Duration;

    let engine = DeliveryEngine::with_config(EngineConfig {
        eviction: EvictionPolicy::IdleTimeout(Duration::ZERO),
        ..EngineConfig::default()
    });
    let (socket, transport) = attached(&engine).await;
    engine.handle_incoming(&socket, &encode(&Packet::Open)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(engine.evict_idle().await, 1);
    assert!(transport.is_closed());
    assert_eq!(engine.stats().await.sessions, 0);
}
