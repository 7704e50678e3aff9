//! Property-based tests for reliable-delivery invariants
//!
//! These tests verify sequencing, acknowledgment pruning, duplicate
//! suppression, and reconnect replay over arbitrary payloads and arbitrary
//! acknowledgment orders.

use std::sync::Arc;

use proptest::prelude::*;
use relisock_core::{
    DeliveryEngine, JsonCodec, Packet, PacketCodec, ReliableSocket, Seq, SeqPayload, Transport,
};
use relisock_harness::{drain_ready, MemoryTransport};

// ----------------------------------------------------------------------------
// Strategies and Utilities
// ----------------------------------------------------------------------------

/// Generate an arbitrary batch of application payloads
fn arb_payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)
}

/// Generate an arbitrary acknowledgment order, unknown values included
fn arb_acks() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..24, 0..32)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("test runtime")
}

fn frame(packet: &Packet) -> Vec<u8> {
    JsonCodec::new().encode(packet).unwrap()
}

async fn open_socket(engine: &DeliveryEngine) -> (ReliableSocket, Arc<MemoryTransport>) {
    let transport = MemoryTransport::new();
    let socket = engine.attach(transport.clone() as Arc<dyn Transport>).await;
    engine
        .handle_incoming(&socket, &frame(&Packet::Open))
        .await
        .unwrap();
    transport.clear_sent();
    (socket, transport)
}

fn message_entries(transport: &MemoryTransport) -> Vec<SeqPayload> {
    transport
        .decoded_frames()
        .into_iter()
        .filter_map(|packet| match packet {
            Packet::Message { entries } => Some(entries),
            _ => None,
        })
        .flatten()
        .collect()
}

// ----------------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------------

proptest! {
    /// Property: outbound sequence numbers are gapless from zero and
    /// payloads go out unchanged, whatever the payloads are
    #[test]
    fn outbound_sequencing_is_gapless(payloads in arb_payloads()) {
        runtime().block_on(async {
            let engine = DeliveryEngine::new();
            let (socket, transport) = open_socket(&engine).await;

            for payload in &payloads {
                socket.send(payload.clone()).await.unwrap();
            }

            let entries = message_entries(&transport);
            prop_assert_eq!(entries.len(), payloads.len());
            for (index, (entry, payload)) in entries.iter().zip(&payloads).enumerate() {
                prop_assert_eq!(entry.seq, Seq::new(index as u64));
                prop_assert_eq!(&entry.data, payload);
            }
            Ok(())
        })?;
    }

    /// Property: after any sequence of acks, the buffer holds exactly the
    /// never-acknowledged entries, still in send order
    #[test]
    fn ack_pruning_removes_exact_matches_only(
        payloads in arb_payloads(),
        acks in arb_acks(),
    ) {
        runtime().block_on(async {
            let engine = DeliveryEngine::new();
            let (socket, _transport) = open_socket(&engine).await;
            let session_id = socket.session_id().unwrap();

            for payload in &payloads {
                socket.send(payload.clone()).await.unwrap();
            }
            for ack in &acks {
                engine
                    .handle_incoming(&socket, &frame(&Packet::Ack { raw: ack.to_string() }))
                    .await
                    .unwrap();
            }

            let expected: Vec<u64> = (0..payloads.len() as u64)
                .filter(|seq| !acks.contains(seq))
                .collect();
            let view = engine.sessions().view(&session_id).await.unwrap();
            let remaining: Vec<u64> =
                view.outbound.iter().map(|entry| entry.seq.value()).collect();
            prop_assert_eq!(remaining, expected);
            Ok(())
        })?;
    }

    /// Property: inbound entries deliver exactly once in first-seen order,
    /// and every entry is acknowledged, duplicate or not
    #[test]
    fn inbound_duplicates_are_suppressed(seqs in prop::collection::vec(0u64..10, 0..32)) {
        runtime().block_on(async {
            let engine = DeliveryEngine::new();
            let (socket, transport) = open_socket(&engine).await;
            let mut inbound = socket.subscribe();

            for seq in &seqs {
                let entry = SeqPayload::new(Seq::new(*seq), seq.to_string().into_bytes());
                engine
                    .handle_incoming(&socket, &frame(&Packet::Message { entries: vec![entry] }))
                    .await
                    .unwrap();
            }

            let mut expected = Vec::new();
            for seq in &seqs {
                let payload = seq.to_string().into_bytes();
                if !expected.contains(&payload) {
                    expected.push(payload);
                }
            }
            prop_assert_eq!(drain_ready(&mut inbound), expected);

            let acked = transport
                .decoded_frames()
                .iter()
                .filter(|packet| matches!(packet, Packet::Ack { .. }))
                .count();
            prop_assert_eq!(acked, seqs.len());
            Ok(())
        })?;
    }

    /// Property: reconnect replays exactly the unacknowledged entries with
    /// sequence numbers strictly greater than `last`, in order
    #[test]
    fn reconnect_replays_the_strict_tail(
        payloads in arb_payloads(),
        last in 0u64..20,
    ) {
        runtime().block_on(async {
            let engine = DeliveryEngine::new();
            let (socket_a, transport_a) = open_socket(&engine).await;
            let session_id = socket_a.session_id().unwrap();

            for payload in &payloads {
                socket_a.send(payload.clone()).await.unwrap();
            }
            engine.handle_close(&socket_a).await;

            let transport_b = MemoryTransport::new();
            let socket_b = engine
                .attach(transport_b.clone() as Arc<dyn Transport>)
                .await;
            engine
                .handle_incoming(
                    &socket_b,
                    &frame(&Packet::Recon { session: session_id, last: Seq::new(last) }),
                )
                .await
                .unwrap();

            let expected: Vec<SeqPayload> = payloads
                .iter()
                .enumerate()
                .filter(|(index, _)| *index as u64 > last)
                .map(|(index, payload)| SeqPayload::new(Seq::new(index as u64), payload.clone()))
                .collect();

            let replayed: Vec<SeqPayload> = transport_b
                .decoded_frames()
                .into_iter()
                .filter_map(|packet| match packet {
                    Packet::Missed { entries } => Some(entries),
                    _ => None,
                })
                .flatten()
                .collect();
            prop_assert_eq!(replayed, expected);
            prop_assert!(transport_a.is_closed());
            Ok(())
        })?;
    }
}
