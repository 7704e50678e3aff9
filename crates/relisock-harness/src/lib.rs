//! Relisock Harness
//!
//! Deterministic in-memory transport and frame-inspection utilities for
//! exercising the delivery engine without real network connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use relisock_core::{JsonCodec, Packet, PacketCodec, Result, Transport};

// ----------------------------------------------------------------------------
// Memory Transport
// ----------------------------------------------------------------------------

/// Transport that records every outbound frame instead of sending it
///
/// One instance models one underlying connection. After the engine closes
/// it, `is_closed` reports true and any further sends are still recorded,
/// which lets tests assert that a neutralized link went silent rather than
/// relying on the transport to enforce it.
pub struct MemoryTransport {
    sent: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Raw frames sent so far, in order
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent frames decoded back into packets
    ///
    /// Panics on a frame the codec rejects; the engine should never emit one.
    pub fn decoded_frames(&self) -> Vec<Packet> {
        let codec = JsonCodec::new();
        self.sent_frames()
            .iter()
            .map(|frame| codec.decode(frame).expect("engine emitted undecodable frame"))
            .collect()
    }

    /// Forget everything recorded so far
    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<()> {
        debug!(len = bytes.len(), "memory transport send");
        self.sent.lock().unwrap().push(bytes);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Test Logging
// ----------------------------------------------------------------------------

/// Install a test-friendly tracing subscriber
///
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// ----------------------------------------------------------------------------
// Inbound Helpers
// ----------------------------------------------------------------------------

/// Drain every payload already delivered on an inbound subscription
///
/// Stops at the first would-block; never waits.
pub fn drain_ready(rx: &mut broadcast::Receiver<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        out.push(payload);
    }
    out
}
