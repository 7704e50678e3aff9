//! Socket interception layer
//!
//! A [`ReliableSocket`] owns the raw [`Transport`] and exposes its own send
//! and subscription API, so application code is built against the wrapper
//! and never touches the raw transport. The wrapper intercepts every write
//! and routes it through the reliability machinery instead of the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::Result;
use crate::packet::{Packet, PacketCodec};
use crate::pending::PendingRegistry;
use crate::session::SessionStore;
use crate::types::{PendingId, SessionId};

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Contract the underlying transport must satisfy
///
/// Byte transmission is fire-and-forget from the engine's perspective; only
/// application-level ack packets matter for reliability. `close` must
/// tolerate being called more than once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an encoded frame to the peer
    async fn send(&self, bytes: Vec<u8>) -> Result<()>;

    /// Close the underlying connection
    async fn close(&self);
}

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Handshake state of one transport link
///
/// The link transitions Pending to Established independently of session
/// identity: a session outlives its links across reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Attached, no session yet
    Pending(PendingId),
    /// Bound to a session
    Established(SessionId),
}

// ----------------------------------------------------------------------------
// Socket Link
// ----------------------------------------------------------------------------

/// One transport connection as the engine sees it
///
/// Carries the write-enable flag used to neutralize a dead link during
/// reconnect: once writes are disabled, every transmit is a silent no-op,
/// so a zombie transport can never emit further session traffic.
pub struct SocketLink {
    transport: Arc<dyn Transport>,
    writable: AtomicBool,
    state: Mutex<LinkState>,
    inbound_tx: broadcast::Sender<Vec<u8>>,
}

impl std::fmt::Debug for SocketLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketLink")
            .field("writable", &self.writable)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SocketLink {
    /// Wrap a raw transport in Pending state
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        pending_id: PendingId,
        inbound_capacity: usize,
    ) -> Arc<Self> {
        let (inbound_tx, _) = broadcast::channel(inbound_capacity);
        Arc::new(Self {
            transport,
            writable: AtomicBool::new(true),
            state: Mutex::new(LinkState::Pending(pending_id)),
            inbound_tx,
        })
    }

    /// Transmit an encoded frame, unless this link has been neutralized
    pub(crate) async fn transmit(&self, bytes: Vec<u8>) -> Result<()> {
        if !self.writable.load(Ordering::Acquire) {
            debug!("transmit on neutralized link dropped");
            return Ok(());
        }
        self.transport.send(bytes).await
    }

    /// Disable the outbound path; future transmits become no-ops
    pub(crate) fn disable_writes(&self) {
        self.writable.store(false, Ordering::Release);
    }

    /// Whether the outbound path is still enabled
    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    /// Neutralize and close the underlying transport
    ///
    /// Safe to call more than once; a second close is a no-op at the
    /// transport contract level.
    pub(crate) async fn close(&self) {
        self.disable_writes();
        self.transport.close().await;
    }

    /// Current handshake state
    pub fn state(&self) -> LinkState {
        self.state.lock().expect("link state lock poisoned").clone()
    }

    /// Transition this link to Established, bound to a session
    pub(crate) fn set_established(&self, session: SessionId) {
        *self.state.lock().expect("link state lock poisoned") = LinkState::Established(session);
    }

    /// Fan a deduplicated payload out to every subscriber
    pub(crate) fn deliver_inbound(&self, data: Vec<u8>) {
        // A send error only means no subscriber is listening right now
        let _ = self.inbound_tx.send(data);
    }

    /// Subscribe to the deduplicated inbound payload stream
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.inbound_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Arc<Self> {
        struct NullTransport;

        #[async_trait]
        impl Transport for NullTransport {
            async fn send(&self, _bytes: Vec<u8>) -> Result<()> {
                Ok(())
            }
            async fn close(&self) {}
        }

        Self::new(
            Arc::new(NullTransport),
            PendingId::new("test-pending"),
            8,
        )
    }
}

// ----------------------------------------------------------------------------
// Reliable Socket
// ----------------------------------------------------------------------------

/// Application-facing wrapper around one transport connection
///
/// Every outbound write is intercepted: while the link is Pending the
/// payload is queued in the pending registry, and once Established it is
/// assigned a sequence number, recorded in the session's outbound buffer,
/// and transmitted as a one-entry `message` frame. Inbound payloads arrive
/// on [`ReliableSocket::subscribe`], already deduplicated; every subscriber,
/// whether registered before or after wrapping, observes the same stream.
#[derive(Clone)]
pub struct ReliableSocket {
    link: Arc<SocketLink>,
    sessions: Arc<SessionStore>,
    pending: Arc<PendingRegistry>,
    codec: Arc<dyn PacketCodec>,
}

impl ReliableSocket {
    pub(crate) fn new(
        link: Arc<SocketLink>,
        sessions: Arc<SessionStore>,
        pending: Arc<PendingRegistry>,
        codec: Arc<dyn PacketCodec>,
    ) -> Self {
        Self {
            link,
            sessions,
            pending,
            codec,
        }
    }

    /// Send an application payload reliably
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        match self.link.state() {
            LinkState::Pending(pending_id) => {
                self.pending.buffer_write(&pending_id, payload).await;
                Ok(())
            }
            LinkState::Established(session_id) => {
                let entry = self.sessions.append_outbound(&session_id, payload).await?;
                let frame = self.codec.encode(&Packet::Message {
                    entries: vec![entry],
                })?;
                self.link.transmit(frame).await
            }
        }
    }

    /// Subscribe to the deduplicated inbound payload stream
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.link.subscribe()
    }

    /// The session this socket carries, once established
    pub fn session_id(&self) -> Option<SessionId> {
        match self.link.state() {
            LinkState::Established(session_id) => Some(session_id),
            LinkState::Pending(_) => None,
        }
    }

    /// The pending identity, before a session exists
    pub fn pending_id(&self) -> Option<PendingId> {
        match self.link.state() {
            LinkState::Pending(pending_id) => Some(pending_id),
            LinkState::Established(_) => None,
        }
    }

    /// Whether the handshake has completed on this socket
    pub fn is_established(&self) -> bool {
        matches!(self.link.state(), LinkState::Established(_))
    }

    /// The underlying link
    pub fn link(&self) -> &Arc<SocketLink> {
        &self.link
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
