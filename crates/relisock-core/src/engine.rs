//! Delivery engine
//!
//! The protocol state machine. Processes decoded inbound packets, decides
//! what to buffer, prune, replay, and acknowledge, and owns the reconnect
//! handover between a dead socket and its replacement. All handlers complete
//! synchronously relative to the inbound event; byte transmission is
//! fire-and-forget through the bound link.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::errors::{RelisockError, Result};
use crate::packet::{JsonCodec, Packet, PacketCodec, SeqPayload};
use crate::pending::PendingRegistry;
use crate::session::SessionStore;
use crate::socket::{LinkState, ReliableSocket, SocketLink, Transport};
use crate::types::{IdGenerator, Seq, SessionId, SystemTimeSource, TimeSource, UuidIdGenerator};

// ----------------------------------------------------------------------------
// Delivery Engine
// ----------------------------------------------------------------------------

/// Session and reliable-delivery engine
///
/// Constructed once per server instance; sockets attach to it and all
/// session state lives in its stores. Failures are scoped to one socket or
/// session and never affect the others.
pub struct DeliveryEngine {
    sessions: Arc<SessionStore>,
    pending: Arc<PendingRegistry>,
    codec: Arc<dyn PacketCodec>,
    config: EngineConfig,
    duplicates_suppressed: AtomicU64,
    packets_dropped: AtomicU64,
}

impl DeliveryEngine {
    /// Create an engine with default configuration, codec, and id source
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(JsonCodec::new()),
            Arc::new(UuidIdGenerator::new()),
            Arc::new(SystemTimeSource::new()),
        )
    }

    /// Create an engine with every collaborator injected
    pub fn with_parts(
        config: EngineConfig,
        codec: Arc<dyn PacketCodec>,
        ids: Arc<dyn IdGenerator>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(ids.clone(), time)),
            pending: Arc::new(PendingRegistry::new(ids)),
            codec,
            config,
            duplicates_suppressed: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
        }
    }

    /// Wrap a freshly connected transport
    ///
    /// Allocates a pending identity and returns the application-facing
    /// socket. Call once per transport connection.
    pub async fn attach(&self, transport: Arc<dyn Transport>) -> ReliableSocket {
        let pending_id = self.pending.attach().await;
        let link = SocketLink::new(transport, pending_id, self.config.inbound_buffer_size);
        ReliableSocket::new(
            link,
            self.sessions.clone(),
            self.pending.clone(),
            self.codec.clone(),
        )
    }

    /// Decode and dispatch one inbound frame from a socket
    ///
    /// A frame that fails to decode is dropped and reported; the connection
    /// stays open.
    pub async fn handle_incoming(&self, socket: &ReliableSocket, bytes: &[u8]) -> Result<()> {
        let packet = match self.codec.decode(bytes) {
            Ok(packet) => packet,
            Err(error) => {
                warn!(%error, "malformed inbound frame dropped");
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                return Err(error);
            }
        };

        match packet {
            Packet::Open => self.on_open(socket).await,
            Packet::Ack { raw } => self.on_ack(socket, &raw).await,
            Packet::Recon { session, last } => self.on_recon(socket, session, last).await,
            Packet::Message { entries } => self.on_message(socket, entries).await,
            // Server-to-client frames have no inbound meaning here
            Packet::Sid { .. } | Packet::Missed { .. } => {
                warn!("server-directional packet received from peer; dropped");
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// The transport reported a disconnect
    ///
    /// Closes the link; an established session stays in the store so the
    /// client can reconnect to it later. A connection that never opened a
    /// session is forgotten entirely.
    pub async fn handle_close(&self, socket: &ReliableSocket) {
        let link = socket.link();
        if let LinkState::Pending(pending_id) = link.state() {
            self.pending.discard(&pending_id).await;
        }
        link.close().await;
    }

    /// Apply the configured eviction policy, closing evicted sessions' links
    ///
    /// Returns the number of sessions removed.
    pub async fn evict_idle(&self) -> usize {
        let evicted = self.sessions.sweep_idle(self.config.eviction).await;
        let count = evicted.len();
        for (_, link) in evicted {
            link.close().await;
        }
        count
    }

    /// The session store, for inspection
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Current engine counters
    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            sessions: self.sessions.len().await,
            pending_connections: self.pending.len().await,
            buffered_frames: self.sessions.buffered_frames().await,
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------------
    // Packet Handlers
    // ------------------------------------------------------------------------

    /// Client requested a fresh session
    ///
    /// Valid only while the socket is Pending. Writes buffered before the
    /// handshake migrate into the new session's outbound buffer in original
    /// order, picking up sequence numbers as they are appended, and go out
    /// as one batch right after the `sid` frame. The batch frame is sent
    /// even when empty.
    async fn on_open(&self, socket: &ReliableSocket) -> Result<()> {
        let link = socket.link();
        let pending_id = match link.state() {
            LinkState::Pending(pending_id) => pending_id,
            LinkState::Established(session_id) => {
                warn!(session_id = %session_id, "open on an established socket; closing");
                link.close().await;
                return Err(RelisockError::protocol_violation(
                    "open received on an established socket",
                ));
            }
        };

        let session_id = self.sessions.create(link.clone()).await;
        let queued = self.pending.drain_and_discard(&pending_id).await;
        let mut entries = Vec::with_capacity(queued.len());
        for payload in queued {
            entries.push(self.sessions.append_outbound(&session_id, payload).await?);
        }

        link.set_established(session_id.clone());
        self.transmit(link, &Packet::Sid {
            session: session_id.clone(),
        })
        .await?;
        self.transmit(link, &Packet::Message { entries }).await?;

        debug!(session_id = %session_id, "session established");
        Ok(())
    }

    /// Client confirmed receipt of one outbound sequence number
    ///
    /// Non-numeric ack payloads are tolerated and dropped; acks are
    /// advisory, so an ack arriving before any session exists is ignored
    /// as well.
    async fn on_ack(&self, socket: &ReliableSocket, raw: &str) -> Result<()> {
        let Some(seq) = Packet::parse_ack(raw) else {
            debug!(raw, "non-numeric ack payload tolerated");
            return Ok(());
        };

        match socket.link().state() {
            LinkState::Established(session_id) => {
                self.sessions.acknowledge(&session_id, seq).await;
                Ok(())
            }
            LinkState::Pending(_) => {
                debug!(seq = %seq, "ack before session established ignored");
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Client asked to reattach an existing session to this socket
    ///
    /// The handover order is the concurrency contract: the old link's write
    /// path is disabled and replaced under the session lock before anything
    /// is sent on the new socket, so a zombie transport cannot emit
    /// conflicting session traffic mid-handoff. An unknown session id fails
    /// the reconnect explicitly; the client must start a fresh `open`.
    async fn on_recon(
        &self,
        socket: &ReliableSocket,
        session_id: SessionId,
        last: Seq,
    ) -> Result<()> {
        let link = socket.link();
        let pending_id = match link.state() {
            LinkState::Pending(pending_id) => pending_id,
            LinkState::Established(bound) => {
                warn!(session_id = %bound, "recon on an established socket; closing");
                link.close().await;
                return Err(RelisockError::protocol_violation(
                    "recon received on an established socket",
                ));
            }
        };

        let (old_link, missed) = self
            .sessions
            .begin_reconnect(&session_id, link.clone(), last)
            .await?;
        old_link.close().await;

        if !missed.is_empty() {
            self.transmit(link, &Packet::Missed { entries: missed }).await?;
        }

        // Writes the client already attempted on this socket before the
        // handshake completed follow as a fresh message batch
        let queued = self.pending.drain_and_discard(&pending_id).await;
        let mut entries = Vec::with_capacity(queued.len());
        for payload in queued {
            entries.push(self.sessions.append_outbound(&session_id, payload).await?);
        }
        link.set_established(session_id.clone());
        if !entries.is_empty() {
            self.transmit(link, &Packet::Message { entries }).await?;
        }

        debug!(session_id = %session_id, "session reconnected");
        Ok(())
    }

    /// Inbound application data from the client
    ///
    /// Every entry is acknowledged, duplicate or not, so the client's own
    /// outbound buffer converges even after replays; only first-seen entries
    /// are delivered upward.
    async fn on_message(&self, socket: &ReliableSocket, entries: Vec<SeqPayload>) -> Result<()> {
        let link = socket.link();
        let session_id = match link.state() {
            LinkState::Established(session_id) => session_id,
            LinkState::Pending(_) => {
                warn!("message before session established; dropped");
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        for entry in entries {
            if self.sessions.is_duplicate(&session_id, entry.seq).await {
                self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = %session_id, seq = %entry.seq, "duplicate inbound entry suppressed");
            } else {
                self.sessions.mark_inbound_seen(&session_id, entry.seq).await?;
                link.deliver_inbound(entry.data);
            }
            self.transmit(link, &Packet::ack(entry.seq)).await?;
        }
        Ok(())
    }

    async fn transmit(&self, link: &Arc<SocketLink>, packet: &Packet) -> Result<()> {
        let frame = self.codec.encode(packet)?;
        link.transmit(frame).await
    }
}

impl Default for DeliveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Engine Statistics
// ----------------------------------------------------------------------------

/// Counters describing engine activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    /// Live sessions in the store
    pub sessions: usize,
    /// Connections still awaiting the handshake
    pub pending_connections: usize,
    /// Sent-but-unacknowledged outbound entries across all sessions
    pub buffered_frames: usize,
    /// Inbound entries suppressed as duplicates
    pub duplicates_suppressed: u64,
    /// Frames dropped (malformed, misdirected, or pre-handshake)
    pub packets_dropped: u64,
}
