//! Session store
//!
//! Tracks established sessions: session id to bound socket link, monotonic
//! outbound sequence counter, outbound write buffer, and the inbound
//! duplicate-suppression window. All records are owned exclusively by the
//! store; per-session mutation happens under the store lock, which is also
//! what makes the reconnect handover (neutralize old link, swap in new link)
//! a single atomic transition.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::EvictionPolicy;
use crate::errors::{RelisockError, Result};
use crate::packet::SeqPayload;
use crate::socket::SocketLink;
use crate::types::{IdGenerator, Seq, SessionId, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Session Record
// ----------------------------------------------------------------------------

/// One established session
///
/// The outbound buffer holds sent-but-unacknowledged `(seq, payload)` pairs
/// in send order. Sequence numbers are assigned contiguously; gaps appear
/// only when acknowledgment removes interior entries.
#[derive(Debug)]
struct Session {
    /// Transport link currently authorized to carry this session
    link: Arc<SocketLink>,
    /// Next outbound sequence number to assign; starts at 0
    next_seq: u64,
    /// Sent-but-unacknowledged outbound entries, in send order
    outbound: Vec<SeqPayload>,
    /// Highest inbound sequence number processed
    last_seen_inbound: Option<Seq>,
    /// Inbound sequence numbers already delivered to the application
    seen_inbound: HashSet<u64>,
    /// Creation time
    created_at: Timestamp,
    /// Last protocol activity, feeds the idle-eviction policy
    last_activity: Timestamp,
}

/// Read-only snapshot of a session's reliability state
#[derive(Debug, Clone)]
pub struct SessionView {
    pub next_seq: Seq,
    pub outbound: Vec<SeqPayload>,
    pub last_seen_inbound: Option<Seq>,
    pub seen_inbound_count: usize,
    pub created_at: Timestamp,
    pub last_activity: Timestamp,
}

// ----------------------------------------------------------------------------
// Session Store
// ----------------------------------------------------------------------------

/// Store of all established sessions
pub struct SessionStore {
    inner: Mutex<HashMap<SessionId, Session>>,
    ids: Arc<dyn IdGenerator>,
    time: Arc<dyn TimeSource>,
}

impl SessionStore {
    /// Create a new store with the given identifier and time sources
    pub fn new(ids: Arc<dyn IdGenerator>, time: Arc<dyn TimeSource>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ids,
            time,
        }
    }

    /// Allocate a new session bound to the given link
    pub async fn create(&self, link: Arc<SocketLink>) -> SessionId {
        let id = SessionId::new(self.ids.new_id());
        let now = self.time.now();
        self.inner.lock().await.insert(
            id.clone(),
            Session {
                link,
                next_seq: 0,
                outbound: Vec::new(),
                last_seen_inbound: None,
                seen_inbound: HashSet::new(),
                created_at: now,
                last_activity: now,
            },
        );
        debug!(session_id = %id, "session created");
        id
    }

    /// Whether a session exists
    pub async fn contains(&self, id: &SessionId) -> bool {
        self.inner.lock().await.contains_key(id)
    }

    /// Snapshot a session's reliability state
    pub async fn view(&self, id: &SessionId) -> Option<SessionView> {
        self.inner.lock().await.get(id).map(|session| SessionView {
            next_seq: Seq::new(session.next_seq),
            outbound: session.outbound.clone(),
            last_seen_inbound: session.last_seen_inbound,
            seen_inbound_count: session.seen_inbound.len(),
            created_at: session.created_at,
            last_activity: session.last_activity,
        })
    }

    /// The link currently bound to a session
    pub async fn bound_link(&self, id: &SessionId) -> Option<Arc<SocketLink>> {
        self.inner
            .lock()
            .await
            .get(id)
            .map(|session| session.link.clone())
    }

    /// Assign the next sequence number to a payload and buffer it
    ///
    /// Returns the buffered entry so the caller can transmit it immediately.
    pub async fn append_outbound(&self, id: &SessionId, payload: Vec<u8>) -> Result<SeqPayload> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .get_mut(id)
            .ok_or_else(|| RelisockError::session_not_found(id.as_str()))?;

        let entry = SeqPayload::new(Seq::new(session.next_seq), payload);
        session.next_seq += 1;
        session.outbound.push(entry.clone());
        session.last_activity = self.time.now();
        Ok(entry)
    }

    /// Remove the first buffered entry with exactly this sequence number
    ///
    /// Acknowledgment is not cumulative: acking seq k leaves every other
    /// entry, including still-unacknowledged lower sequences, buffered.
    /// Unknown sessions and unmatched sequences are silent no-ops; acks are
    /// advisory.
    pub async fn acknowledge(&self, id: &SessionId, seq: Seq) {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.get_mut(id) else {
            debug!(session_id = %id, "ack for unknown session ignored");
            return;
        };

        if let Some(index) = session.outbound.iter().position(|entry| entry.seq == seq) {
            session.outbound.remove(index);
            session.last_activity = self.time.now();
            debug!(session_id = %id, seq = %seq, remaining = session.outbound.len(), "outbound entry acknowledged");
        }
    }

    /// Atomically hand a session over to a new link
    ///
    /// Under the store lock: disables writes on the old link, computes the
    /// entries with sequence strictly greater than `last`, and binds the new
    /// link. Returns the neutralized old link (for the caller to close) and
    /// the missed entries (for the caller to replay). Nothing can slip out on
    /// the old link after this returns.
    pub async fn begin_reconnect(
        &self,
        id: &SessionId,
        new_link: Arc<SocketLink>,
        last: Seq,
    ) -> Result<(Arc<SocketLink>, Vec<SeqPayload>)> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .get_mut(id)
            .ok_or_else(|| RelisockError::session_not_found(id.as_str()))?;

        let old_link = std::mem::replace(&mut session.link, new_link);
        old_link.disable_writes();

        let missed: Vec<SeqPayload> = session
            .outbound
            .iter()
            .filter(|entry| entry.seq > last)
            .cloned()
            .collect();

        session.last_activity = self.time.now();
        debug!(
            session_id = %id,
            last = %last,
            missed = missed.len(),
            "session rebound to new link"
        );
        Ok((old_link, missed))
    }

    /// Record an inbound sequence number as delivered
    pub async fn mark_inbound_seen(&self, id: &SessionId, seq: Seq) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .get_mut(id)
            .ok_or_else(|| RelisockError::session_not_found(id.as_str()))?;

        session.seen_inbound.insert(seq.value());
        if session.last_seen_inbound.map_or(true, |seen| seq > seen) {
            session.last_seen_inbound = Some(seq);
        }
        session.last_activity = self.time.now();
        Ok(())
    }

    /// Whether an inbound sequence number was already delivered
    pub async fn is_duplicate(&self, id: &SessionId, seq: Seq) -> bool {
        self.inner
            .lock()
            .await
            .get(id)
            .is_some_and(|session| session.seen_inbound.contains(&seq.value()))
    }

    /// Remove sessions idle beyond the policy's timeout
    ///
    /// Returns the evicted sessions with their bound links so the caller can
    /// close them. `EvictionPolicy::Never` removes nothing.
    pub async fn sweep_idle(&self, policy: EvictionPolicy) -> Vec<(SessionId, Arc<SocketLink>)> {
        let EvictionPolicy::IdleTimeout(timeout) = policy else {
            return Vec::new();
        };

        let now = self.time.now();
        let mut inner = self.inner.lock().await;
        let expired: Vec<SessionId> = inner
            .iter()
            .filter(|(_, session)| now.duration_since(session.last_activity) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                inner.remove(&id).map(|session| {
                    debug!(session_id = %id, "idle session evicted");
                    (id, session.link)
                })
            })
            .collect()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no sessions exist
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Total buffered outbound entries across all sessions
    pub async fn buffered_frames(&self) -> usize {
        self.inner
            .lock()
            .await
            .values()
            .map(|session| session.outbound.len())
            .sum()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
