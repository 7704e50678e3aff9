//! Pending connection registry
//!
//! Tracks transport connections that have attached but not yet completed the
//! session handshake, and buffers any application writes issued before a
//! session id exists. A pending record is consumed exactly once, when the
//! delivery engine establishes a session for that connection.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{IdGenerator, PendingId};

// ----------------------------------------------------------------------------
// Pending Connection
// ----------------------------------------------------------------------------

/// Buffered state of one not-yet-established connection
#[derive(Debug, Default)]
struct PendingConnection {
    /// Application payloads written before a session exists, in write order
    queue: Vec<Vec<u8>>,
}

// ----------------------------------------------------------------------------
// Pending Registry
// ----------------------------------------------------------------------------

/// Registry of connections awaiting the session handshake
pub struct PendingRegistry {
    inner: Mutex<HashMap<PendingId, PendingConnection>>,
    ids: Arc<dyn IdGenerator>,
}

impl PendingRegistry {
    /// Create a new registry with the given identifier source
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ids,
        }
    }

    /// Allocate a pending identity with an empty write queue
    ///
    /// Called once per attaching socket; each call creates an independent
    /// record.
    pub async fn attach(&self) -> PendingId {
        let id = PendingId::new(self.ids.new_id());
        self.inner
            .lock()
            .await
            .insert(id.clone(), PendingConnection::default());
        debug!(pending_id = %id, "pending connection attached");
        id
    }

    /// Append a payload to a pending connection's write queue
    ///
    /// Unknown ids are a silent no-op: a concurrent handshake may have
    /// already drained the record between the state check and this call.
    pub async fn buffer_write(&self, id: &PendingId, payload: Vec<u8>) {
        match self.inner.lock().await.get_mut(id) {
            Some(pending) => pending.queue.push(payload),
            None => debug!(pending_id = %id, "buffer_write on unknown pending id ignored"),
        }
    }

    /// Return the queued payloads in order and delete the record
    ///
    /// Called exactly once per connection, at session establishment. Unknown
    /// ids yield an empty queue.
    pub async fn drain_and_discard(&self, id: &PendingId) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .await
            .remove(id)
            .map(|pending| pending.queue)
            .unwrap_or_default()
    }

    /// Drop a pending record without migrating it (connection closed before
    /// it ever opened a session)
    pub async fn discard(&self, id: &PendingId) {
        if self.inner.lock().await.remove(id).is_some() {
            debug!(pending_id = %id, "pending connection discarded");
        }
    }

    /// Number of connections currently awaiting a handshake
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no connections are pending
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
