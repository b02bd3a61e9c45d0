//! Live-session registry and broadcast fan-out.
//!
//! Each session owns a bounded outbound queue drained by its writer task,
//! so messages to one session are delivered in order while a slow peer can
//! never stall the fan-out: when its queue is full the message is dropped
//! for that session only.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use calshare_shared::Envelope;

/// Outbound queue depth per session.
pub const OUTBOUND_QUEUE: usize = 64;

/// Handle to one live connection: its id, outbound queue, and the token
/// that closes its transport.
pub struct SessionHandle {
    pub id: Uuid,
    tx: mpsc::Sender<Arc<String>>,
    closed: CancellationToken,
}

impl SessionHandle {
    pub fn new(id: Uuid, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
        }
    }

    /// Enqueue a pre-serialized frame. Returns `false` when the queue is
    /// full or the writer is gone.
    pub fn send_text(&self, text: Arc<String>) -> bool {
        self.tx.try_send(text).is_ok()
    }

    /// Serialize and enqueue an envelope for this session only.
    pub fn send(&self, envelope: &Envelope) -> bool {
        self.send_text(Arc::new(envelope.encode()))
    }

    /// Ask the connection tasks to close the transport.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Token observed by the read/write loops.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// The set of live sessions. One lock guards add/remove/iterate; the
/// broadcast serializes once and fans out under a read lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session after its handshake completed.
    pub async fn add(&self, handle: Arc<SessionHandle>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(handle.id, handle);
        debug!(total = sessions.len(), "session registered");
    }

    /// Deregister a session. Queued outbound messages are dropped with it.
    pub async fn remove(&self, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(&id).is_some() {
            debug!(total = sessions.len(), "session deregistered");
        }
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Send an envelope to every live session, best effort.
    pub async fn broadcast(&self, envelope: &Envelope) {
        let text = Arc::new(envelope.encode());
        let sessions = self.sessions.read().await;
        for handle in sessions.values() {
            if !handle.send_text(Arc::clone(&text)) {
                warn!(session = %handle.id, kind = %envelope.kind, "dropping broadcast for slow session");
            }
        }
        debug!(kind = %envelope.kind, recipients = sessions.len(), "broadcast");
    }

    /// Close every live session's transport and forget them. Used during
    /// shutdown after the reminder loop has stopped.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.write().await;
        for handle in sessions.values() {
            handle.close();
        }
        sessions.clear();
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
