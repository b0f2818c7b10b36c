//! Admin stream broadcaster
//!
//! Watches the three moderation collections for pending items and fans
//! change events out to connected admin sessions over server-sent events.
//! Each session has a bounded buffer; a full buffer drops the event for
//! that session rather than blocking the fan-out. A keep-alive ping goes
//! out every 30 seconds regardless of traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::models;
use crate::store::{ChangeEvent, DocumentStore, Filter};
use crate::types::Result;

/// Per-session event buffer; events beyond this are dropped for the session
const SESSION_BUFFER: usize = 100;
/// Keep-alive period
const KEEPALIVE_SECS: u64 = 30;

/// Collections the broadcaster watches for pending items
pub const WATCHED_COLLECTIONS: [&str; 3] = [
    models::SUGGESTIONS,
    models::PERMISSION_REQUESTS,
    models::IDENTITY_CLAIMS,
];

/// One server-sent event
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl StreamEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Wire format: `event: <name>\ndata: <json>\n\n`
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.event, self.data))
    }
}

/// Broadcast registry for connected admin sessions
pub struct AdminBroadcaster {
    sessions: RwLock<HashMap<String, mpsc::Sender<StreamEvent>>>,
}

impl AdminBroadcaster {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to the moderation queues and start the keep-alive tick.
    pub async fn start(self: Arc<Self>, store: Arc<dyn DocumentStore>) -> Result<()> {
        for collection in WATCHED_COLLECTIONS {
            let rx = store
                .watch(collection, Filter::new().eq("status", "pending"))
                .await?;
            let broadcaster = Arc::clone(&self);
            tokio::spawn(async move {
                broadcaster.forward_changes(rx).await;
            });
        }

        let broadcaster = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(KEEPALIVE_SECS));
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                ticker.tick().await;
                broadcaster
                    .broadcast(StreamEvent::new(
                        "ping",
                        json!({ "time": chrono::Utc::now().timestamp() }),
                    ))
                    .await;
            }
        });

        info!("admin stream broadcaster started");
        Ok(())
    }

    async fn forward_changes(&self, mut rx: mpsc::Receiver<ChangeEvent>) {
        while let Some(change) = rx.recv().await {
            let item = match serde_json::to_value(&change.doc) {
                Ok(v) => v,
                Err(e) => {
                    warn!("failed to encode change document: {}", e);
                    continue;
                }
            };
            let event = StreamEvent::new(
                change.collection.clone(),
                json!({
                    "type": change.kind.as_str(),
                    "item": item,
                    "collection": change.collection,
                }),
            );
            debug!(
                collection = %change.collection,
                kind = change.kind.as_str(),
                "forwarding moderation change"
            );
            self.broadcast(event).await;
        }
        warn!("moderation change feed ended");
    }

    /// Register a session and hand back its event receiver.
    pub async fn register(&self, session_id: String) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.clone(), tx);
        info!(%session_id, connected = sessions.len(), "admin session connected");
        rx
    }

    /// Remove a session from the registry; its channel closes when the
    /// sender drops.
    pub async fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            info!(
                session_id,
                connected = sessions.len(),
                "admin session disconnected"
            );
        }
    }

    /// Fan an event out to every session. Fan-out holds the read lock;
    /// sends never block: a full session buffer drops the event, a closed
    /// session is swept afterwards.
    pub async fn broadcast(&self, event: StreamEvent) {
        let mut closed: Vec<String> = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (session_id, tx) in sessions.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(%session_id, "session buffer full, dropping event");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(session_id.clone());
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut sessions = self.sessions.write().await;
            for session_id in closed {
                sessions.remove(&session_id);
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for AdminBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the session from the registry when the response stream drops.
pub struct SessionGuard {
    broadcaster: Arc<AdminBroadcaster>,
    session_id: String,
}

impl SessionGuard {
    pub fn new(broadcaster: Arc<AdminBroadcaster>, session_id: String) -> Self {
        Self {
            broadcaster,
            session_id,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let broadcaster = Arc::clone(&self.broadcaster);
        let session_id = std::mem::take(&mut self.session_id);
        tokio::spawn(async move {
            broadcaster.unregister(&session_id).await;
        });
    }
}
