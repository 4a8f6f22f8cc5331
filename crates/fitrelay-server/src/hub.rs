//! Connection hub: the broadcast set, inbound frame handling and the
//! "record saved" fan-out shared by the device and API entry points.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use fitrelay_core::protocol::{self, READY_GREETING};
use fitrelay_core::{ExerciseRecord, Frame, NewExercise};
use fitrelay_store::{ExerciseStore, StoreError};
use fitrelay_telemetry::metrics::{
    RECORDS_SAVED_TOTAL, WS_BROADCAST_EVICTIONS_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_FRAMES_RECEIVED_TOTAL,
};
use metrics::{counter, gauge};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque handle for one peer connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry point a record came through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestPath {
    Device,
    Api,
}

impl IngestPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Api => "api",
        }
    }
}

/// Outbound side of a live connection. The socket writer drains the queue.
pub struct PeerConnection {
    pub id: ConnectionId,
    tx: mpsc::UnboundedSender<Arc<str>>,
    open: AtomicBool,
}

impl PeerConnection {
    fn new(id: ConnectionId, tx: mpsc::UnboundedSender<Arc<str>>) -> Self {
        Self {
            id,
            tx,
            open: AtomicBool::new(true),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Queue a message. False when the connection is closed or its writer is gone.
    fn send(&self, message: Arc<str>) -> bool {
        self.is_open() && self.tx.send(message).is_ok()
    }
}

/// Owns every open connection and the store both entry points write through.
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, Arc<PeerConnection>>>,
    active_count: AtomicUsize,
    store: Arc<ExerciseStore>,
}

impl ConnectionHub {
    pub fn new(store: Arc<ExerciseStore>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            store,
        }
    }

    pub fn store(&self) -> &Arc<ExerciseStore> {
        &self.store
    }

    /// Open a connection: queue its greeting, then join the broadcast set.
    pub async fn open(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Arc<str>>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(PeerConnection::new(id.clone(), tx));
        let _ = conn.send(Arc::from(READY_GREETING));

        {
            let mut conns = self.connections.write().await;
            if conns.insert(id.clone(), conn).is_none() {
                let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.connection_count() as f64);
        info!(conn_id = %id, "peer connected");
        (id, rx)
    }

    /// Drop a connection from the broadcast set. Idempotent.
    pub async fn close(&self, id: &ConnectionId) {
        let removed = self.connections.write().await.remove(id);
        if let Some(conn) = removed {
            conn.open.store(false, Ordering::Release);
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).set(self.connection_count() as f64);
            info!(conn_id = %id, "peer disconnected");
        }
    }

    /// Drop every connection. Writers see their queue end and close the socket.
    pub async fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.read().await.keys().cloned().collect();
        for id in &ids {
            self.close(id).await;
        }
    }

    /// Handle one inbound text frame from `sender`.
    ///
    /// The raw frame is relayed to every other open connection before this
    /// returns. A completion frame with a full payload also starts a
    /// persistence task, whose handle is returned; its saved notification
    /// therefore always trails the relay.
    pub async fn handle_frame(
        self: &Arc<Self>,
        sender: &ConnectionId,
        text: &str,
    ) -> Option<JoinHandle<()>> {
        let frame = protocol::classify(text);
        counter!(WS_FRAMES_RECEIVED_TOTAL, "kind" => frame.kind_label()).increment(1);

        let pending = match frame {
            Frame::Opaque(_) => {
                debug!(conn_id = %sender, "opaque frame");
                None
            }
            Frame::Recognized(kind) => {
                info!(conn_id = %sender, kind = kind.as_str(), frame = text, "status frame");
                None
            }
            Frame::Completion(None) => {
                debug!(conn_id = %sender, frame = text, "completion frame too short, not persisted");
                None
            }
            Frame::Completion(Some(new)) => {
                info!(conn_id = %sender, exercise = %new.exercise_name, "exercise completed");
                Some(new)
            }
        };

        let _ = self.relay(sender, text).await;

        pending.map(|new| {
            let hub = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = hub.persist(new, IngestPath::Device).await {
                    warn!(error = %e, "failed to persist device record");
                }
            })
        })
    }

    /// Insert through the store and announce the stored record to everyone.
    pub async fn persist(
        &self,
        new: NewExercise,
        path: IngestPath,
    ) -> Result<ExerciseRecord, StoreError> {
        let record = self.store.insert(new).await?;
        counter!(
            RECORDS_SAVED_TOTAL,
            "path" => path.as_str(),
            "source" => self.store.source().as_str()
        )
        .increment(1);
        info!(record_id = record.id, path = path.as_str(), "record saved");
        self.notify_saved(&record).await;
        Ok(record)
    }

    /// Broadcast `EJERCICIO_GUARDADO:<record>` to every open connection.
    pub async fn notify_saved(&self, record: &ExerciseRecord) -> usize {
        match protocol::saved_notification(record) {
            Ok(message) => self.broadcast_all(&message).await,
            Err(e) => {
                warn!(record_id = record.id, error = %e, "failed to serialize saved notification");
                0
            }
        }
    }

    /// Send to every open connection. Returns the number of recipients.
    pub async fn broadcast_all(&self, message: &str) -> usize {
        self.broadcast_to(|_| true, message).await
    }

    /// Send to every open connection except `sender`.
    pub async fn relay(&self, sender: &ConnectionId, message: &str) -> usize {
        self.broadcast_to(|conn| &conn.id != sender, message).await
    }

    /// Fan out over the live set as it is now; closed peers are evicted.
    async fn broadcast_to(
        &self,
        filter: impl Fn(&PeerConnection) -> bool,
        message: &str,
    ) -> usize {
        let message: Arc<str> = Arc::from(message);
        let mut delivered = 0usize;
        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read().await;
            for conn in conns.values().filter(|c| filter(c)) {
                if conn.send(Arc::clone(&message)) {
                    delivered += 1;
                } else {
                    to_remove.push(conn.id.clone());
                }
            }
        }

        for id in &to_remove {
            counter!(WS_BROADCAST_EVICTIONS_TOTAL).increment(1);
            warn!(conn_id = %id, "evicting closed connection");
            self.close(id).await;
        }
        delivered
    }

    /// Number of connections in the broadcast set.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}
