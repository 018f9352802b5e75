//! Live-connection registry.
//!
//! Maps each connection to its outbound queue and indexes connections by
//! authenticated identity so routing resolves identity -> live set in O(1).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use courier_core::ids::{ConnectionId, UserId};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(90);

/// A live connection. The identity is fixed at registration time; a later
/// re-authentication on the same physical connection is not supported.
pub struct Connection {
    pub id: ConnectionId,
    identity: Option<UserId>,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Connection {
    fn new(id: ConnectionId, identity: Option<UserId>, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            identity,
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn identity(&self) -> Option<&UserId> {
        self.identity.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CONNECTION_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all live connections plus the identity index.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    by_identity: DashMap<UserId, HashSet<ConnectionId>>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            by_identity: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a connection and return its ID + outbound receiver.
    /// Unauthenticated connections are held but never indexed by identity,
    /// so they can never be selected as a push target.
    pub fn register(&self, identity: Option<UserId>) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(Connection::new(id.clone(), identity.clone(), tx));
        self.connections.insert(id.clone(), conn);
        if let Some(user) = identity {
            self.by_identity.entry(user).or_default().insert(id.clone());
        }
        (id, rx)
    }

    /// Remove a connection from both maps. A no-op if already absent
    /// (duplicate close events are expected).
    pub fn unregister(&self, id: &ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(id) {
            conn.connected.store(false, Ordering::Relaxed);
            if let Some(user) = conn.identity.clone() {
                if let Some(mut set) = self.by_identity.get_mut(&user) {
                    set.remove(id);
                    let empty = set.is_empty();
                    drop(set);
                    if empty {
                        self.by_identity.remove_if(&user, |_, s| s.is_empty());
                    }
                }
            }
        }
    }

    /// Current live connection set for an identity. Empty means "offline",
    /// not an error.
    pub fn live_connections(&self, identity: &UserId) -> Vec<ConnectionId> {
        self.by_identity
            .get(identity)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The identity a connection authenticated as, if any.
    pub fn identity_of(&self, id: &ConnectionId) -> Option<UserId> {
        self.connections.get(id).and_then(|c| c.identity.clone())
    }

    /// Send a frame to a specific connection. Returns false on a full queue
    /// or closed channel — a soft failure; the caller decides whether to
    /// unregister.
    pub fn send_to(&self, id: &ConnectionId, message: String) -> bool {
        let Some(conn) = self.connections.get(id) else {
            return false;
        };
        if !conn.is_connected() {
            return false;
        }
        match conn.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection = %id,
                    frame_len = msg.len(),
                    "send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Remove connections that haven't answered pings within the timeout.
    pub fn cleanup_dead_connections(&self) -> usize {
        let dead: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect();

        let removed = dead.len();
        for id in dead {
            self.unregister(&id);
            tracing::info!(connection = %id, "cleaned up dead connection");
        }
        removed
    }
}

/// Handle a WebSocket connection: split into reader/writer, heartbeat, and
/// guarantee deregistration on every exit path.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ConnectionRegistry>,
    on_message: mpsc::Sender<(ConnectionId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward frames from the outbound queue + periodic ping
    let writer_cid = connection_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection = %writer_cid, "sent ping");
                }
            }
        }

        if let Some(conn) = writer_registry.connections.get(&writer_cid) {
            conn.connected.store(false, Ordering::Relaxed);
        }
    });

    // Reader task: forward inbound frames to the RPC loop, track pongs
    let reader_cid = connection_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_message.send((reader_cid.clone(), text.to_string())).await;
                }
                WsMessage::Pong(_) => {
                    if let Some(conn) = reader_registry.connections.get(&reader_cid) {
                        conn.record_pong();
                    }
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pongs automatically
                _ => {}
            }
        }
    });

    // Whichever half finishes first ends the connection
    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.unregister(&connection_id);
}

/// Start a background task that periodically sweeps dead connections.
pub fn start_cleanup_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_connections();
            if removed > 0 {
                tracing::info!(removed = removed, "dead connection sweep");
            }
        }
    })
}
