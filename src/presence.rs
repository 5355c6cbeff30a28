use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::heartbeat;
use crate::message::ServerEvent;
use crate::queue::PendingQueue;

/// A live outbound stream handle for one user. Owned exclusively by the
/// registry; exactly one per user id at any instant.
pub struct Connection {
    pub user_id: String,
    pub tx: mpsc::UnboundedSender<ServerEvent>,
    pub connected_at: DateTime<Utc>,
    heartbeat: JoinHandle<()>,
}

/// Presence as reported to collaborators. Survives disconnect so "last seen"
/// can still be answered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub user_id: String,
    pub is_online: bool,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Single source of truth for "is this user currently reachable".
///
/// Every other component reads and writes presence through this contract;
/// nothing reaches into the maps directly. Created in `AppContext::new`;
/// `shutdown` tears down every live handle.
pub struct PresenceRegistry {
    connections: RwLock<HashMap<String, Connection>>,
    statuses: RwLock<HashMap<String, PresenceStatus>>,
    pending: Arc<PendingQueue>,
    heartbeat_interval: Duration,
}

impl PresenceRegistry {
    pub fn new(pending: Arc<PendingQueue>, heartbeat_interval: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            pending,
            heartbeat_interval,
        }
    }

    /// Register a live connection for the user.
    ///
    /// An existing connection for the same user is closed first (reason
    /// "replaced"). While the connections write lock is held the new stream
    /// receives the `onlineUsersList` snapshot and the drained backlog, so
    /// queued events always precede any live push that races with the
    /// reconnect. Returns the drained backlog so the endpoint can confirm
    /// deliveries.
    pub async fn register(
        self: &Arc<Self>,
        user_id: &str,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Vec<ServerEvent> {
        let now = Utc::now();
        let heartbeat = heartbeat::spawn(
            Arc::clone(self),
            user_id.to_string(),
            tx.clone(),
            self.heartbeat_interval,
        );

        let drained;
        {
            let mut connections = self.connections.write().await;

            if let Some(old) = connections.remove(user_id) {
                old.heartbeat.abort();
                let _ = old.tx.send(ServerEvent::ConnectionClosed {
                    reason: "replaced".to_string(),
                });
                tracing::debug!(user_id = %user_id, "Existing connection replaced");
            }

            connections.insert(
                user_id.to_string(),
                Connection {
                    user_id: user_id.to_string(),
                    tx: tx.clone(),
                    connected_at: now,
                    heartbeat,
                },
            );

            let users: Vec<String> = connections.keys().cloned().collect();
            let _ = tx.send(ServerEvent::OnlineUsersList { users });

            drained = self.pending.drain(user_id).await;
            for event in &drained {
                let _ = tx.send(event.clone());
            }
        }

        self.statuses.write().await.insert(
            user_id.to_string(),
            PresenceStatus {
                user_id: user_id.to_string(),
                is_online: true,
                connected_at: now,
                last_activity: now,
            },
        );

        self.broadcast(
            ServerEvent::UserStatus {
                user_id: user_id.to_string(),
                is_online: true,
                timestamp: now,
            },
            Some(user_id),
        )
        .await;

        tracing::info!(user_id = %user_id, queued = drained.len(), "Connection registered");
        drained
    }

    /// Tear down the user's connection. Idempotent: closing an absent
    /// connection is a no-op.
    pub async fn close(&self, user_id: &str, reason: &str) {
        let removed = self.connections.write().await.remove(user_id);
        let Some(connection) = removed else {
            return;
        };

        connection.heartbeat.abort();
        // Best-effort close frame; the transport may already be gone
        let _ = connection.tx.send(ServerEvent::ConnectionClosed {
            reason: reason.to_string(),
        });

        let now = Utc::now();
        if let Some(status) = self.statuses.write().await.get_mut(user_id) {
            status.is_online = false;
            status.last_activity = now;
        }

        self.broadcast(
            ServerEvent::UserStatus {
                user_id: user_id.to_string(),
                is_online: false,
                timestamp: now,
            },
            Some(user_id),
        )
        .await;

        tracing::info!(user_id = %user_id, reason = %reason, "Connection closed");
    }

    /// Attempt to write the event to the user's live transport.
    ///
    /// Any failure is treated as a disconnect: the connection is closed, the
    /// event is re-queued for the user's next session, and false is returned.
    /// A dead handle is never retried; recovery happens via a fresh register.
    pub async fn send(&self, user_id: &str, event: ServerEvent) -> bool {
        let tx = {
            let connections = self.connections.read().await;
            connections.get(user_id).map(|c| c.tx.clone())
        };

        let Some(tx) = tx else {
            self.pending.enqueue(user_id, event).await;
            return false;
        };

        match tx.send(event) {
            Ok(()) => {
                self.touch(user_id).await;
                true
            }
            Err(mpsc::error::SendError(event)) => {
                tracing::debug!(user_id = %user_id, "Transport write failed, treating as disconnect");
                self.close(user_id, "transport-error").await;
                self.pending.enqueue(user_id, event).await;
                false
            }
        }
    }

    /// Best-effort fan-out to every live connection except `exclude`.
    /// Failures close the offending connection but never abort delivery to
    /// the rest, and nothing is queued.
    pub async fn broadcast(&self, event: ServerEvent, exclude: Option<&str>) {
        let targets: Vec<(String, mpsc::UnboundedSender<ServerEvent>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(user_id, _)| exclude != Some(user_id.as_str()))
                .map(|(user_id, c)| (user_id.clone(), c.tx.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (user_id, tx) in targets {
            if tx.send(event.clone()).is_err() {
                dead.push(user_id);
            }
        }
        for user_id in dead {
            // Boxed: close broadcasts the offline status, which can find
            // further dead connections, so this call is recursive
            Box::pin(self.close(&user_id, "transport-error")).await;
        }
    }

    pub async fn list_online(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    pub async fn status(&self, user_id: &str) -> Option<PresenceStatus> {
        self.statuses.read().await.get(user_id).cloned()
    }

    /// Close every connection and cancel every heartbeat
    pub async fn shutdown(&self) {
        let user_ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        for user_id in user_ids {
            self.close(&user_id, "shutdown").await;
        }
    }

    async fn touch(&self, user_id: &str) {
        if let Some(status) = self.statuses.write().await.get_mut(user_id) {
            status.last_activity = Utc::now();
        }
    }
}
