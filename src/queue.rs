use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::message::ServerEvent;

/// Per-user ordered buffer of events that could not be pushed live.
///
/// Append-only until drained; a drain removes and returns the entire list so
/// the reconnect flush can never observe a partial subset. Growth is unbounded
/// for users who never reconnect (known limitation, see DESIGN.md).
#[derive(Default)]
pub struct PendingQueue {
    inner: Mutex<HashMap<String, Vec<ServerEvent>>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, user_id: &str, event: ServerEvent) {
        let mut queues = self.inner.lock().await;
        let queue = queues.entry(user_id.to_string()).or_default();
        queue.push(event);
        tracing::debug!(user_id = %user_id, depth = queue.len(), "Event queued for offline delivery");
    }

    /// Atomically remove and return all queued events for the user, in
    /// original enqueue order.
    pub async fn drain(&self, user_id: &str) -> Vec<ServerEvent> {
        let drained = self
            .inner
            .lock()
            .await
            .remove(user_id)
            .unwrap_or_default();
        if !drained.is_empty() {
            tracing::debug!(user_id = %user_id, count = drained.len(), "Drained pending queue");
        }
        drained
    }

    /// Number of events currently queued for the user
    pub async fn depth(&self, user_id: &str) -> usize {
        self.inner
            .lock()
            .await
            .get(user_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }
}
