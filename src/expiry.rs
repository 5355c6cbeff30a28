use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::AppResult;
use crate::storage::MessageStore;

/// Wall-clock-scheduled redaction of disappearing messages.
///
/// Timers are ephemeral; only the due-time is persisted with the message.
/// `recover` rebuilds every timer from storage on process start.
pub struct ExpirationScheduler {
    store: Arc<dyn MessageStore>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ExpirationScheduler {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Arm a one-shot timer for the message. Past-due messages are expired
    /// immediately, without a timer. Re-scheduling the same message cancels
    /// any prior timer first.
    pub async fn schedule(
        self: &Arc<Self>,
        message_id: &str,
        expire_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.cancel(message_id).await;

        let delay = expire_at - Utc::now();
        if delay <= chrono::Duration::zero() {
            tracing::debug!(message_id = %message_id, "Expiration already due, redacting now");
            self.expire(message_id).await?;
            return Ok(());
        }

        let scheduler = Arc::clone(self);
        let id = message_id.to_string();
        let sleep_for = delay.to_std().unwrap_or_default();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;
            if let Err(e) = scheduler.expire(&id).await {
                tracing::warn!(error = %e, message_id = %id, "Scheduled expiration failed");
            }
            scheduler.timers.lock().await.remove(&id);
        });

        self.timers
            .lock()
            .await
            .insert(message_id.to_string(), handle);
        tracing::debug!(
            message_id = %message_id,
            expire_at = %expire_at,
            "Expiration timer armed"
        );
        Ok(())
    }

    /// Redact the message's visible content. Idempotent; a message deleted
    /// before its timer fired is a no-op. Recipients observe the redaction on
    /// their next read of the thread; no live notification is pushed.
    pub async fn expire(&self, message_id: &str) -> AppResult<()> {
        if self.store.redact(message_id).await? {
            tracing::info!(message_id = %message_id, "Disappearing message redacted");
        }
        Ok(())
    }

    /// Remove any armed timer without expiring the message (used when the
    /// message is deleted outright).
    pub async fn cancel(&self, message_id: &str) {
        if let Some(handle) = self.timers.lock().await.remove(message_id) {
            handle.abort();
            tracing::debug!(message_id = %message_id, "Expiration timer cancelled");
        }
    }

    /// Rebuild timers for every disappearing-but-not-yet-expired message.
    /// Called once on process start.
    pub async fn recover(self: &Arc<Self>) -> AppResult<usize> {
        let due = self.store.unexpired_disappearing().await?;
        let count = due.len();
        for (message_id, expire_at) in due {
            self.schedule(&message_id, expire_at).await?;
        }
        if count > 0 {
            tracing::info!(count = count, "Recovered expiration schedules from storage");
        }
        Ok(count)
    }

    /// Abort all armed timers
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    pub async fn armed_count(&self) -> usize {
        self.timers.lock().await.len()
    }
}
