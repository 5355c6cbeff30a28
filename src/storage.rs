use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::message::{Message, DISAPPEARED_BODY};

/// Collaborator seam for the durable message store.
///
/// The store owns the messages; this subsystem owns the lifecycle transitions,
/// so every mutation here is a narrow check-and-set that preserves the
/// monotonic sent -> delivered -> read order.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: Message) -> AppResult<Message>;

    async fn get(&self, message_id: &str) -> AppResult<Option<Message>>;

    /// Transition to delivered. Returns false if the message was already
    /// delivered (no state change, no receipt should be emitted).
    async fn mark_delivered(&self, message_id: &str, at: DateTime<Utc>) -> AppResult<bool>;

    /// Bulk-transition all unread messages from `sender_id` to `recipient_id`
    /// to read. Returns the ids that actually changed state, in store order.
    async fn mark_read(
        &self,
        recipient_id: &str,
        sender_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<String>>;

    /// Record a view-once view. Fails with `AlreadyViewed` if the viewer has
    /// already seen the message. Returns the updated message.
    async fn mark_viewed(
        &self,
        message_id: &str,
        viewer_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Message>;

    /// Redact a disappearing message's visible content. Idempotent: returns
    /// false if the message was already expired or no longer exists.
    async fn redact(&self, message_id: &str) -> AppResult<bool>;

    async fn remove(&self, message_id: &str) -> AppResult<bool>;

    /// All disappearing-but-not-yet-expired messages with their due-times,
    /// used to rebuild timers on startup.
    async fn unexpired_disappearing(&self) -> AppResult<Vec<(String, DateTime<Utc>)>>;
}

#[derive(Default)]
struct StoreInner {
    /// Insertion order, so bulk reads and recovery walk messages oldest-first
    order: Vec<String>,
    messages: HashMap<String, Message>,
}

/// In-memory message store for tests and single-node deployments
#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: Message) -> AppResult<Message> {
        let mut inner = self.inner.write().await;
        if inner.messages.contains_key(&message.id) {
            return Err(AppError::validation(format!(
                "duplicate message id {}",
                message.id
            )));
        }
        inner.order.push(message.id.clone());
        inner.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn get(&self, message_id: &str) -> AppResult<Option<Message>> {
        Ok(self.inner.read().await.messages.get(message_id).cloned())
    }

    async fn mark_delivered(&self, message_id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(message_id)
            .ok_or_else(|| AppError::not_found(format!("message {}", message_id)))?;

        if message.lifecycle.delivered {
            return Ok(false);
        }
        message.lifecycle.delivered = true;
        message.lifecycle.delivered_at = Some(at);
        Ok(true)
    }

    async fn mark_read(
        &self,
        recipient_id: &str,
        sender_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<String>> {
        let mut inner = self.inner.write().await;
        let order = inner.order.clone();
        let mut transitioned = Vec::new();

        for id in order {
            let Some(message) = inner.messages.get_mut(&id) else {
                continue;
            };
            if message.recipient_id != recipient_id
                || message.sender_id != sender_id
                || message.lifecycle.read
            {
                continue;
            }
            message.lifecycle.read = true;
            message.lifecycle.read_at = Some(at);
            // Read implies delivered
            if !message.lifecycle.delivered {
                message.lifecycle.delivered = true;
                message.lifecycle.delivered_at = Some(at);
            }
            transitioned.push(id);
        }
        Ok(transitioned)
    }

    async fn mark_viewed(
        &self,
        message_id: &str,
        viewer_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Message> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(message_id)
            .ok_or_else(|| AppError::not_found(format!("message {}", message_id)))?;

        if !message.view_once.enabled {
            return Err(AppError::validation(format!(
                "message {} is not view-once",
                message_id
            )));
        }
        if message.recipient_id != viewer_id {
            return Err(AppError::forbidden(
                "Only the intended recipient can view this message",
            ));
        }
        if message.view_once.viewed_by.iter().any(|v| v == viewer_id) {
            return Err(AppError::AlreadyViewed(message_id.to_string()));
        }

        message.view_once.viewed_by.push(viewer_id.to_string());
        // viewed_at is stamped on first view only
        if message.view_once.viewed_at.is_none() {
            message.view_once.viewed_at = Some(at);
        }
        Ok(message.clone())
    }

    async fn redact(&self, message_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(message) = inner.messages.get_mut(message_id) else {
            // Deleted before its timer fired; nothing to redact
            return Ok(false);
        };
        if message.disappearing.expired {
            return Ok(false);
        }
        message.body = DISAPPEARED_BODY.to_string();
        message.attachment = None;
        message.disappearing.expired = true;
        Ok(true)
    }

    async fn remove(&self, message_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        inner.order.retain(|id| id != message_id);
        Ok(inner.messages.remove(message_id).is_some())
    }

    async fn unexpired_disappearing(&self) -> AppResult<Vec<(String, DateTime<Utc>)>> {
        let inner = self.inner.read().await;
        let mut due = Vec::new();
        for id in &inner.order {
            let Some(message) = inner.messages.get(id) else {
                continue;
            };
            if message.disappearing.enabled && !message.disappearing.expired {
                if let Some(expire_at) = message.disappearing.expire_at {
                    due.push((id.clone(), expire_at));
                }
            }
        }
        Ok(due)
    }
}
