use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::expiry::ExpirationScheduler;
use crate::message::{Message, ReceiptStatus, ServerEvent};
use crate::presence::PresenceRegistry;
use crate::storage::MessageStore;

/// Orchestrates the send -> store -> push-or-queue -> acknowledge lifecycle
/// and the read-receipt lifecycle.
///
/// Per-message state machine: CREATED -> SENT -> (DELIVERED | QUEUED) -> READ.
pub struct DeliveryEngine {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
    expirations: Arc<ExpirationScheduler>,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: Arc<PresenceRegistry>,
        expirations: Arc<ExpirationScheduler>,
    ) -> Self {
        Self {
            store,
            presence,
            expirations,
        }
    }

    /// Persist the message and push it to the recipient if reachable.
    ///
    /// The delivery confirmation to the sender is generated synchronously
    /// within this call when the recipient was reachable, so the sender's
    /// "I sent" -> "it was delivered" ordering holds for each message. If the
    /// recipient is unreachable the registry has already queued the payload
    /// and the message stays undelivered until the next drain.
    pub async fn submit(&self, mut message: Message) -> AppResult<Message> {
        message.lifecycle.sent = true;
        let message = self.store.insert(message).await?;
        let message_id = message.id.clone();

        let pushed = self
            .presence
            .send(&message.recipient_id, ServerEvent::Message(message.clone()))
            .await;

        if pushed {
            let delivered_at = Utc::now();
            if self.store.mark_delivered(&message_id, delivered_at).await? {
                self.presence
                    .send(
                        &message.sender_id,
                        ServerEvent::MessageStatus {
                            message_id: message_id.clone(),
                            status: ReceiptStatus::Delivered,
                        },
                    )
                    .await;
            }
            tracing::debug!(message_id = %message_id, "Message delivered to online recipient");
        } else {
            tracing::debug!(
                message_id = %message_id,
                recipient_id = %message.recipient_id,
                "Recipient offline, message queued for later delivery"
            );
        }

        if let Some(expire_at) = message.disappearing.expire_at {
            if message.disappearing.enabled {
                self.expirations.schedule(&message_id, expire_at).await?;
            }
        }

        self.store
            .get(&message_id)
            .await?
            .ok_or_else(|| AppError::internal(format!("message {} vanished after insert", message_id)))
    }

    /// Confirm messages that were flushed from the pending queue on a
    /// reconnect: mark each one delivered and notify its sender, exactly once
    /// per transition.
    pub async fn confirm_flushed(&self, flushed: &[ServerEvent]) -> AppResult<()> {
        for event in flushed {
            let ServerEvent::Message(message) = event else {
                continue;
            };
            if !self.store.mark_delivered(&message.id, Utc::now()).await? {
                continue;
            }
            self.presence
                .send(
                    &message.sender_id,
                    ServerEvent::MessageStatus {
                        message_id: message.id.clone(),
                        status: ReceiptStatus::Delivered,
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Bulk-transition all of the recipient's unread messages from `sender_id`
    /// to read, pushing one receipt per transitioned message to the sender.
    /// Repeated calls transition nothing and emit nothing.
    pub async fn mark_read(&self, recipient_id: &str, sender_id: &str) -> AppResult<usize> {
        let now = Utc::now();
        let transitioned = self.store.mark_read(recipient_id, sender_id, now).await?;

        for message_id in &transitioned {
            self.presence
                .send(
                    sender_id,
                    ServerEvent::MessageStatus {
                        message_id: message_id.clone(),
                        status: ReceiptStatus::Read,
                    },
                )
                .await;
        }

        if !transitioned.is_empty() {
            tracing::debug!(
                recipient_id = %recipient_id,
                sender_id = %sender_id,
                count = transitioned.len(),
                "Messages marked read"
            );
        }
        Ok(transitioned.len())
    }

    /// Record a view-once view and notify the sender. Re-invocation by the
    /// same viewer fails with `AlreadyViewed` and emits nothing.
    pub async fn mark_viewed(
        &self,
        message_id: &str,
        viewer_id: &str,
    ) -> AppResult<DateTime<Utc>> {
        let now = Utc::now();
        let message = self.store.mark_viewed(message_id, viewer_id, now).await?;
        let viewed_at = message
            .view_once
            .viewed_at
            .ok_or_else(|| AppError::internal("view recorded without a timestamp"))?;

        self.presence
            .send(
                &message.sender_id,
                ServerEvent::MessageViewed {
                    message_id: message_id.to_string(),
                    viewed_by: viewer_id.to_string(),
                    viewed_at,
                },
            )
            .await;

        tracing::debug!(message_id = %message_id, viewed_by = %viewer_id, "View-once message viewed");
        Ok(viewed_at)
    }

    /// Delete a message outright before its natural expiry, cancelling any
    /// armed expiration timer. Only the sender may delete.
    pub async fn delete(&self, message_id: &str, requester_id: &str) -> AppResult<()> {
        let message = self
            .store
            .get(message_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("message {}", message_id)))?;

        if message.sender_id != requester_id {
            return Err(AppError::forbidden("Only the sender can delete a message"));
        }

        self.store.remove(message_id).await?;
        self.expirations.cancel(message_id).await;
        tracing::info!(message_id = %message_id, "Message deleted");
        Ok(())
    }

    /// Read a message back; only the sender or the recipient may do so. This
    /// is the path by which recipients observe a silent redaction.
    pub async fn fetch(&self, message_id: &str, requester_id: &str) -> AppResult<Message> {
        let message = self
            .store
            .get(message_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("message {}", message_id)))?;

        if message.sender_id != requester_id && message.recipient_id != requester_id {
            return Err(AppError::forbidden(
                "Only the sender or recipient can read this message",
            ));
        }
        Ok(message)
    }
}
