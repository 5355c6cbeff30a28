// ============================================================================
// Message Routes
// ============================================================================
//
// Endpoints:
// - POST   /messages                      submit a message for delivery
// - POST   /messages/read                 mark all messages from a sender read
// - POST   /messages/:message_id/viewed   record a view-once view
// - GET    /messages/:message_id          read a message back
// - DELETE /messages/:message_id          delete before natural expiry
//
// ============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::{MAX_DISAPPEAR_SECS, MAX_MESSAGE_SIZE};
use crate::context::AppContext;
use crate::error::AppError;
use crate::message::{Message, MessageKind};
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMessageRequest {
    pub recipient_id: String,
    pub body: String,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub kind: MessageKind,
    /// Seconds until the content disappears; omitted = permanent
    #[serde(default)]
    pub disappear_after_secs: Option<i64>,
    #[serde(default)]
    pub view_once: bool,
}

/// POST /messages
/// Submits a fully-constructed message for delivery. Returns the stored
/// message with lifecycle fields populated for the delivered-or-queued
/// outcome.
pub async fn submit_message(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Json(req): Json<SubmitMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let sender_id = user.0;
    validate_submission(&sender_id, &req)?;

    let mut message = Message::new(&sender_id, &req.recipient_id, &req.body, req.kind);
    if let Some(attachment) = &req.attachment {
        message = message.with_attachment(attachment);
    }
    if let Some(secs) = req.disappear_after_secs {
        message = message.with_disappearing(secs);
    }
    if req.view_once {
        message = message.with_view_once();
    }

    let stored = ctx.engine.submit(message).await?;
    tracing::info!(
        message_id = %stored.id,
        delivered = stored.lifecycle.delivered,
        "Message submitted"
    );
    Ok((StatusCode::CREATED, Json(stored)))
}

fn validate_submission(sender_id: &str, req: &SubmitMessageRequest) -> Result<(), AppError> {
    if req.recipient_id.trim().is_empty() {
        return Err(AppError::validation("recipientId must not be empty"));
    }
    if sender_id == req.recipient_id {
        return Err(AppError::validation("Cannot send message to self"));
    }
    if req.body.is_empty() {
        return Err(AppError::validation("Message body must not be empty"));
    }
    if req.body.len() > MAX_MESSAGE_SIZE {
        return Err(AppError::validation(format!(
            "Message size exceeds maximum of {} bytes",
            MAX_MESSAGE_SIZE
        )));
    }
    if let Some(secs) = req.disappear_after_secs {
        if secs <= 0 {
            return Err(AppError::validation(
                "disappearAfterSecs must be greater than zero",
            ));
        }
        if secs > MAX_DISAPPEAR_SECS {
            return Err(AppError::validation(format!(
                "disappearAfterSecs must not exceed {}",
                MAX_DISAPPEAR_SECS
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub sender_id: String,
}

/// POST /messages/read
/// Marks all of the caller's unread messages from the given sender as read.
pub async fn mark_read(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = ctx.engine.mark_read(&user.0, &req.sender_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// POST /messages/:message_id/viewed
pub async fn mark_viewed(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let viewed_at = ctx.engine.mark_viewed(&message_id, &user.0).await?;
    Ok(Json(json!({
        "messageId": message_id,
        "viewedAt": viewed_at,
    })))
}

/// GET /messages/:message_id
pub async fn fetch_message(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let message = ctx.engine.fetch(&message_id, &user.0).await?;
    Ok(Json(message))
}

/// DELETE /messages/:message_id
pub async fn delete_message(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    ctx.engine.delete(&message_id, &user.0).await?;
    Ok(Json(json!({ "status": "ok" })))
}
