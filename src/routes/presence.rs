// ============================================================================
// Presence Routes
// ============================================================================

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::extractors::AuthenticatedUser;

/// GET /presence/online
pub async fn list_online(
    State(ctx): State<Arc<AppContext>>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let users = ctx.presence.list_online().await;
    Ok(Json(json!({ "users": users })))
}

/// GET /presence/:user_id
/// Reports online state and last activity; offline users keep their last-seen
/// status for a while after disconnect.
pub async fn user_status(
    State(ctx): State<Arc<AppContext>>,
    _user: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = ctx
        .presence
        .status(&user_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("no presence for user {}", user_id)))?;
    Ok(Json(status))
}
