use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::context::AppContext;

/// GET /health
pub async fn health_check(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let online = ctx.presence.list_online().await.len();
    let armed_timers = ctx.expirations.armed_count().await;
    Json(json!({
        "status": "ok",
        "online": online,
        "armedTimers": armed_timers,
    }))
}
