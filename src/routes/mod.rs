// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Structure:
// - mod.rs: router assembly and middleware
// - events.rs: persistent event-stream subscribe endpoint
// - messages.rs: submit / mark-read / mark-viewed / delete / fetch
// - presence.rs: online list and per-user presence
// - health.rs: liveness probe
// - extractors.rs: authenticated-user extractor over the credential resolver
//
// ============================================================================

mod events;
mod extractors;
mod health;
mod messages;
mod presence;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

/// Create the main application router with all routes
pub fn create_router(app_context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Persistent event stream (Connection Endpoint)
        .route("/events", get(events::subscribe))
        // Message lifecycle
        .route("/messages", post(messages::submit_message))
        .route("/messages/read", post(messages::mark_read))
        .route("/messages/:message_id/viewed", post(messages::mark_viewed))
        .route(
            "/messages/:message_id",
            get(messages::fetch_message).delete(messages::delete_message),
        )
        // Presence queries
        .route("/presence/online", get(presence::list_online))
        .route("/presence/:user_id", get(presence::user_status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(app_context)
}
