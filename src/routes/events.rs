// ============================================================================
// Connection Endpoint - Persistent Event Stream
// ============================================================================
//
// GET /events establishes the long-lived server-to-client stream. The caller
// must be authenticated before any stream state is allocated, and the Origin
// header (when present) must match the configured allow-list; the matched
// value is echoed back verbatim.
//
// First frames on a new stream, in order:
// 1. an immediate keepAlive
// 2. the onlineUsersList snapshot
// 3. any queued messages, in original enqueue order
// Live events follow.
//
// ============================================================================

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
};
use futures_util::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::Config;
use crate::context::AppContext;
use crate::error::AppError;
use crate::message::ServerEvent;
use crate::routes::extractors::AuthenticatedUser;

pub async fn subscribe(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let cors = cors_headers(&ctx.config, &headers)?;
    let user_id = user.0;

    let (tx, rx) = mpsc::unbounded_channel();
    let flushed = ctx.presence.register(&user_id, tx).await;
    if let Err(e) = ctx.engine.confirm_flushed(&flushed).await {
        tracing::warn!(error = %e, user_id = %user_id, "Failed to confirm flushed deliveries");
    }

    Ok((cors, Sse::new(event_stream(rx))))
}

fn event_stream(
    rx: mpsc::UnboundedReceiver<ServerEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::once(async { ServerEvent::KeepAlive })
        .chain(UnboundedReceiverStream::new(rx))
        .map(|event| {
            Ok(Event::default()
                .json_data(&event)
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Failed to serialize outbound event");
                    Event::default().comment("serialization error")
                }))
        })
}

/// Select the CORS echo value for the caller's Origin. A missing Origin is
/// fine (non-browser client); a present-but-unlisted one is rejected before
/// any stream state exists.
fn cors_headers(config: &Config, headers: &HeaderMap) -> Result<HeaderMap, AppError> {
    let mut out = HeaderMap::new();
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return Ok(out);
    };

    if !config.origin_allowed(origin) {
        tracing::warn!(origin = %origin, "Subscribe rejected: origin not in allow-list");
        return Err(AppError::forbidden("Origin not allowed"));
    }

    let echo = HeaderValue::from_str(origin)
        .map_err(|_| AppError::validation("Malformed Origin header"))?;
    out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, echo);
    out.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    out.insert(header::VARY, HeaderValue::from_static("Origin"));
    Ok(out)
}
