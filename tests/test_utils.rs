// ============================================================================
// Shared test helpers
// ============================================================================
//
// Tests drive the delivery subsystem through the same calls the Connection
// Endpoint makes: register a channel transport with the presence registry,
// confirm the flushed backlog, then read frames off the receiver.
//
// ============================================================================

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use courier::auth::InMemorySessions;
use courier::config::Config;
use courier::context::AppContext;
use courier::message::ServerEvent;
use courier::storage::InMemoryMessageStore;

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        heartbeat_interval_secs: 25,
        allowed_origins: vec!["https://app.example.com".into()],
        jwt_secret: "integration-test-secret".into(),
        jwt_issuer: "courier".into(),
        access_token_ttl_hours: 1,
    }
}

pub fn build_context() -> Arc<AppContext> {
    Arc::new(AppContext::new(
        test_config(),
        Arc::new(InMemoryMessageStore::new()),
        Arc::new(InMemorySessions::new()),
    ))
}

/// Open a stream for the user the way the Connection Endpoint does:
/// register a transport, then confirm the flushed backlog.
pub async fn subscribe(
    ctx: &Arc<AppContext>,
    user_id: &str,
) -> mpsc::UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let flushed = ctx.presence.register(user_id, tx).await;
    ctx.engine
        .confirm_flushed(&flushed)
        .await
        .expect("flush confirmation failed");
    rx
}

/// Receive the next frame, failing the test if none arrives in time
pub async fn next_frame(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("stream closed unexpectedly")
}

/// Skip frames until one matches the predicate, failing the test on timeout
pub async fn wait_for_frame(
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    mut pred: impl FnMut(&ServerEvent) -> bool,
) -> ServerEvent {
    loop {
        let frame = next_frame(rx).await;
        if pred(&frame) {
            return frame;
        }
    }
}

/// Drain everything currently buffered on the stream
pub fn drain_buffered(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) {
    while rx.try_recv().is_ok() {}
}
