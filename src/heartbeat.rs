use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::message::ServerEvent;
use crate::presence::PresenceRegistry;

/// Arm the per-connection keep-alive timer.
///
/// Writes a keep-alive frame every `interval`; the first tick fires one full
/// interval after registration because the endpoint already pushed an
/// immediate keep-alive. A failed write means the receiving task is gone, so
/// the connection is closed with reason "heartbeat-failed". The close runs on
/// its own task: `close` aborts this handle, and aborting the task that is
/// mid-close would skip the offline broadcast.
pub fn spawn(
    registry: Arc<PresenceRegistry>,
    user_id: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            if tx.send(ServerEvent::KeepAlive).is_err() {
                tracing::debug!(user_id = %user_id, "Keep-alive write failed, closing connection");
                tokio::spawn(async move {
                    registry.close(&user_id, "heartbeat-failed").await;
                });
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PendingQueue;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_emits_keep_alive_frames() {
        let registry = Arc::new(PresenceRegistry::new(
            Arc::new(PendingQueue::new()),
            Duration::from_secs(25),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn(
            Arc::clone(&registry),
            "alice".into(),
            tx,
            Duration::from_secs(25),
        );

        tokio::time::sleep(Duration::from_secs(26)).await;
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::KeepAlive)));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::KeepAlive)));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_receiver_closes_connection() {
        let registry = Arc::new(PresenceRegistry::new(
            Arc::new(PendingQueue::new()),
            Duration::from_secs(25),
        ));
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        registry.register("alice", conn_tx).await;
        assert!(registry.is_online("alice").await);

        // Client goes away without a clean close
        drop(conn_rx);
        tokio::time::sleep(Duration::from_secs(26)).await;
        // Let the spawned close task run
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!registry.is_online("alice").await);
    }
}
