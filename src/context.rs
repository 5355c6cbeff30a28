use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthManager, SessionBackend};
use crate::config::Config;
use crate::delivery::DeliveryEngine;
use crate::expiry::ExpirationScheduler;
use crate::presence::PresenceRegistry;
use crate::queue::PendingQueue;
use crate::storage::MessageStore;

/// Application context containing shared dependencies.
///
/// Built once on startup, passed by reference to the components that need it;
/// `shutdown` tears down every connection and timer so nothing outlives the
/// context.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn MessageStore>,
    pub pending: Arc<PendingQueue>,
    pub presence: Arc<PresenceRegistry>,
    pub expirations: Arc<ExpirationScheduler>,
    pub engine: Arc<DeliveryEngine>,
    pub auth: Arc<AuthManager>,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Arc<dyn MessageStore>,
        sessions: Arc<dyn SessionBackend>,
    ) -> Self {
        let config = Arc::new(config);
        let pending = Arc::new(PendingQueue::new());
        let presence = Arc::new(PresenceRegistry::new(
            Arc::clone(&pending),
            Duration::from_secs(config.heartbeat_interval_secs),
        ));
        let expirations = Arc::new(ExpirationScheduler::new(Arc::clone(&store)));
        let engine = Arc::new(DeliveryEngine::new(
            Arc::clone(&store),
            Arc::clone(&presence),
            Arc::clone(&expirations),
        ));
        let auth = Arc::new(AuthManager::new(&config, sessions));

        Self {
            config,
            store,
            pending,
            presence,
            expirations,
            engine,
            auth,
        }
    }

    /// Close all connections and abort all timers
    pub async fn shutdown(&self) {
        self.presence.shutdown().await;
        self.expirations.shutdown().await;
        tracing::info!("Delivery subsystem shut down");
    }
}
