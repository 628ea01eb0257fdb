//! Real-time interaction core: presence, chat resolution, message delivery,
//! notification fan-out and activity retention.

pub mod activity;
pub mod delivery;
pub mod error;
pub mod notifications;
pub mod presence;
pub mod resolver;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use socio_db::Store;

pub use error::{DeliveryFailure, SocioError, SocioResult};

use crate::activity::ActivityCompactor;
use crate::delivery::MessagePipeline;
use crate::notifications::NotificationEngine;
use crate::presence::PresenceRegistry;
use crate::resolver::ChatResolver;

/// Shared handle to the persistence gateway.
pub type SharedStore = Arc<dyn Store>;

/// Retention window for per-user activity records.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 5;

/// Every engine, wired to one store and one presence registry.
#[derive(Clone)]
pub struct Core {
    pub presence: PresenceRegistry,
    pub chats: ChatResolver,
    pub messages: MessagePipeline,
    pub notifications: NotificationEngine,
    pub activities: ActivityCompactor,
}

impl Core {
    pub fn new(store: SharedStore, activity_limit: usize) -> Self {
        let presence = PresenceRegistry::new();
        Self {
            chats: ChatResolver::new(store.clone()),
            messages: MessagePipeline::new(store.clone(), presence.clone()),
            notifications: NotificationEngine::new(store.clone(), presence.clone()),
            activities: ActivityCompactor::new(store, activity_limit),
            presence,
        }
    }
}

/// Run a blocking store call on the blocking pool.
pub(crate) async fn blocking<F, T>(store: &SharedStore, f: F) -> SocioResult<T>
where
    F: FnOnce(&dyn Store) -> SocioResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!("spawn_blocking join error: {}", e);
            SocioError::TransientStore(anyhow::anyhow!("blocking task failed: {}", e))
        })?
}

/// Current time at the precision the store keeps (milliseconds).
pub(crate) fn now() -> chrono::DateTime<chrono::Utc> {
    use chrono::SubsecRound;
    chrono::Utc::now().trunc_subsecs(3)
}
