use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use socio_types::events::GatewayEvent;

use crate::error::DeliveryFailure;

/// Send side of one live client session.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    /// New handle plus the receiver the connection task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: Uuid::new_v4(), tx }, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Best-effort, at-most-once push.
    pub fn push(&self, username: &str, event: GatewayEvent) -> Result<(), DeliveryFailure> {
        self.tx.send(event).map_err(|_| DeliveryFailure {
            username: username.to_string(),
            conn_id: self.id,
        })
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Process-wide map of username -> live connections.
///
/// Each mutation is one insert/remove under a single write lock, so concurrent
/// connects and disconnects never lose updates. The locks are synchronous so
/// that [`PresenceGuard`] can deregister from `Drop`.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    connections: RwLock<HashMap<String, HashMap<Uuid, ConnectionHandle>>>,

    /// Online/offline transitions, fanned out to every subscribed connection
    presence_tx: broadcast::Sender<GatewayEvent>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        let (presence_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(PresenceInner {
                connections: RwLock::new(HashMap::new()),
                presence_tx,
            }),
        }
    }

    /// Subscribe to presence transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.presence_tx.subscribe()
    }

    /// Subscribe, then list who is online. Any transition after the snapshot
    /// reaches the receiver; one racing it may arrive as a duplicate.
    pub fn subscribe_with_snapshot(&self) -> (broadcast::Receiver<GatewayEvent>, Vec<String>) {
        let rx = self.subscribe();
        (rx, self.online_users())
    }

    /// Add a connection for `username`. Registering a known handle is a no-op.
    /// Returns true when this call took the user from offline to online.
    pub fn register_connection(&self, username: &str, handle: ConnectionHandle) -> bool {
        let came_online = {
            let mut connections = self
                .inner
                .connections
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let sessions = connections.entry(username.to_string()).or_default();
            let was_empty = sessions.is_empty();
            sessions.entry(handle.id).or_insert(handle);
            was_empty
        };

        if came_online {
            debug!("{} is online", username);
            self.announce(username, true);
        }
        came_online
    }

    /// Remove one connection. Removing an unknown handle is a no-op.
    /// Returns true when this call took the user from online to offline.
    pub fn deregister_connection(&self, username: &str, conn_id: Uuid) -> bool {
        let went_offline = {
            let mut connections = self
                .inner
                .connections
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let removed_last = match connections.get_mut(username) {
                Some(sessions) => sessions.remove(&conn_id).is_some() && sessions.is_empty(),
                None => false,
            };
            if removed_last {
                connections.remove(username);
            }
            removed_last
        };

        if went_offline {
            debug!("{} is offline", username);
            self.announce(username, false);
        }
        went_offline
    }

    /// Register and return a guard that deregisters when dropped.
    pub fn register_guarded(&self, username: &str, handle: ConnectionHandle) -> PresenceGuard {
        let conn_id = handle.id;
        self.register_connection(username, handle);
        PresenceGuard {
            registry: self.clone(),
            username: username.to_string(),
            conn_id,
        }
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.inner
            .connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(username)
            .is_some_and(|sessions| !sessions.is_empty())
    }

    pub fn connections_for(&self, username: &str) -> Vec<ConnectionHandle> {
        self.inner
            .connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(username)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .inner
            .connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        users.sort();
        users
    }

    /// Push `event` to every live connection of `username`.
    /// Failures are returned for logging; they never abort the remaining pushes.
    pub fn push_to_user(&self, username: &str, event: &GatewayEvent) -> (usize, Vec<DeliveryFailure>) {
        let mut delivered = 0;
        let mut failures = Vec::new();
        for handle in self.connections_for(username) {
            match handle.push(username, event.clone()) {
                Ok(()) => delivered += 1,
                Err(failure) => failures.push(failure),
            }
        }
        (delivered, failures)
    }

    fn announce(&self, username: &str, online: bool) {
        // No subscribers is fine
        let _ = self.inner.presence_tx.send(GatewayEvent::PresenceUpdate {
            username: username.to_string(),
            online,
        });
    }
}

/// Deregisters its connection on drop, including when the owning task is
/// cancelled by an abrupt transport loss.
pub struct PresenceGuard {
    registry: PresenceRegistry,
    username: String,
    conn_id: Uuid,
}

impl PresenceGuard {
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.registry.deregister_connection(&self.username, self.conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_iff_connection_set_non_empty() {
        let registry = PresenceRegistry::new();
        let (first, _rx1) = ConnectionHandle::new();
        let (second, _rx2) = ConnectionHandle::new();
        let (first_id, second_id) = (first.id(), second.id());

        assert!(!registry.is_online("alice"));
        assert!(registry.register_connection("alice", first));
        assert!(!registry.register_connection("alice", second));
        assert!(registry.is_online("alice"));
        assert_eq!(registry.connections_for("alice").len(), 2);

        assert!(!registry.deregister_connection("alice", first_id));
        assert!(registry.is_online("alice"));
        assert!(registry.deregister_connection("alice", second_id));
        assert!(!registry.is_online("alice"));
        assert!(registry.online_users().is_empty());
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = PresenceRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();
        let id = handle.id();

        registry.register_connection("bob", handle.clone());
        assert!(!registry.register_connection("bob", handle));
        assert_eq!(registry.connections_for("bob").len(), 1);

        assert!(registry.deregister_connection("bob", id));
        assert!(!registry.deregister_connection("bob", id));
        assert!(!registry.deregister_connection("nobody", Uuid::new_v4()));
    }

    #[test]
    fn guard_deregisters_on_drop() {
        let registry = PresenceRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();

        let guard = registry.register_guarded("carol", handle);
        assert!(registry.is_online("carol"));
        drop(guard);
        assert!(!registry.is_online("carol"));
    }

    #[test]
    fn transitions_are_announced_once() {
        let registry = PresenceRegistry::new();
        let mut events = registry.subscribe();
        let (a, _rx1) = ConnectionHandle::new();
        let (b, _rx2) = ConnectionHandle::new();
        let (a_id, b_id) = (a.id(), b.id());

        registry.register_connection("dave", a);
        registry.register_connection("dave", b);
        registry.deregister_connection("dave", a_id);
        registry.deregister_connection("dave", b_id);

        assert_eq!(
            events.try_recv().unwrap(),
            GatewayEvent::PresenceUpdate { username: "dave".into(), online: true }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            GatewayEvent::PresenceUpdate { username: "dave".into(), online: false }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn offline_after_snapshot_is_not_missed() {
        let registry = PresenceRegistry::new();
        let (grace, _rx) = ConnectionHandle::new();
        let grace_id = grace.id();
        registry.register_connection("grace", grace);

        let (mut events, snapshot) = registry.subscribe_with_snapshot();
        assert_eq!(snapshot, vec!["grace".to_string()]);

        // Grace leaves before the new client has sent anything
        registry.deregister_connection("grace", grace_id);

        assert_eq!(
            events.try_recv().unwrap(),
            GatewayEvent::PresenceUpdate { username: "grace".into(), online: false }
        );
    }

    #[test]
    fn push_reports_closed_connections() {
        let registry = PresenceRegistry::new();
        let (live, mut live_rx) = ConnectionHandle::new();
        let (dead, dead_rx) = ConnectionHandle::new();
        drop(dead_rx);

        registry.register_connection("erin", live);
        registry.register_connection("erin", dead);

        let event = GatewayEvent::PresenceUpdate { username: "x".into(), online: true };
        let (delivered, failures) = registry.push_to_user("erin", &event);

        assert_eq!(delivered, 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(live_rx.try_recv().unwrap(), event);
    }

    #[tokio::test]
    async fn concurrent_registrations_are_not_lost() {
        let registry = PresenceRegistry::new();
        let mut tasks = Vec::new();
        let mut receivers = Vec::new();

        for _ in 0..32 {
            let (handle, rx) = ConnectionHandle::new();
            receivers.push(rx);
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.register_connection("frank", handle);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.connections_for("frank").len(), 32);
    }
}
