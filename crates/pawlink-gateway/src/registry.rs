use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pawlink_types::events::ServerEvent;
use pawlink_types::models::{Actor, ActorKind};

/// Handle returned to the socket loop that owns a registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub conn_id: Uuid,
    /// Fires when a newer connection for the same actor replaces this one.
    pub cancel: CancellationToken,
}

struct LiveConnection {
    conn_id: Uuid,
    kind: ActorKind,
    tx: mpsc::UnboundedSender<ServerEvent>,
    cancel: CancellationToken,
    /// Conversation the client currently has on screen
    viewing: Option<Uuid>,
}

/// Tracks the one live connection per actor and routes events to it.
/// The online set is exactly the key set of the connection map.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<Uuid, LiveConnection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Install `tx` as the actor's live connection, replacing (and cancelling)
    /// any previous one.
    pub async fn register(&self, actor: Actor, tx: mpsc::UnboundedSender<ServerEvent>) -> Registration {
        let registration = Registration {
            conn_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        };

        let replaced = self.inner.write().await.insert(
            actor.id,
            LiveConnection {
                conn_id: registration.conn_id,
                kind: actor.kind,
                tx,
                cancel: registration.cancel.clone(),
                viewing: None,
            },
        );

        match replaced {
            Some(old) => {
                info!(
                    "{} {} reconnected, replacing connection {}",
                    actor.kind, actor.id, old.conn_id
                );
                old.cancel.cancel();
            }
            None => {
                self.broadcast_except(actor.id, ServerEvent::UserConnected { user_id: actor.id })
                    .await;
            }
        }

        registration
    }

    /// Remove the actor's entry if it still belongs to `conn_id`. A superseded
    /// connection's late disconnect never evicts its replacement.
    pub async fn unregister(&self, actor_id: Uuid, conn_id: Uuid) -> bool {
        let removed = {
            let mut connections = self.inner.write().await;
            match connections.get(&actor_id) {
                Some(live) if live.conn_id == conn_id => connections.remove(&actor_id),
                _ => None,
            }
        };

        let Some(live) = removed else {
            debug!("Stale unregister for {} ({}), ignoring", actor_id, conn_id);
            return false;
        };

        info!("{} {} went offline", live.kind, actor_id);
        self.broadcast_except(actor_id, ServerEvent::UserDisconnected { user_id: actor_id })
            .await;
        true
    }

    /// Deliver an event to the actor's live connection. Returns false when the
    /// actor is offline or the connection is already going away; the entry is
    /// left for the connection's own loop to remove.
    pub async fn send(&self, actor_id: Uuid, event: ServerEvent) -> bool {
        let connections = self.inner.read().await;
        let Some(live) = connections.get(&actor_id) else {
            return false;
        };

        if live.tx.send(event).is_err() {
            warn!("Failed to push event to {} ({}), receiver gone", actor_id, live.conn_id);
            return false;
        }
        true
    }

    /// Like `send`, but only if the actor currently has `conversation_id` open.
    pub async fn send_if_viewing(&self, actor_id: Uuid, conversation_id: Uuid, event: ServerEvent) -> bool {
        let connections = self.inner.read().await;
        let Some(live) = connections.get(&actor_id) else {
            return false;
        };
        if live.viewing != Some(conversation_id) {
            return false;
        }

        if live.tx.send(event).is_err() {
            warn!("Failed to push event to {} ({}), receiver gone", actor_id, live.conn_id);
            return false;
        }
        true
    }

    pub async fn set_viewing(&self, actor_id: Uuid, conn_id: Uuid, conversation_id: Option<Uuid>) {
        let mut connections = self.inner.write().await;
        if let Some(live) = connections.get_mut(&actor_id) {
            if live.conn_id == conn_id {
                live.viewing = conversation_id;
            }
        }
    }

    pub async fn is_online(&self, actor_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&actor_id)
    }

    pub async fn online_actors(&self) -> Vec<Uuid> {
        self.inner.read().await.keys().copied().collect()
    }

    async fn broadcast_except(&self, actor_id: Uuid, event: ServerEvent) {
        let connections = self.inner.read().await;
        for (id, live) in connections.iter() {
            if *id != actor_id && live.tx.send(event.clone()).is_err() {
                warn!("Failed to push presence to {} ({}), receiver gone", id, live.conn_id);
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::drain;

    fn owner() -> Actor {
        Actor::new(Uuid::new_v4(), ActorKind::Owner)
    }

    #[tokio::test]
    async fn test_reconnect_replaces_connection() {
        let registry = Registry::new();
        let me = owner();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let first = registry.register(me, tx1).await;
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let second = registry.register(me, tx2).await;

        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());

        assert!(registry.send(me.id, ServerEvent::UnreadCount { count: 1 }).await);
        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2), vec![ServerEvent::UnreadCount { count: 1 }]);

        // The old loop exiting must not take the new connection down with it
        assert!(!registry.unregister(me.id, first.conn_id).await);
        assert!(registry.is_online(me.id).await);

        assert!(registry.unregister(me.id, second.conn_id).await);
        assert!(!registry.is_online(me.id).await);
    }

    #[tokio::test]
    async fn test_presence_broadcast_to_others_only() {
        let registry = Registry::new();
        let (alice, bob) = (owner(), owner());

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        registry.register(alice, tx_a).await;
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let bob_reg = registry.register(bob, tx_b).await;

        assert_eq!(drain(&mut rx_a), vec![ServerEvent::UserConnected { user_id: bob.id }]);
        assert!(drain(&mut rx_b).is_empty());

        // Reconnecting while online is not a new arrival
        let (tx_b2, _rx_b2) = mpsc::unbounded_channel();
        let bob_reg2 = registry.register(bob, tx_b2).await;
        assert!(drain(&mut rx_a).is_empty());

        registry.unregister(bob.id, bob_reg.conn_id).await;
        assert!(drain(&mut rx_a).is_empty());
        registry.unregister(bob.id, bob_reg2.conn_id).await;
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::UserDisconnected { user_id: bob.id }]);

        let mut online = registry.online_actors().await;
        online.sort();
        assert_eq!(online, vec![alice.id]);
    }

    #[tokio::test]
    async fn test_send_to_offline_or_closed_returns_false() {
        let registry = Registry::new();
        let me = owner();
        assert!(!registry.send(me.id, ServerEvent::UnreadCount { count: 0 }).await);

        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(me, tx).await;
        drop(rx);

        assert!(!registry.send(me.id, ServerEvent::UnreadCount { count: 0 }).await);
        // Failed writes leave removal to the connection loop
        assert!(registry.is_online(me.id).await);
    }

    #[tokio::test]
    async fn test_send_if_viewing() {
        let registry = Registry::new();
        let me = owner();
        let conversation = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let reg = registry.register(me, tx).await;
        let event = ServerEvent::UnreadCount { count: 2 };

        assert!(!registry.send_if_viewing(me.id, conversation, event.clone()).await);
        registry.set_viewing(me.id, Uuid::new_v4(), Some(conversation)).await;
        assert!(!registry.send_if_viewing(me.id, conversation, event.clone()).await);

        registry.set_viewing(me.id, reg.conn_id, Some(conversation)).await;
        assert!(registry.send_if_viewing(me.id, conversation, event.clone()).await);
        assert_eq!(drain(&mut rx), vec![event.clone()]);

        registry.set_viewing(me.id, reg.conn_id, None).await;
        assert!(!registry.send_if_viewing(me.id, conversation, event.clone()).await);

        // A viewer whose receiver is gone counts as not delivered and stays registered
        registry.set_viewing(me.id, reg.conn_id, Some(conversation)).await;
        drop(rx);
        assert!(!registry.send_if_viewing(me.id, conversation, event).await);
        assert!(registry.is_online(me.id).await);
    }

    #[tokio::test]
    async fn test_presence_skips_closed_receivers() {
        let registry = Registry::new();
        let (gone, alice, bob) = (owner(), owner(), owner());

        let (tx_gone, rx_gone) = mpsc::unbounded_channel();
        registry.register(gone, tx_gone).await;
        drop(rx_gone);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        registry.register(alice, tx_a).await;

        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        registry.register(bob, tx_b).await;
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::UserConnected { user_id: bob.id }]);
        assert!(registry.is_online(gone.id).await);
    }
}
