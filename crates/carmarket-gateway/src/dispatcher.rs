use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use carmarket_types::events::GatewayEvent;

type UserSender = mpsc::UnboundedSender<GatewayEvent>;

/// Manages all connected sockets and fans events out to them.
///
/// Delivery is best effort: events for users without an open socket are
/// dropped, and clients fall back to polling.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for events every socket receives (presence)
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> (conn_id -> sender).
    /// A user may have several tabs open.
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, UserSender>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a socket for `user_id`. Announces the user online when this is
    /// their first socket. Returns (conn_id, receiver).
    pub async fn connect(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let first = {
            let mut channels = self.inner.user_channels.write().await;
            let sockets = channels.entry(user_id).or_default();
            sockets.insert(conn_id, tx);
            sockets.len() == 1
        };

        if first {
            self.broadcast(GatewayEvent::UserStatusUpdate {
                user_id,
                online: true,
            });
        }

        (conn_id, rx)
    }

    /// Drop one socket. Announces the user offline when it was their last.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: Uuid) {
        let last = {
            let mut channels = self.inner.user_channels.write().await;
            match channels.get_mut(&user_id) {
                Some(sockets) => {
                    sockets.remove(&conn_id);
                    if sockets.is_empty() {
                        channels.remove(&user_id);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if last {
            self.broadcast(GatewayEvent::UserStatusUpdate {
                user_id,
                online: false,
            });
        }
    }

    /// Send a targeted event to every socket of a user. Returns how many
    /// sockets accepted it.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let channels = self.inner.user_channels.read().await;
        channels
            .get(&user_id)
            .map(|sockets| {
                sockets
                    .values()
                    .filter(|tx| tx.send(event.clone()).is_ok())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.user_channels.read().await.keys().copied().collect()
    }
}
