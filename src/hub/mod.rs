//! In-process notification hub.
//!
//! The hub is the only notification sink in the system: the admission
//! controller, the bus consumer, the enrollment engine and the seat manager
//! all push through it, never directly to a socket.
//!
//! Per user there is at most one live connection. Registering a new one
//! replaces (and thereby closes) the prior. Combined with the auth
//! collaborator's single-session token this prevents dual-session abuse.
//! Each connection has a bounded outbound buffer; a slow client whose
//! buffer fills is disconnected rather than allowed to stall broadcasts,
//! and must reconnect and re-fetch state.

mod message;

pub use message::WsEvent;

use crate::types::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;

/// Outbound buffer capacity per connection, in frames.
pub const OUTBOUND_BUFFER: usize = 256;

struct ClientHandle {
    connection_id: u64,
    sender: mpsc::Sender<String>,
}

/// A registered connection: the id disambiguates stale unregisters after a
/// replacement, the receiver feeds the socket's write pump. Dropping the
/// receiver (or the hub dropping the sender) closes the connection.
pub struct Registration {
    pub connection_id: u64,
    pub receiver: mpsc::Receiver<String>,
}

/// Hub over all live WebSocket connections.
pub struct NotificationHub {
    clients: RwLock<HashMap<UserId, ClientHandle>>,
    next_connection_id: AtomicU64,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Register a connection for `user_id`, closing any prior connection of
    /// the same user (its sender is dropped, ending its write pump).
    pub fn register(&self, user_id: UserId) -> Registration {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER);

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        if clients
            .insert(
                user_id,
                ClientHandle {
                    connection_id,
                    sender,
                },
            )
            .is_some()
        {
            tracing::info!(user_id = %user_id, "replaced existing connection (single-session)");
        }
        tracing::debug!(user_id = %user_id, connection_id, "client registered");

        Registration {
            connection_id,
            receiver,
        }
    }

    /// Unregister a connection. A no-op when a newer connection has already
    /// replaced this one.
    pub fn unregister(&self, user_id: UserId, connection_id: u64) {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        if clients
            .get(&user_id)
            .is_some_and(|c| c.connection_id == connection_id)
        {
            clients.remove(&user_id);
            tracing::debug!(user_id = %user_id, connection_id, "client unregistered");
        }
    }

    /// Send one event to one user. Never blocks: a full buffer disconnects
    /// the client instead.
    pub fn unicast(&self, user_id: UserId, event: &WsEvent) {
        let Some(frame) = Self::encode(event) else {
            return;
        };
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        match clients.get(&user_id) {
            Some(client) => {
                if client.sender.try_send(frame).is_err() {
                    tracing::warn!(user_id = %user_id, "outbound buffer full, disconnecting client");
                    clients.remove(&user_id);
                }
            }
            None => {
                tracing::debug!(user_id = %user_id, "no live connection for unicast");
            }
        }
    }

    /// Send one event to every connected user, disconnecting any whose
    /// buffer is full.
    pub fn broadcast(&self, event: &WsEvent) {
        let Some(frame) = Self::encode(event) else {
            return;
        };
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let before = clients.len();
        clients.retain(|user_id, client| {
            let ok = client.sender.try_send(frame.clone()).is_ok();
            if !ok {
                tracing::warn!(user_id = %user_id, "outbound buffer full during broadcast, disconnecting");
            }
            ok
        });
        tracing::debug!(clients = before, dropped = before - clients.len(), "broadcast delivered");
    }

    /// Number of live connections.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn encode(event: &WsEvent) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize notification frame");
                None
            }
        }
    }
}
