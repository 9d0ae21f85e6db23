use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tilly_core::notifications::{Notification, NotificationPush};
use tokio::sync::broadcast;

/// A notification on its way to one user's live connections.
#[derive(Debug, Clone)]
pub struct PushedNotification {
    pub recipient_id: i64,
    pub notification: Notification,
}

/// Real-time fan-out to SSE connections.
///
/// All connections share one broadcast channel and filter by recipient. A
/// subscriber that falls behind skips the messages it lagged on.
#[derive(Clone)]
pub struct NotificationGateway {
    tx: broadcast::Sender<PushedNotification>,
    connections: Arc<Mutex<HashMap<i64, usize>>>,
}

/// A live connection. Dropping it unregisters the connection.
pub struct Subscription {
    pub user_id: i64,
    pub rx: broadcast::Receiver<PushedNotification>,
    guard: ConnectionGuard,
}

struct ConnectionGuard {
    user_id: i64,
    connections: Arc<Mutex<HashMap<i64, usize>>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut connections = self.connections.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(count) = connections.get_mut(&self.user_id) {
            *count -= 1;
            if *count == 0 {
                connections.remove(&self.user_id);
            }
        }
        tracing::debug!("Notification stream closed for user {}", self.user_id);
    }
}

impl Subscription {
    /// Splits the subscription so the receiver can feed a stream while the
    /// guard travels alongside it.
    pub fn into_parts(self) -> (broadcast::Receiver<PushedNotification>, impl Send + 'static) {
        (self.rx, self.guard)
    }
}

impl NotificationGateway {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self, user_id: i64) -> Subscription {
        *self
            .connections
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(user_id)
            .or_default() += 1;
        tracing::debug!("Notification stream opened for user {}", user_id);

        Subscription {
            user_id,
            rx: self.tx.subscribe(),
            guard: ConnectionGuard {
                user_id,
                connections: self.connections.clone(),
            },
        }
    }

    pub fn connections(&self, user_id: i64) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }
}

impl NotificationPush for NotificationGateway {
    fn push(&self, recipient_id: i64, notification: &Notification) -> usize {
        let reached = self.connections(recipient_id);
        if reached == 0 {
            return 0;
        }
        let message = PushedNotification {
            recipient_id,
            notification: notification.clone(),
        };
        match self.tx.send(message) {
            Ok(_) => reached,
            Err(_) => 0,
        }
    }
}
