//! Broadcast core: tracks connected sessions and fans frames out to them.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;
use uuid::Uuid;

/// Frames queued per session before new ones are dropped.
const SESSION_QUEUE: usize = 256;

/// Tracks all connected sessions.
///
/// Each session owns a bounded queue drained by its writer task. Fan-out
/// pushes into those queues in call order, so a single session sees frames in
/// the order the broker accepted them. A session whose queue is full loses the
/// frame instead of stalling everyone else.
pub struct Hub {
    sessions: RwLock<HashMap<Uuid, mpsc::Sender<String>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session and return its id and outbound queue.
    pub async fn register(&self) -> (Uuid, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE);
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, tx);
        (id, rx)
    }

    /// Remove a session.
    pub async fn remove(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    /// Deliver `frame` to every session except `except`. Returns how many queues took it.
    pub async fn broadcast(&self, frame: &str, except: Option<Uuid>) -> usize {
        let sessions = self.sessions.read().await;
        let mut delivered = 0;
        for (id, tx) in sessions.iter() {
            if Some(*id) == except {
                continue;
            }
            if push(*id, tx, frame.to_owned()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver `frame` to a single session.
    pub async fn send_to(&self, id: Uuid, frame: String) -> bool {
        match self.sessions.read().await.get(&id) {
            Some(tx) => push(id, tx, frame),
            None => false,
        }
    }

    /// Get total active sessions count.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

fn push(id: Uuid, tx: &mpsc::Sender<String>, frame: String) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(session = %id, "Session queue full, frame dropped");
            false
        }
        // Writer already gone; the session is about to be removed.
        Err(TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let hub = Hub::new();
        let (a, mut rx_a) = hub.register().await;
        let (_b, mut rx_b) = hub.register().await;
        let (_c, mut rx_c) = hub.register().await;

        assert_eq!(hub.broadcast("hello", Some(a)).await, 2);
        assert_eq!(rx_b.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx_c.recv().await.as_deref(), Some("hello"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn per_session_order_is_preserved() {
        let hub = Hub::new();
        let (_a, mut rx_a) = hub.register().await;
        for i in 0..10 {
            hub.broadcast(&i.to_string(), None).await;
        }
        for i in 0..10 {
            assert_eq!(rx_a.recv().await, Some(i.to_string()));
        }
    }

    #[tokio::test]
    async fn send_to_reaches_only_target() {
        let hub = Hub::new();
        let (a, mut rx_a) = hub.register().await;
        let (_b, mut rx_b) = hub.register().await;

        assert!(hub.send_to(a, "private".into()).await);
        assert_eq!(rx_a.recv().await.as_deref(), Some("private"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn removed_sessions_receive_nothing() {
        let hub = Hub::new();
        let (a, _rx_a) = hub.register().await;
        assert_eq!(hub.active_count().await, 1);

        hub.remove(a).await;
        assert_eq!(hub.active_count().await, 0);
        assert_eq!(hub.broadcast("late", None).await, 0);
        assert!(!hub.send_to(a, "late".into()).await);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = Hub::new();
        let (_slow, _rx_slow) = hub.register().await;
        for _ in 0..SESSION_QUEUE {
            assert_eq!(hub.broadcast("x", None).await, 1);
        }
        assert_eq!(hub.broadcast("overflow", None).await, 0);
    }
}
