//! Request/reply correlation.
//!
//! A request parks a [`ReplySlot`] in the registry under its reply topic and
//! waits on the matching receiver. Whichever path claims the slot first (the
//! reply, the deadline, an auth rejection or a disconnect) decides the
//! outcome; every later attempt is a no-op.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sockettalk_common::TopicHash;
use tokio::sync::oneshot;

use crate::error::{ClientError, Result};
use crate::registry::Registry;

pub(crate) type Outcome = Result<Vec<u8>>;

pub(crate) struct ReplySlot {
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl ReplySlot {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Arc::new(Self { tx: Mutex::new(Some(tx)) }), rx)
    }

    /// Claim the slot and deliver `outcome`. False if it was already claimed.
    pub fn complete(&self, outcome: Outcome) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            return false;
        };
        // The waiter may have given up already; nothing to deliver to then.
        let _ = tx.send(outcome);
        true
    }
}

/// An in-flight request. Dropping it removes its registry entry.
pub(crate) struct PendingReply<'a> {
    registry: &'a Registry,
    key: TopicHash,
    slot: Arc<ReplySlot>,
    rx: oneshot::Receiver<Outcome>,
}

impl<'a> PendingReply<'a> {
    pub fn register(registry: &'a Registry, key: TopicHash, topic: &str) -> Self {
        let (slot, rx) = ReplySlot::new();
        registry.register_reply(key.clone(), topic, Arc::clone(&slot));
        Self { registry, key, slot, rx }
    }

    /// Wait for the outcome, failing with [`ClientError::Timeout`] after `deadline`.
    pub async fn wait(mut self, deadline: Duration) -> Outcome {
        match tokio::time::timeout(deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                self.slot.complete(Err(ClientError::Timeout));
                // Exactly one outcome is in flight now, ours or the winner's.
                (&mut self.rx).await.unwrap_or(Err(ClientError::Timeout))
            }
        }
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        self.registry.remove_reply(&self.key, &self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_completes_once() {
        let (slot, mut rx) = ReplySlot::new();
        assert!(slot.complete(Ok(b"first".to_vec())));
        assert!(!slot.complete(Ok(b"second".to_vec())));
        assert_eq!(rx.try_recv().unwrap().unwrap(), b"first");
    }

    #[tokio::test(start_paused = true)]
    async fn reply_before_deadline_wins() {
        let registry = Registry::default();
        let key = TopicHash::of("reply");
        let pending = PendingReply::register(&registry, key.clone(), "T");

        let route = registry.lookup(&key).unwrap();
        let crate::registry::Target::Reply(slot) = route.target else {
            panic!("expected a reply slot");
        };
        assert!(slot.complete(Ok(b"{}".to_vec())));

        assert_eq!(pending.wait(Duration::from_secs(30)).await.unwrap(), b"{}");
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_and_unregisters() {
        let registry = Registry::default();
        let key = TopicHash::of("reply");
        let pending = PendingReply::register(&registry, key.clone(), "T");
        assert_eq!(registry.pending_count(), 1);

        let result = pending.wait(Duration::from_secs(30)).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_is_ignored() {
        let registry = Registry::default();
        let key = TopicHash::of("reply");
        let pending = PendingReply::register(&registry, key.clone(), "T");
        let Some(crate::registry::Route {
            target: crate::registry::Target::Reply(slot),
            ..
        }) = registry.lookup(&key)
        else {
            panic!("expected a reply slot");
        };

        assert!(matches!(
            pending.wait(Duration::from_millis(10)).await,
            Err(ClientError::Timeout)
        ));
        assert!(!slot.complete(Ok(b"late".to_vec())));
    }
}
