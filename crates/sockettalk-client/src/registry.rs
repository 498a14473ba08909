//! Topic-hash subscription registry.
//!
//! Holds two kinds of entries under one map: durable handlers registered by
//! the application, and one-shot reply slots registered by in-flight
//! requests. Lookups clone the entry out under the read lock, so dispatch
//! never holds the lock across an await.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use sockettalk_common::TopicHash;

use crate::correlator::ReplySlot;
use crate::error::ClientError;
use crate::message::Message;

pub(crate) type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Target {
    Handler(Handler),
    Reply(Arc<ReplySlot>),
}

/// What a topic hash resolves to, with the human-readable name for logs.
#[derive(Clone)]
pub(crate) struct Route {
    pub topic: String,
    pub target: Target,
}

#[derive(Default)]
pub(crate) struct Registry {
    routes: RwLock<HashMap<TopicHash, Route>>,
}

impl Registry {
    /// Register (or replace) the handler for `topic`.
    pub fn subscribe(&self, topic: &str, handler: Handler) {
        self.routes.write().insert(
            TopicHash::of(topic),
            Route {
                topic: topic.to_owned(),
                target: Target::Handler(handler),
            },
        );
    }

    /// Remove the handler for `topic`. Pending reply slots are left alone.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        let key = TopicHash::of(topic);
        let mut routes = self.routes.write();
        match routes.get(&key) {
            Some(Route { target: Target::Handler(_), .. }) => {
                routes.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn register_reply(&self, key: TopicHash, topic: &str, slot: Arc<ReplySlot>) {
        self.routes.write().insert(
            key,
            Route {
                topic: topic.to_owned(),
                target: Target::Reply(slot),
            },
        );
    }

    /// Remove the reply entry under `key` if it still belongs to `slot`.
    pub fn remove_reply(&self, key: &TopicHash, slot: &Arc<ReplySlot>) {
        let mut routes = self.routes.write();
        if let Some(Route { target: Target::Reply(current), .. }) = routes.get(key) {
            if Arc::ptr_eq(current, slot) {
                routes.remove(key);
            }
        }
    }

    pub fn lookup(&self, key: &TopicHash) -> Option<Route> {
        self.routes.read().get(key).cloned()
    }

    /// Complete every pending reply slot with an error built by `err`.
    pub fn fail_pending(&self, err: impl Fn() -> ClientError) -> usize {
        let slots: Vec<Arc<ReplySlot>> = self
            .routes
            .read()
            .values()
            .filter_map(|route| match &route.target {
                Target::Reply(slot) => Some(Arc::clone(slot)),
                Target::Handler(_) => None,
            })
            .collect();
        slots.iter().filter(|slot| slot.complete(Err(err()))).count()
    }

    pub fn pending_count(&self) -> usize {
        self.routes
            .read()
            .values()
            .filter(|route| matches!(route.target, Target::Reply(_)))
            .count()
    }
}
