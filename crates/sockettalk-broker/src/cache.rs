//! Payload store.
//!
//! Message bodies never ride the broadcast channel. Publishers `set` them
//! here and put the returned reference in the envelope; subscribers `get`
//! them back. Every entry expires a fixed TTL after insertion regardless of
//! reads.
//!
//! Expiry is driven by a single sweeper task per store, fed by a min-heap
//! of deadlines, rather than one timer per entry. Reads also check the
//! deadline themselves, so an entry is never served late even if the sweeper
//! lags.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::body::Bytes;
use sockettalk_common::topic::hash;
use tokio::sync::{Notify, RwLock};
use tokio::time::{Instant, sleep_until};
use tracing::trace;

use crate::error::BrokerError;

/// Lifetime of an entry, measured from `set`.
pub const DEFAULT_TTL: Duration = Duration::from_secs(20);

struct Entry {
    bytes: Bytes,
    expires_at: Instant,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    deadlines: BinaryHeap<Reverse<(Instant, String)>>,
}

pub struct PayloadStore {
    ttl: Duration,
    entries: RwLock<Entries>,
    wake: Arc<Notify>,
}

impl PayloadStore {
    /// Create a store and spawn its sweeper. Must be called inside a Tokio runtime.
    ///
    /// The sweeper only holds a weak reference and exits once the store is dropped.
    pub fn start(ttl: Duration) -> Arc<Self> {
        let store = Arc::new(Self {
            ttl,
            entries: RwLock::new(Entries::default()),
            wake: Arc::new(Notify::new()),
        });
        tokio::spawn(sweep_loop(Arc::downgrade(&store), store.wake.clone()));
        store
    }

    /// Store `bytes` and return a fresh reference. Never fails.
    pub async fn set(&self, bytes: Bytes) -> String {
        let id = hash(&uuid::Uuid::new_v4().to_string());
        let expires_at = Instant::now() + self.ttl;

        let mut entries = self.entries.write().await;
        let earliest = entries
            .deadlines
            .peek()
            .is_none_or(|Reverse((next, _))| expires_at < *next);
        entries.map.insert(id.clone(), Entry { bytes, expires_at });
        entries.deadlines.push(Reverse((expires_at, id.clone())));
        drop(entries);

        if earliest {
            self.wake.notify_one();
        }
        id
    }

    /// Fetch the bytes stored under `id`, or [`BrokerError::CacheMiss`].
    pub async fn get(&self, id: &str) -> Result<Bytes, BrokerError> {
        let entries = self.entries.read().await;
        match entries.map.get(id) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(entry.bytes.clone()),
            _ => Err(BrokerError::CacheMiss),
        }
    }

    /// Number of entries not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry and return the next deadline, if any.
    async fn sweep(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        while let Some(Reverse((deadline, _))) = entries.deadlines.peek() {
            if *deadline > now {
                return Some(*deadline);
            }
            if let Some(Reverse((_, id))) = entries.deadlines.pop() {
                entries.map.remove(&id);
                trace!(id = %id, "Payload expired");
            }
        }
        None
    }
}

impl Drop for PayloadStore {
    fn drop(&mut self) {
        // Let an idle sweeper notice the store is gone.
        self.wake.notify_one();
    }
}

async fn sweep_loop(store: Weak<PayloadStore>, wake: Arc<Notify>) {
    loop {
        let Some(live) = store.upgrade() else { return };
        let next = live.sweep().await;
        drop(live);

        match next {
            Some(deadline) => {
                tokio::select! {
                    _ = sleep_until(deadline) => {}
                    _ = wake.notified() => {}
                }
            }
            None => wake.notified().await,
        }
    }
}
