//! Topic codec.
//!
//! Topic names never travel on the wire. Every title is replaced by the
//! lower-case hex SHA3-256 digest of its UTF-8 bytes, so two brokers or
//! clients agree on a topic without ever exchanging its name.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Topic sent once by a client right after its handshake.
pub const INIT_TOPIC: &str = "INIT";

/// Control-plane topic the broker uses to reject a broadcast.
pub const AUTH_FAILED_TOPIC: &str = "SOCKET_TALK_AUTH_FAILED";

static INIT_HASH: LazyLock<TopicHash> = LazyLock::new(|| TopicHash::of(INIT_TOPIC));
static AUTH_FAILED_HASH: LazyLock<TopicHash> = LazyLock::new(|| TopicHash::of(AUTH_FAILED_TOPIC));

/// Hex SHA3-256 digest of an arbitrary string.
pub fn hash(input: &str) -> String {
    hex::encode(Sha3_256::digest(input.as_bytes()))
}

/// Wire identifier of a topic: a 64-char hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicHash(String);

impl TopicHash {
    /// Hash a human-readable topic name.
    pub fn of(topic: &str) -> Self {
        Self(hash(topic))
    }

    /// Topic a reply to `(title, correlation_id)` is published under.
    ///
    /// Both the requester (registering its one-shot subscription) and the
    /// responder (answering) derive the same hash from the request envelope.
    pub fn reply_to(title: &TopicHash, correlation_id: &str) -> Self {
        Self(hash(&format!("{}{}", title.0, correlation_id)))
    }

    /// Hash of [`INIT_TOPIC`].
    pub fn init() -> &'static TopicHash {
        &INIT_HASH
    }

    /// Hash of [`AUTH_FAILED_TOPIC`].
    pub fn auth_failed() -> &'static TopicHash {
        &AUTH_FAILED_HASH
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
