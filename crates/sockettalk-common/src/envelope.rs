//! The wire envelope carried on the persistent connection.
//!
//! An envelope references its payload (through the payload store) but never
//! contains it, so frames stay small and uniform.

use serde::{Deserialize, Serialize};

use crate::topic::TopicHash;

/// Filler frame a broker may broadcast to keep idle proxies from timing out.
///
/// Not an envelope; receivers drop it.
pub const KEEP_ALIVE: &str = "🤖️";

/// A single frame on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Hashed topic.
    pub title: TopicHash,
    /// Correlation id tying a request to its reply.
    #[serde(rename = "ID")]
    pub id: String,
    /// Payload store reference; empty for control frames.
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "expectsAnswer")]
    pub expects_answer: bool,
}

impl Envelope {
    /// A payload-less control frame.
    pub fn control(title: TopicHash) -> Self {
        Self {
            title,
            id: String::new(),
            message_id: String::new(),
            expects_answer: false,
        }
    }

    /// The rejection frame a broker sends back to a session that failed auth.
    pub fn auth_failed() -> Self {
        Self::control(TopicHash::auth_failed().clone())
    }

    pub fn has_payload(&self) -> bool {
        !self.message_id.is_empty()
    }

    pub fn to_json(&self) -> String {
        // Four plain string/bool fields cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// True when `frame` is the broker keep-alive filler.
pub fn is_keep_alive(frame: &[u8]) -> bool {
    frame == KEEP_ALIVE.as_bytes()
}
