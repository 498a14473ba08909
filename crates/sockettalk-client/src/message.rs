//! Messages handed to subscription handlers.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sockettalk_common::TopicHash;

use crate::client::Client;
use crate::error::{ClientError, Result};

/// A delivered message.
pub struct Message {
    /// Human-readable topic the handler was registered for.
    pub topic: String,
    /// Raw payload bytes, usually JSON.
    pub bytes: Vec<u8>,
    /// True when the sender is waiting for [`Message::answer`].
    pub expects_answer: bool,
    reply: Option<ReplyRoute>,
}

struct ReplyRoute {
    client: Client,
    title: TopicHash,
    id: String,
}

impl Message {
    pub(crate) fn new(topic: String, bytes: Vec<u8>) -> Self {
        Self {
            topic,
            bytes,
            expects_answer: false,
            reply: None,
        }
    }

    pub(crate) fn expecting_answer(mut self, client: Client, title: TopicHash, id: String) -> Self {
        self.expects_answer = true;
        self.reply = Some(ReplyRoute { client, title, id });
        self
    }

    /// Decode the payload as JSON.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    /// Reply to the sender of a request.
    ///
    /// The answer is published under the reply topic derived from the
    /// request's topic and correlation id.
    pub async fn answer<T: Serialize + ?Sized>(&self, data: &T) -> Result<()> {
        let reply = self.reply.as_ref().ok_or(ClientError::NoAnswerExpected)?;
        let title = TopicHash::reply_to(&reply.title, &reply.id);
        reply
            .client
            .publish(title, &format!("{} (answer)", self.topic), Some(reply.id.clone()), data)
            .await
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.topic)
            .field("bytes", &self.bytes.len())
            .field("expects_answer", &self.expects_answer)
            .finish()
    }
}
