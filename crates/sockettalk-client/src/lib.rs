//! # sockettalk-client
//!
//! Client library for socket-talk brokers.
//!
//! A [`Client`] keeps one WebSocket open to a broker. Payloads travel through
//! the broker's HTTP store and only their reference id goes over the socket.
//!
//! - [`Client::subscribe`] registers a handler for a topic.
//! - [`Client::send`] publishes without waiting.
//! - [`Client::request`] publishes and waits for one [`Message::answer`].

pub mod client;
mod correlator;
pub mod error;
pub mod message;
mod registry;
pub mod rest;

pub use client::{Client, ClientOptions, ConnectionState, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ClientError, Result};
pub use message::Message;
pub use rest::PayloadClient;
pub use sockettalk_common::auth::{Signer, signer_with_key};
