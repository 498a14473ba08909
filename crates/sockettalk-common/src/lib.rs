//! # sockettalk-common
//!
//! Wire types, topic hashing, auth tags, and configuration shared by the
//! broker, the federation link, and the client library.

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod topic;

pub use endpoint::BaseUrl;
pub use envelope::Envelope;
pub use error::ConfigError;
pub use topic::TopicHash;
