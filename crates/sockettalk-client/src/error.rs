//! Error types for the socket-talk client.

use sockettalk_common::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The payload store answered with a non-2xx status (e.g. an expired reference).
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// An error from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An error from the WebSocket layer.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Can't send to a closed connection")]
    NotConnected,

    /// The server closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// The connection went away while a request was waiting for its reply.
    #[error("Disconnected before a reply arrived")]
    Disconnected,

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication failed")]
    AuthFailed,

    #[error("The sender does not expect an answer")]
    NoAnswerExpected,
}

pub type Result<T> = std::result::Result<T, ClientError>;
