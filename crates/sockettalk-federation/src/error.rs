//! Federation-specific error types.

use sockettalk_common::ConfigError;
use thiserror::Error;

/// Errors that can occur in federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    #[error("Can't connect to upstream broker at '{url}': {source}")]
    Dial {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("HTTP error communicating with upstream '{0}': {1}")]
    RemoteHttp(String, String),

    #[error("Failed to build upstream HTTP client: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<reqwest::Error> for FederationError {
    fn from(e: reqwest::Error) -> Self {
        let server = e
            .url()
            .map(|u| u.host_str().unwrap_or("?").to_owned())
            .unwrap_or_default();
        FederationError::RemoteHttp(server, e.to_string())
    }
}
