//! Broker error types.
//!
//! Errors raised by the payload endpoints render as a plain-text body with
//! an HTTP status, the way the side channel has always answered.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sockettalk_common::ConfigError;
use sockettalk_federation::FederationError;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Unknown or expired payload reference.
    #[error("ID is wrong")]
    CacheMiss,

    #[error("{0}")]
    InvalidRequest(String),

    /// The upstream payload store could not be reached.
    #[error("CACHE PROXY ERROR: {0}")]
    Proxy(FederationError),

    #[error(transparent)]
    Federation(#[from] FederationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BrokerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CacheMiss | Self::InvalidRequest(_) | Self::Proxy(_) => StatusCode::BAD_REQUEST,
            Self::Federation(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Broker error: {self}");
        }
        (status, self.to_string()).into_response()
    }
}
