//! Configuration errors shared by every socket-talk crate.

/// Raised at construction time; never a panic, never a silent default.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Server URL must start with http:// or https://, got '{0}'")]
    InvalidScheme(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Shared auth key is empty")]
    EmptyAuthKey,

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
