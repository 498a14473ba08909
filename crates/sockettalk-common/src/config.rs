//! Broker process configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults
//!
//! Library code never reads this directly; the server binary turns it into
//! option structs, so several brokers can coexist in one process.

use serde::Deserialize;

use crate::error::ConfigError;

/// Load configuration from defaults, `config.toml`, `.env` and the environment.
pub fn load() -> Result<AppConfig, ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("broker.keep_alive", false)?
        .set_default("broker.keep_alive_interval_secs", 30)?
        .set_default("broker.cache_ttl_secs", 20)?
        .set_default("broker.reconnect_interval_secs", 4)?
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (SOCKETTALK__SERVER__PORT, SOCKETTALK__BROKER__UPSTREAM, etc.)
        .add_source(
            config::Environment::with_prefix("SOCKETTALK")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(cfg.try_deserialize()?)
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    /// Broadcast the keep-alive filler frame periodically.
    pub keep_alive: bool,
    pub keep_alive_interval_secs: u64,
    /// Lifetime of a payload store entry, measured from insertion.
    pub cache_ttl_secs: u64,
    /// http(s) base address of the upstream broker to federate with.
    pub upstream: Option<String>,
    pub reconnect_interval_secs: u64,
    /// Shared secret; when set every broadcast must carry its tag.
    pub auth_key: Option<String>,
}
