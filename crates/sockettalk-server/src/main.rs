//! # socket-talk broker
//!
//! Serves the broadcast WebSocket and the payload store on one port:
//! - `GET  /socketTalk/ws`  (broadcast channel)
//! - `POST /socketTalk/set` (store a payload)
//! - `POST /socketTalk/get` (fetch a payload)
//!
//! With `--upstream` the broker joins another broker's network and relays
//! frames and payload calls to it.

use std::net::SocketAddr;

use clap::Parser;
use sockettalk_broker::{Broker, BrokerOptions};
use sockettalk_common::auth::gate_with_key;
use tower_http::trace::TraceLayer;

/// Command line overrides. Anything not given falls back to `config.toml`
/// and `SOCKETTALK__*` variables.
#[derive(Debug, Parser)]
#[command(name = "sockettalk", version, about)]
struct Args {
    #[arg(long, env = "SOCKETTALK_HOST")]
    host: Option<String>,

    #[arg(long, env = "SOCKETTALK_PORT")]
    port: Option<u16>,

    /// http(s) address of the broker to federate with.
    #[arg(long, env = "SOCKETTALK_UPSTREAM")]
    upstream: Option<String>,

    /// Broadcast a keep-alive frame to every session periodically.
    #[arg(long, env = "SOCKETTALK_KEEP_ALIVE")]
    keep_alive: bool,

    /// Require every broadcast to carry this key's tag.
    #[arg(long, env = "SOCKETTALK_AUTH_KEY", hide_env_values = true)]
    auth_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = sockettalk_common::config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sockettalk=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.upstream.is_some() {
        config.broker.upstream = args.upstream;
    }
    if args.keep_alive {
        config.broker.keep_alive = true;
    }

    let mut options = BrokerOptions::from_config(&config.broker)?;
    if let Some(key) = args.auth_key.as_deref() {
        options.auth = Some(gate_with_key(key)?);
    }

    tracing::info!("Starting socket-talk broker v{}", env!("CARGO_PKG_VERSION"));
    if options.auth.is_some() {
        tracing::info!("Frame authentication enabled");
    }
    if options.keep_alive {
        tracing::info!("Keep-alive every {}s", options.keep_alive_interval.as_secs());
    }

    let broker = Broker::new(options).await?;
    if broker.is_federated() {
        tracing::info!("Federated under {}", config.broker.upstream.as_deref().unwrap_or_default());
    }

    let app = broker.router().layer(TraceLayer::new_for_http());
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
