//! # sockettalk-broker
//!
//! Broadcast broker for socket-talk. Handles:
//! - WebSocket sessions that publish and receive envelopes
//! - Fan-out of every accepted frame to every other session
//! - An optional shared-secret auth gate in front of fan-out
//! - The payload store side channel (`/socketTalk/set`, `/socketTalk/get`)
//! - An optional federation link to one upstream broker
//! - Keep-alive filler frames for idle proxies
//!
//! The broker never parses envelopes: it moves opaque frames. Topic matching,
//! payload fetching and request/reply all happen in clients.

pub mod cache;
pub mod error;
pub mod hub;
mod routes;
mod session;

use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    response::Response,
    routing::{get, post},
};
use sockettalk_common::auth::{Gate, gate_with_key};
use sockettalk_common::config::BrokerConfig;
use sockettalk_common::endpoint::{GET_ROUTE, SET_ROUTE, WS_ROUTE};
use sockettalk_common::envelope::KEEP_ALIVE;
use sockettalk_common::{BaseUrl, ConfigError};
use sockettalk_federation::link::DEFAULT_RECONNECT_INTERVAL;
use sockettalk_federation::{FederationLink, UpstreamStore};
use tokio::sync::mpsc;
use tracing::info;

pub use cache::PayloadStore;
pub use error::BrokerError;
pub use hub::Hub;

/// Default period between keep-alive frames.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Broker settings.
#[derive(Clone)]
pub struct BrokerOptions {
    /// Validates and strips every inbound frame; `None` broadcasts everything.
    pub auth: Option<Gate>,
    pub keep_alive: bool,
    pub keep_alive_interval: Duration,
    pub cache_ttl: Duration,
    /// http(s) base address of the upstream broker.
    pub upstream: Option<String>,
    pub reconnect_interval: Duration,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            auth: None,
            keep_alive: false,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            cache_ttl: cache::DEFAULT_TTL,
            upstream: None,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl BrokerOptions {
    /// Build options from the `[broker]` config section.
    pub fn from_config(cfg: &BrokerConfig) -> Result<Self, ConfigError> {
        let auth = cfg.auth_key.as_deref().map(gate_with_key).transpose()?;
        Ok(Self {
            auth,
            keep_alive: cfg.keep_alive,
            keep_alive_interval: Duration::from_secs(cfg.keep_alive_interval_secs),
            cache_ttl: Duration::from_secs(cfg.cache_ttl_secs),
            upstream: cfg.upstream.clone().filter(|u| !u.is_empty()),
            reconnect_interval: Duration::from_secs(cfg.reconnect_interval_secs),
        })
    }
}

/// Where SET/GET are served from.
pub(crate) enum PayloadBackend {
    Local(Arc<PayloadStore>),
    Upstream(UpstreamStore),
}

pub(crate) struct BrokerState {
    pub(crate) hub: Arc<Hub>,
    pub(crate) payloads: PayloadBackend,
    pub(crate) auth: Option<Gate>,
    pub(crate) link: Option<FederationLink>,
}

/// A running broker. Cheap to clone; all clones share the same sessions and store.
#[derive(Clone)]
pub struct Broker {
    state: Arc<BrokerState>,
}

impl Broker {
    /// Start the broker's background work and, when federated, dial the upstream.
    ///
    /// The first upstream dial is fatal: a wrong address is reported here
    /// instead of being retried in the background.
    pub async fn new(options: BrokerOptions) -> Result<Self, BrokerError> {
        let hub = Arc::new(Hub::new());

        let (payloads, link) = match options.upstream.as_deref() {
            Some(raw) => {
                let upstream = BaseUrl::parse(raw)?;
                let (link, inbound) =
                    FederationLink::connect(upstream.clone(), options.reconnect_interval).await?;
                tokio::spawn(inject_upstream(Arc::downgrade(&hub), inbound));
                (PayloadBackend::Upstream(UpstreamStore::new(upstream)?), Some(link))
            }
            None => (PayloadBackend::Local(PayloadStore::start(options.cache_ttl)), None),
        };

        if options.keep_alive {
            tokio::spawn(keep_alive(Arc::downgrade(&hub), options.keep_alive_interval));
        }

        Ok(Self {
            state: Arc::new(BrokerState {
                hub,
                payloads,
                auth: options.auth,
                link,
            }),
        })
    }

    /// Build the broker's router: the WebSocket route plus the payload endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route(WS_ROUTE, get(ws_handler))
            .route(SET_ROUTE, post(routes::set_payload))
            .route(GET_ROUTE, post(routes::get_payload))
            // Payloads are arbitrary size; that is the point of the side channel.
            .layer(DefaultBodyLimit::disable())
            .with_state(self.state.clone())
    }

    /// Number of connected sessions, federation links from downstream brokers included.
    pub async fn session_count(&self) -> usize {
        self.state.hub.active_count().await
    }

    pub fn is_federated(&self) -> bool {
        self.state.link.is_some()
    }
}

/// Convenience for callers that only need the router.
pub async fn build_router(options: BrokerOptions) -> Result<Router, BrokerError> {
    Ok(Broker::new(options).await?.router())
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<BrokerState>>) -> Response {
    ws.on_upgrade(move |socket| session::handle_connection(socket, state))
}

/// Fan frames received from the upstream out to every local session.
async fn inject_upstream(hub: Weak<Hub>, mut inbound: mpsc::Receiver<String>) {
    while let Some(frame) = inbound.recv().await {
        let Some(hub) = hub.upgrade() else { return };
        hub.broadcast(&frame, None).await;
    }
}

async fn keep_alive(hub: Weak<Hub>, period: Duration) {
    info!("Keep-alive enabled every {period:?}");
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(hub) = hub.upgrade() else { return };
        hub.broadcast(KEEP_ALIVE, None).await;
    }
}
