//! # sockettalk-federation
//!
//! Chains one broker to an upstream broker so both act as a single broadcast
//! domain.
//!
//! ```text
//!  client ─► broker B ──── link (ws) ────► broker A ◄─ client
//!                 │                           ▲
//!                 └── POST /socketTalk/set ───┘  (payload store proxied)
//! ```
//!
//! - **Link** (`link.rs`): a WebSocket session the downstream broker holds
//!   as a client of the upstream. Locally accepted frames are forwarded up;
//!   frames from upstream are handed back for local fan-out. The first dial
//!   is fatal on failure, later drops reconnect on a fixed interval.
//! - **Proxy** (`proxy.rs`): forwards payload store SET/GET to the upstream,
//!   so payloads only live at the root of the chain.
//!
//! Cycles are not detected: a broker federated into a loop will circulate
//! frames forever.

pub mod error;
pub mod link;
pub mod proxy;

pub use error::FederationError;
pub use link::FederationLink;
pub use proxy::{ProxyResponse, UpstreamStore};
