//! Payload store proxy.
//!
//! A federated broker serves SET/GET by forwarding the raw request body to
//! the upstream's endpoints and relaying status and body back untouched.

use std::time::Duration;

use reqwest::Client;
use sockettalk_common::BaseUrl;
use tracing::debug;

use crate::error::FederationError;

/// Status and body returned by the upstream, relayed verbatim.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// HTTP client for the upstream broker's payload store.
#[derive(Debug, Clone)]
pub struct UpstreamStore {
    http: Client,
    upstream: BaseUrl,
}

impl UpstreamStore {
    pub fn new(upstream: BaseUrl) -> Result<Self, FederationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("SocketTalk-Federation/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FederationError::HttpClient(e.to_string()))?;

        Ok(Self { http, upstream })
    }

    /// `POST /socketTalk/set` on the upstream.
    pub async fn set(&self, body: impl Into<reqwest::Body>) -> Result<ProxyResponse, FederationError> {
        self.forward(self.upstream.set_endpoint(), body).await
    }

    /// `POST /socketTalk/get` on the upstream.
    pub async fn get(&self, body: impl Into<reqwest::Body>) -> Result<ProxyResponse, FederationError> {
        self.forward(self.upstream.get_endpoint(), body).await
    }

    async fn forward(
        &self,
        url: String,
        body: impl Into<reqwest::Body>,
    ) -> Result<ProxyResponse, FederationError> {
        debug!("Federation proxy POST {}", url);
        let resp = self.http.post(&url).body(body).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(ProxyResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use sockettalk_common::endpoint::{GET_ROUTE, SET_ROUTE};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn relays_status_and_body() {
        let app = Router::new()
            .route(SET_ROUTE, post(|body: String| async move { format!("ref-for-{body}") }))
            .route(GET_ROUTE, post(|| async { (StatusCode::BAD_REQUEST, "ID is wrong") }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let store = UpstreamStore::new(BaseUrl::parse(&format!("http://{addr}")).unwrap()).unwrap();

        let set = store.set("abc").await.unwrap();
        assert_eq!(set.status, 200);
        assert_eq!(set.body, b"ref-for-abc");

        let get = store.get(r#"{"ID":"nope"}"#).await.unwrap();
        assert_eq!(get.status, 400);
        assert_eq!(get.body, b"ID is wrong");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_error() {
        let store = UpstreamStore::new(BaseUrl::parse("http://127.0.0.1:1").unwrap()).unwrap();
        assert!(matches!(store.set("x").await, Err(FederationError::RemoteHttp(..))));
    }
}
