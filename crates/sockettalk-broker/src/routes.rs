//! Payload store endpoints.
//!
//! - `POST /socketTalk/set`: raw body in, reference id out.
//! - `POST /socketTalk/get`: `{"ID": ref}` in, raw bytes out, 400 on miss.
//!
//! A federated broker relays both calls to its upstream verbatim.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use sockettalk_federation::{FederationError, ProxyResponse};

use crate::error::BrokerError;
use crate::{BrokerState, PayloadBackend};

#[derive(Debug, Deserialize)]
struct GetPayload {
    #[serde(rename = "ID")]
    id: String,
}

pub(crate) async fn set_payload(State(state): State<Arc<BrokerState>>, body: Bytes) -> Response {
    match &state.payloads {
        PayloadBackend::Local(store) => store.set(body).await.into_response(),
        PayloadBackend::Upstream(upstream) => relay(upstream.set(body).await),
    }
}

pub(crate) async fn get_payload(
    State(state): State<Arc<BrokerState>>,
    body: Bytes,
) -> Result<Response, BrokerError> {
    match &state.payloads {
        PayloadBackend::Local(store) => {
            let req: GetPayload = serde_json::from_slice(&body)
                .map_err(|e| BrokerError::InvalidRequest(e.to_string()))?;
            let bytes = store.get(&req.id).await?;
            Ok(([(header::CONTENT_TYPE, "text/plain")], bytes).into_response())
        }
        PayloadBackend::Upstream(upstream) => Ok(relay(upstream.get(body).await)),
    }
}

fn relay(result: Result<ProxyResponse, FederationError>) -> Response {
    match result {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, [(header::CONTENT_TYPE, "text/plain")], resp.body).into_response()
        }
        Err(e) => BrokerError::Proxy(e).into_response(),
    }
}
