//! HTTP side channel: parks payloads on the broker's store and fetches them back.

use reqwest::Client;
use serde_json::json;
use sockettalk_common::BaseUrl;

use crate::error::{ClientError, Result};

/// Async client for the broker payload store.
#[derive(Clone)]
pub struct PayloadClient {
    client: Client,
    base: BaseUrl,
}

impl PayloadClient {
    /// `no_proxy` disables any system or environment proxy for these calls.
    pub fn new(base: BaseUrl, no_proxy: bool) -> Result<Self> {
        let mut builder =
            Client::builder().user_agent(concat!("sockettalk-client/", env!("CARGO_PKG_VERSION")));
        if no_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(ClientError::Http)?;
        Ok(Self { client, base })
    }

    /// Store `payload` and return its reference id.
    pub async fn set(&self, payload: Vec<u8>) -> Result<String> {
        let resp = self
            .client
            .post(self.base.set_endpoint())
            .body(payload)
            .send()
            .await?;
        let body = check(resp).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Fetch the payload stored under `id`.
    pub async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .post(self.base.get_endpoint())
            .json(&json!({ "ID": id }))
            .send()
            .await?;
        check(resp).await
    }
}

async fn check(resp: reqwest::Response) -> Result<Vec<u8>> {
    let status = resp.status();
    let body = resp.bytes().await?;
    if !status.is_success() {
        let message = match String::from_utf8_lossy(&body).trim() {
            "" => status.to_string(),
            text => text.to_owned(),
        };
        return Err(ClientError::Api { status: status.as_u16(), message });
    }
    Ok(body.to_vec())
}
