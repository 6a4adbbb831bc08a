//! Thin `reqwest` wrapper shared by every component that talks to peers,
//! the trusted node, or sibling gateways over HTTP.
//!
//! Grounded in the teacher's `MspService::http_client: reqwest::Client`
//! field (`services/msp.rs`) — this just centralizes the error mapping and
//! timeout plumbing that field's direct callers duplicated.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }

    /// Issues a GET request with the given timeout and returns the raw
    /// response for streaming/header inspection by the caller.
    pub async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let mut req = self.inner.get(url).timeout(timeout);
        for (k, v) in headers {
            req = req.header(k, v);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::PeerUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::PeerUnavailable(format!(
                "{} returned HTTP {}",
                url,
                resp.status()
            )));
        }
        Ok(resp)
    }

    pub async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Bytes> {
        let resp = self.get(url, &[], timeout).await?;
        resp.bytes()
            .await
            .map_err(|e| Error::PeerUnavailable(e.to_string()))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, timeout: Duration) -> Result<T> {
        let bytes = self.get_bytes(url, timeout).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::PeerUnavailable(format!("invalid JSON from {url}: {e}")))
    }
}
