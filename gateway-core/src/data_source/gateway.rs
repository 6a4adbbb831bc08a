//! GatewayDataSource: spec.md §4.4.

use super::request_attrs::{format_request_attrs, is_in_via};
use super::{DataSource, GetDataParams};
use crate::error::{Error, Result};
use crate::http_client::HttpClient;
use crate::stream::{self, ByteStream};
use crate::types::ContiguousData;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches from a trusted upstream gateway, propagating request-attribute
/// headers with `hops` incremented and `via` appended with this gateway's
/// own identifier.
pub struct GatewayDataSource {
    http: HttpClient,
    base_url: String,
    self_id: String,
    raw: bool,
}

impl GatewayDataSource {
    /// `raw = true` hits `GET {gateway}/raw/{id}` (bypassing manifest
    /// resolution on the peer); `raw = false` hits `GET {gateway}/{id}`.
    pub fn new(base_url: impl Into<String>, self_id: impl Into<String>, raw: bool) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.into(),
            self_id: self_id.into(),
            raw,
        }
    }
}

#[async_trait]
impl DataSource for GatewayDataSource {
    async fn get_data(&self, params: GetDataParams) -> Result<ContiguousData> {
        // Loop safety: never dispatch to a gateway that already handled this
        // request (spec.md §4.8, §8 "Loop safety").
        if is_in_via(&params.request_attributes.via, &self.self_id) {
            return Err(Error::NotFound);
        }

        let path_prefix = if self.raw { "raw/" } else { "" };
        let url = format!(
            "{}/{path_prefix}{}",
            self.base_url.trim_end_matches('/'),
            params.id
        );

        let outbound_attrs = params.request_attributes.for_outbound_hop(&self.self_id);
        let headers = format_request_attrs(&outbound_attrs);

        let resp = self.http.get(&url, &headers, REQUEST_TIMEOUT).await?;

        let cached = resp
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("hit"))
            .unwrap_or(false);
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let size = resp.content_length();

        let body: ByteStream = stream::boxed(resp.bytes_stream().map(|r| {
            r.map_err(|e| std::io::Error::other(e.to_string()))
                .map(|b: Bytes| b)
        }));

        Ok(ContiguousData {
            stream: body,
            size,
            source_content_type: content_type,
            cached,
            trusted: true,
            verified: false,
            request_attributes: Some(outbound_attrs),
        })
    }
}
