//! Trusted-node chain source: resolves `data_root`/`offset`/`size` for a
//! transaction and serves chunks directly, bypassing peer scoring.
//! Spec.md §4.2.4, §4.3 step 1, §6 "Chunk protocol".

use crate::chunk_source::{ChunkDataSource, ChunkMetadataSource, ChunkRequestParams, FullChunkSourceLike};
use crate::constants::dedup::DEFAULT_ENTRY_TTL;
use crate::constants::trusted_node as consts;
use crate::dedup::{DedupMap, SharedDedupMap};
use crate::error::{Error, Result};
use crate::http_client::HttpClient;
use crate::merkle;
use crate::rate_limiter::RateLimiter;
use crate::types::{Chunk, ChunkData, ChunkMetadata};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// `data_root`, the transaction's end offset on the weave, and its size.
#[derive(Debug, Clone)]
pub struct TxOffset {
    pub data_root: [u8; 32],
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct RawTxOffset {
    offset: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct RawChunkResponse {
    chunk: String,
    data_path: String,
    tx_path: String,
}

/// `(data_root, relative_offset, absolute_offset)`: identifies an in-flight
/// trusted-node chunk fetch for dedup purposes.
type ChunkKey = ([u8; 32], u64, u64);

/// A chunk fetched straight from the trusted node, rate-limited and
/// concurrency-bounded per spec.md §4.2.4 and §5's backpressure rule.
///
/// Cheaply `Clone`: every field is either `Copy`, cheap to clone (`String`,
/// `HttpClient`), or already `Arc`-wrapped, so a clone can be captured by a
/// dedup driver future without re-sharing state.
#[derive(Clone)]
pub struct TrustedNodeChunkSource {
    http: HttpClient,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
    in_flight: Arc<Semaphore>,
    request_timeout: Duration,
    tx_offset_dedup: SharedDedupMap<String, std::result::Result<TxOffset, String>>,
    chunk_dedup: SharedDedupMap<ChunkKey, std::result::Result<Chunk, String>>,
}

impl TrustedNodeChunkSource {
    pub fn new(
        base_url: impl Into<String>,
        max_rps: f64,
        burst_multiplier: f64,
        max_in_flight: usize,
    ) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.into(),
            rate_limiter: Arc::new(RateLimiter::new(max_rps, burst_multiplier)),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            request_timeout: consts::DEFAULT_REQUEST_TIMEOUT,
            tx_offset_dedup: Arc::new(DedupMap::new(DEFAULT_ENTRY_TTL)),
            chunk_dedup: Arc::new(DedupMap::new(DEFAULT_ENTRY_TTL)),
        }
    }

    /// Resolves `(data_root, offset, size)` via two independent fields of
    /// `GET {trusted}/tx/{id}/offset`; `data_root` comes from a parallel
    /// `GET {trusted}/tx/{id}/data_root`. Spec.md §4.3 step 1: "two
    /// concurrent requests". Deduplicated per `id`, per spec.md §5:
    /// concurrent callers resolving the same transaction share one pair of
    /// upstream requests.
    pub async fn resolve_tx_offset(&self, id: &str) -> Result<TxOffset> {
        let this = self.clone();
        let id_owned = id.to_string();
        self.tx_offset_dedup
            .get_or_run(id.to_string(), async move {
                let offset_fut = this.fetch_offset(&id_owned);
                let data_root_fut = this.fetch_data_root(&id_owned);
                match tokio::try_join!(offset_fut, data_root_fut) {
                    Ok((offset_size, data_root)) => Ok(TxOffset {
                        data_root,
                        offset: offset_size.0,
                        size: offset_size.1,
                    }),
                    Err(e) => Err(e.to_string()),
                }
            })
            .await
            .map_err(Error::PeerUnavailable)
    }

    async fn fetch_offset(&self, id: &str) -> Result<(u64, u64)> {
        let url = format!("{}/tx/{id}/offset", self.base_url.trim_end_matches('/'));
        let raw: RawTxOffset = self.get_with_limits(&url).await?;
        let offset: u64 = raw
            .offset
            .parse()
            .map_err(|_| Error::PeerUnavailable("invalid offset in tx offset response".into()))?;
        let size: u64 = raw
            .size
            .parse()
            .map_err(|_| Error::PeerUnavailable("invalid size in tx offset response".into()))?;
        Ok((offset, size))
    }

    async fn fetch_data_root(&self, id: &str) -> Result<[u8; 32]> {
        let url = format!("{}/tx/{id}/data_root", self.base_url.trim_end_matches('/'));
        let bytes = self.get_bytes_with_limits(&url).await?;
        let text = String::from_utf8_lossy(&bytes);
        let decoded = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|e| Error::PeerUnavailable(format!("invalid base64url data_root: {e}")))?;
        decoded
            .try_into()
            .map_err(|_| Error::PeerUnavailable("data_root is not 32 bytes".into()))
    }

    /// `GET {trusted}/chunk/{absolute_offset}`, rate-limited and bounded.
    async fn fetch_raw_chunk(&self, absolute_offset: u64) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        let url = format!(
            "{}/chunk/{absolute_offset}",
            self.base_url.trim_end_matches('/')
        );
        let raw: RawChunkResponse = self.get_with_limits(&url).await?;
        let chunk = URL_SAFE_NO_PAD
            .decode(&raw.chunk)
            .map_err(|e| Error::PeerUnavailable(format!("invalid base64url chunk: {e}")))?;
        let data_path = URL_SAFE_NO_PAD
            .decode(&raw.data_path)
            .map_err(|e| Error::PeerUnavailable(format!("invalid base64url data_path: {e}")))?;
        let tx_path = URL_SAFE_NO_PAD
            .decode(&raw.tx_path)
            .map_err(|e| Error::PeerUnavailable(format!("invalid base64url tx_path: {e}")))?;
        Ok((chunk, data_path, tx_path))
    }

    /// Fetches and Merkle-validates a chunk directly from the trusted node,
    /// the same way `PeerChunkSource::try_peer` validates a peer's response.
    /// Deduplicated per `ChunkKey`, per spec.md §5.
    async fn get_chunk_validated(&self, params: ChunkRequestParams) -> Result<Chunk> {
        let this = self.clone();
        let key: ChunkKey = (params.data_root, params.relative_offset, params.absolute_offset);
        self.chunk_dedup
            .get_or_run(key, async move {
                let (data, data_path, tx_path) = this
                    .fetch_raw_chunk(params.absolute_offset)
                    .await
                    .map_err(|e| e.to_string())?;
                merkle::verify_chunk(
                    &data,
                    &data_path,
                    &tx_path,
                    &params.data_root,
                    params.relative_offset,
                )
                .map_err(|e| e.to_string())?;
                Ok(Chunk {
                    data,
                    data_path,
                    tx_path,
                    absolute_offset: params.absolute_offset,
                    relative_offset: params.relative_offset,
                    data_size: params.tx_size,
                })
            })
            .await
            .map_err(Error::ValidationFailed)
    }

    async fn get_with_limits<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let bytes = self.get_bytes_with_limits(url).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::PeerUnavailable(format!("invalid JSON from {url}: {e}")))
    }

    async fn get_bytes_with_limits(&self, url: &str) -> Result<bytes::Bytes> {
        let _permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        let mut attempt = 0u32;
        loop {
            self.rate_limiter.acquire().await;
            match self.http.get(url, &[], self.request_timeout).await {
                Ok(resp) => {
                    return resp
                        .bytes()
                        .await
                        .map_err(|e| Error::PeerUnavailable(e.to_string()))
                }
                Err(Error::PeerUnavailable(msg)) if msg.contains("429") => {
                    self.rate_limiter.debit_for_retry(attempt);
                    attempt += 1;
                    if attempt >= consts::DEFAULT_MAX_ATTEMPTS {
                        return Err(Error::PeerUnavailable(format!(
                            "{url} exhausted retries after HTTP 429"
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Makes the trusted node usable as a chunk-level fallback: spec.md §2's
/// dependency order lists `ChunkSource (peers + trusted node)`, so this
/// slots in as a sibling of `PeerChunkSource` in `CompositeChunkMetadataSource`
/// and as a fallback behind `ReadThroughChunkDataCache`.
#[async_trait]
impl FullChunkSourceLike for TrustedNodeChunkSource {
    async fn get_chunk(&self, params: ChunkRequestParams) -> Result<Chunk> {
        self.get_chunk_validated(params).await
    }
}

#[async_trait]
impl ChunkMetadataSource for TrustedNodeChunkSource {
    async fn get_chunk_metadata(&self, params: ChunkRequestParams) -> Result<ChunkMetadata> {
        let chunk = self.get_chunk_validated(params).await?;
        Ok(ChunkMetadata {
            data_path: chunk.data_path,
            tx_path: chunk.tx_path,
            offset: chunk.relative_offset,
            chunk_size: chunk.data.len() as u64,
        })
    }
}

#[async_trait]
impl ChunkDataSource for TrustedNodeChunkSource {
    async fn get_chunk_data(&self, params: ChunkRequestParams) -> Result<ChunkData> {
        let chunk = self.get_chunk_validated(params).await?;
        let hash = merkle::sha256(&chunk.data);
        Ok(ChunkData {
            chunk: chunk.data,
            hash,
        })
    }
}
