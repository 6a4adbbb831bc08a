//! PeerChunkSource: spec.md §4.2.2.

use super::traits::{ChunkDataSource, ChunkMetadataSource, ChunkRequestParams, FullChunkSourceLike};
use crate::constants::chunks::DEFAULT_CHUNK_TIMEOUT;
use crate::constants::dedup::DEFAULT_ENTRY_TTL;
use crate::constants::peers::DEFAULT_N_PEERS;
use crate::dedup::{DedupMap, SharedDedupMap};
use crate::error::{Error, Result};
use crate::http_client::HttpClient;
use crate::merkle;
use crate::peers::PeerManager;
use crate::types::{Chunk, ChunkData, ChunkMetadata, PeerCategory};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawChunk {
    chunk: String,
    data_path: String,
    tx_path: String,
}

/// `(data_root, relative_offset, absolute_offset)`: identifies an in-flight
/// chunk fetch for dedup purposes.
type ChunkKey = ([u8; 32], u64, u64);

/// A peer-backed chunk source. Metadata and data resolution share a single
/// fetch-and-validate per chunk via `dedup`, per spec.md §5's in-flight
/// deduplication rule: `get_chunk_metadata` and `get_chunk_data` otherwise
/// race two independent round-trips (and two peer-weight reports) for what
/// is, on the wire, one request.
pub struct PeerChunkSource {
    peer_manager: Arc<PeerManager>,
    http: HttpClient,
    dedup: SharedDedupMap<ChunkKey, std::result::Result<Chunk, String>>,
}

impl PeerChunkSource {
    pub fn new(peer_manager: Arc<PeerManager>) -> Self {
        Self {
            peer_manager,
            http: HttpClient::new(),
            dedup: Arc::new(DedupMap::new(DEFAULT_ENTRY_TTL)),
        }
    }

    async fn try_peer(http: &HttpClient, peer: &str, params: ChunkRequestParams) -> Result<Chunk> {
        let url = format!("{peer}/chunk/{}", params.absolute_offset);
        let raw: RawChunk = http.get_json(&url, DEFAULT_CHUNK_TIMEOUT).await?;

        let data = URL_SAFE_NO_PAD
            .decode(&raw.chunk)
            .map_err(|e| Error::ValidationFailed(format!("invalid base64url chunk: {e}")))?;
        let data_path = URL_SAFE_NO_PAD
            .decode(&raw.data_path)
            .map_err(|e| Error::ValidationFailed(format!("invalid base64url data_path: {e}")))?;
        let tx_path = URL_SAFE_NO_PAD
            .decode(&raw.tx_path)
            .map_err(|e| Error::ValidationFailed(format!("invalid base64url tx_path: {e}")))?;

        merkle::verify_chunk(
            &data,
            &data_path,
            &tx_path,
            &params.data_root,
            params.relative_offset,
        )?;

        Ok(Chunk {
            data,
            data_path,
            tx_path,
            absolute_offset: params.absolute_offset,
            relative_offset: params.relative_offset,
            data_size: params.tx_size,
        })
    }

    /// spec.md §4.2.2 steps 1-7: select candidates by sync bucket, try each
    /// in order, report success/failure, never poison the request on a
    /// single dishonest peer. Driven at most once per `ChunkKey` in flight;
    /// concurrent callers (whether through `ChunkMetadataSource` or
    /// `ChunkDataSource`) share this single fetch.
    async fn fetch(
        http: HttpClient,
        peer_manager: Arc<PeerManager>,
        params: ChunkRequestParams,
    ) -> std::result::Result<Chunk, String> {
        let candidates = peer_manager.select_peers_for_offset(params.absolute_offset, DEFAULT_N_PEERS);
        if candidates.is_empty() {
            return Err("all sources failed: no candidate peers".to_string());
        }

        let mut errors = Vec::new();
        for peer in &candidates {
            match Self::try_peer(&http, peer, params).await {
                Ok(chunk) => {
                    peer_manager.report_success(PeerCategory::GetChunk, peer);
                    return Ok(chunk);
                }
                Err(e) => {
                    debug!(%peer, error = %e, "chunk fetch failed");
                    peer_manager.report_failure(PeerCategory::GetChunk, peer);
                    errors.push(format!("{peer}: {e}"));
                }
            }
        }

        Err(format!("all sources failed: {}", errors.join("; ")))
    }

    async fn get_chunk_deduped(&self, params: ChunkRequestParams) -> Result<Chunk> {
        let key: ChunkKey = (params.data_root, params.relative_offset, params.absolute_offset);
        let http = self.http.clone();
        let peer_manager = self.peer_manager.clone();
        self.dedup
            .get_or_run(key, async move { Self::fetch(http, peer_manager, params).await })
            .await
            .map_err(|sources| Error::AllSourcesFailed {
                sources: vec![sources],
            })
    }
}

#[async_trait]
impl FullChunkSourceLike for PeerChunkSource {
    async fn get_chunk(&self, params: ChunkRequestParams) -> Result<Chunk> {
        self.get_chunk_deduped(params).await
    }
}

#[async_trait]
impl ChunkMetadataSource for PeerChunkSource {
    async fn get_chunk_metadata(&self, params: ChunkRequestParams) -> Result<ChunkMetadata> {
        let chunk = self.get_chunk_deduped(params).await?;
        Ok(ChunkMetadata {
            data_path: chunk.data_path,
            tx_path: chunk.tx_path,
            offset: chunk.relative_offset,
            chunk_size: chunk.data.len() as u64,
        })
    }
}

#[async_trait]
impl ChunkDataSource for PeerChunkSource {
    async fn get_chunk_data(&self, params: ChunkRequestParams) -> Result<ChunkData> {
        let chunk = self.get_chunk_deduped(params).await?;
        let hash = merkle::sha256(&chunk.data);
        Ok(ChunkData {
            chunk: chunk.data,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerManagerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> PeerManagerConfig {
        PeerManagerConfig {
            preferred_get_chunk_urls: Vec::new(),
            ignore_urls: Vec::new(),
            refresh_interval_secs: 600,
            bucket_refresh_interval_secs: 300,
            probe_timeout_secs: 5,
            probe_concurrency: 10,
        }
    }

    fn params() -> ChunkRequestParams {
        ChunkRequestParams {
            tx_size: 10,
            absolute_offset: 500,
            data_root: [1u8; 32],
            relative_offset: 0,
        }
    }

    #[tokio::test]
    async fn metadata_and_data_fail_the_same_way_with_no_peers_configured() {
        let peer_manager = PeerManager::new("http://trusted.example", test_config());
        let source = PeerChunkSource::new(peer_manager);
        assert!(source.get_chunk_metadata(params()).await.is_err());
        assert!(source.get_chunk_data(params()).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_metadata_and_data_requests_share_one_driver() {
        let peer_manager = PeerManager::new("http://trusted.example", test_config());
        let source = Arc::new(PeerChunkSource::new(peer_manager));
        let calls = Arc::new(AtomicUsize::new(0));
        let key: ChunkKey = (params().data_root, params().relative_offset, params().absolute_offset);

        // Pre-seed the dedup entry so both trait methods below observe an
        // already-completed driver instead of needing real network access.
        let c = calls.clone();
        let _ = source
            .dedup
            .get_or_run(key, async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<Chunk, String>("no peers".to_string())
            })
            .await;
        let before = calls.load(Ordering::SeqCst);

        let _ = source.get_chunk_metadata(params()).await;
        let _ = source.get_chunk_data(params()).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }
}
