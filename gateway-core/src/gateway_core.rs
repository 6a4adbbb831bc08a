//! Top-level service wiring: spec.md §9 "Global mutable state" —
//! "a `GatewayCore` value that owns the peer manager, caches, and source
//! pipeline, with `start()` / `stop()` methods; all collaborators accept it
//! by reference."
//!
//! Dependency order follows spec.md §2's diagram: PeerManager → ChunkSource
//! (peers + trusted node) → ReadThroughChunkDataCache → TxChunksDataSource →
//! (siblings: GatewayDataSource, TrustedNodeDataSource) →
//! SequentialDataSource → ReadThroughDataCache → ManifestResolver.

use crate::chunk_source::{
    ChunkDataSource, ChunkMetadataSource, CompositeChunkMetadataSource, FullChunkSource,
    PeerChunkSource, ReadThroughChunkDataCache,
};
use crate::config::{Config, DataStoreConfig};
use crate::data_source::{DataSource, GatewayDataSource, ReadThroughDataCache, SequentialDataSource, TxChunksDataSource};
use crate::manifest::ManifestResolver;
use crate::peers::PeerManager;
use crate::store::filesystem::{FilesystemChunkStore, FilesystemDataStore};
use crate::store::memory::{InMemoryChunkStore, InMemoryDataStore};
use crate::store::{ChunkStore, DataStore};
use crate::trusted_node::TrustedNodeChunkSource;
use std::sync::Arc;

/// Owns every long-lived collaborator the HTTP surface needs: the peer
/// manager, the composed data-source pipeline, and the manifest resolver.
#[derive(Clone)]
pub struct GatewayCore {
    pub config: Config,
    pub peer_manager: Arc<PeerManager>,
    pub data_source: Arc<dyn DataSource>,
    pub manifest_resolver: Arc<ManifestResolver>,
}

impl GatewayCore {
    pub fn new(config: Config) -> Self {
        let peer_manager = PeerManager::new(config.trusted_node.url.clone(), config.peers.clone());

        let (chunk_store, data_store): (Arc<dyn ChunkStore>, Arc<dyn DataStore>) =
            match &config.data_store {
                DataStoreConfig::Memory => {
                    (Arc::new(InMemoryChunkStore::new()), Arc::new(InMemoryDataStore::new()))
                }
                DataStoreConfig::Filesystem { path } => (
                    Arc::new(FilesystemChunkStore::new(path.join("chunks"))),
                    Arc::new(FilesystemDataStore::new(path.join("contiguous"))),
                ),
            };

        let trusted_node = Arc::new(TrustedNodeChunkSource::new(
            config.trusted_node.url.clone(),
            config.trusted_node.max_rps,
            config.trusted_node.burst_multiplier,
            config.trusted_node.max_in_flight,
        ));

        let peer_chunk_source = Arc::new(PeerChunkSource::new(peer_manager.clone()));
        let metadata_source: Arc<dyn ChunkMetadataSource> = Arc::new(CompositeChunkMetadataSource::new(vec![
            peer_chunk_source.clone() as Arc<dyn ChunkMetadataSource>,
            trusted_node.clone() as Arc<dyn ChunkMetadataSource>,
        ]));
        let data_source_cached = Arc::new(ReadThroughChunkDataCache::new(
            chunk_store,
            vec![
                peer_chunk_source as Arc<dyn ChunkDataSource>,
                trusted_node.clone() as Arc<dyn ChunkDataSource>,
            ],
        ));
        let full_chunk_source = Arc::new(FullChunkSource::new(metadata_source.clone(), data_source_cached));

        let tx_chunks = Arc::new(TxChunksDataSource::new(trusted_node, metadata_source, full_chunk_source));

        let mut sources: Vec<Arc<dyn DataSource>> = config
            .gateways
            .iter()
            .map(|url| {
                Arc::new(GatewayDataSource::new(url.clone(), config.gateway_id.clone(), false))
                    as Arc<dyn DataSource>
            })
            .collect();
        sources.push(tx_chunks);
        // The trusted node also serves contiguous data directly, behind the
        // peer-gateway siblings in the try order: spec.md §2's diagram lists
        // it as a third SequentialDataSource child.
        sources.push(Arc::new(GatewayDataSource::new(
            config.trusted_node.url.clone(),
            config.gateway_id.clone(),
            true,
        )));

        let sequential = Arc::new(SequentialDataSource::new(sources));
        let data_source: Arc<dyn DataSource> = Arc::new(ReadThroughDataCache::new(data_store, sequential));

        let manifest_resolver = Arc::new(ManifestResolver::new());

        Self {
            config,
            peer_manager,
            data_source,
            manifest_resolver,
        }
    }

    /// Starts background peer/bucket refresh. Idempotent.
    pub fn start(&self) {
        self.peer_manager.start_auto_refresh();
    }

    /// Stops background refresh tasks. Idempotent.
    pub fn stop(&self) {
        self.peer_manager.stop_auto_refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        let core = GatewayCore::new(Config::default());
        assert_eq!(core.config.port, 1984);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let core = GatewayCore::new(Config::default());
        core.start();
        core.start();
        core.stop();
        core.stop();
    }
}
