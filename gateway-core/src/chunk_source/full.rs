//! FullChunkSource: spec.md §4.2.1.
//!
//! Joins a metadata source and a data source: resolves metadata first to
//! learn the chunk-boundary-aligned offset, then fetches data at that
//! aligned position, then merges the two halves into a `Chunk`.

use super::traits::{ChunkDataSource, ChunkMetadataSource, ChunkRequestParams, FullChunkSourceLike};
use crate::error::Result;
use crate::types::Chunk;
use async_trait::async_trait;
use std::sync::Arc;

pub struct FullChunkSource {
    metadata_source: Arc<dyn ChunkMetadataSource>,
    data_source: Arc<dyn ChunkDataSource>,
}

impl FullChunkSource {
    pub fn new(
        metadata_source: Arc<dyn ChunkMetadataSource>,
        data_source: Arc<dyn ChunkDataSource>,
    ) -> Self {
        Self {
            metadata_source,
            data_source,
        }
    }

    pub async fn get_chunk(&self, params: ChunkRequestParams) -> Result<Chunk> {
        let metadata = self.metadata_source.get_chunk_metadata(params).await?;

        // The aligned offset may differ from the requested relative_offset;
        // shift absolute_offset by the same delta.
        let delta = metadata.offset as i64 - params.relative_offset as i64;
        let aligned_params = ChunkRequestParams {
            tx_size: params.tx_size,
            absolute_offset: (params.absolute_offset as i64 + delta) as u64,
            data_root: params.data_root,
            relative_offset: metadata.offset,
        };

        let data = self.data_source.get_chunk_data(aligned_params).await?;

        Ok(Chunk {
            data: data.chunk,
            data_path: metadata.data_path,
            tx_path: metadata.tx_path,
            absolute_offset: aligned_params.absolute_offset,
            relative_offset: metadata.offset,
            data_size: params.tx_size,
        })
    }
}

#[async_trait]
impl FullChunkSourceLike for FullChunkSource {
    async fn get_chunk(&self, params: ChunkRequestParams) -> Result<Chunk> {
        FullChunkSource::get_chunk(self, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkData, ChunkMetadata};
    use async_trait::async_trait;

    struct FixedMetadata(ChunkMetadata);
    #[async_trait]
    impl ChunkMetadataSource for FixedMetadata {
        async fn get_chunk_metadata(&self, _params: ChunkRequestParams) -> Result<ChunkMetadata> {
            Ok(self.0.clone())
        }
    }

    struct FixedData(ChunkData);
    #[async_trait]
    impl ChunkDataSource for FixedData {
        async fn get_chunk_data(&self, _params: ChunkRequestParams) -> Result<ChunkData> {
            Ok(ChunkData {
                chunk: self.0.chunk.clone(),
                hash: self.0.hash,
            })
        }
    }

    #[tokio::test]
    async fn merges_metadata_and_data_at_aligned_offset() {
        let metadata = ChunkMetadata {
            data_path: vec![1, 2, 3],
            tx_path: vec![4, 5, 6],
            offset: 262_144, // aligned to the next chunk boundary
            chunk_size: 262_144,
        };
        let data = ChunkData {
            chunk: vec![7u8; 10],
            hash: [0u8; 32],
        };

        let full = FullChunkSource::new(Arc::new(FixedMetadata(metadata)), Arc::new(FixedData(data)));

        let params = ChunkRequestParams {
            tx_size: 524_288,
            absolute_offset: 1000,
            data_root: [0u8; 32],
            relative_offset: 100, // requested offset inside the first chunk
        };

        let chunk = full.get_chunk(params).await.unwrap();
        assert_eq!(chunk.relative_offset, 262_144);
        // absolute_offset shifts by the same delta as relative_offset.
        assert_eq!(chunk.absolute_offset, 1000 + (262_144 - 100));
        assert_eq!(chunk.data, vec![7u8; 10]);
    }
}
