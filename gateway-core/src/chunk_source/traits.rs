//! ChunkMetadataSource / ChunkDataSource: spec.md §4.2.1.
//!
//! Object-safe async traits following the teacher's `Storage`/`BoxedStorage`
//! duck-typed trait-object pattern (`data/storage/traits.rs`): a plain
//! `#[async_trait]` interface, concrete sources are `Arc<dyn Trait>` values,
//! composition is itself a source holding a list of children.

use crate::error::Result;
use crate::types::{Chunk, ChunkData, ChunkMetadata};
use async_trait::async_trait;

/// The four values that pin down a single chunk: its transaction's total
/// size, the chunk's position on the weave and within the transaction, and
/// the enclosing `data_root`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRequestParams {
    pub tx_size: u64,
    pub absolute_offset: u64,
    pub data_root: [u8; 32],
    pub relative_offset: u64,
}

#[async_trait]
pub trait ChunkMetadataSource: Send + Sync {
    async fn get_chunk_metadata(&self, params: ChunkRequestParams) -> Result<ChunkMetadata>;
}

#[async_trait]
pub trait ChunkDataSource: Send + Sync {
    async fn get_chunk_data(&self, params: ChunkRequestParams) -> Result<ChunkData>;
}

/// A source that can produce both halves in one round trip (peer and
/// trusted-node protocols return `chunk`, `data_path`, and `tx_path`
/// together).
#[async_trait]
pub trait FullChunkSourceLike: Send + Sync {
    async fn get_chunk(&self, params: ChunkRequestParams) -> Result<Chunk>;
}
