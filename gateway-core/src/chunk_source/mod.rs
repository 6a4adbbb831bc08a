//! ChunkSource pipeline: spec.md §4.2.

pub mod cache;
pub mod composite;
pub mod full;
pub mod peer;
pub mod traits;

pub use cache::ReadThroughChunkDataCache;
pub use composite::CompositeChunkMetadataSource;
pub use full::FullChunkSource;
pub use peer::PeerChunkSource;
pub use traits::{ChunkDataSource, ChunkMetadataSource, ChunkRequestParams, FullChunkSourceLike};
