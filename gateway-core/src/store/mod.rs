//! Content-addressed and chunk persistence: spec.md §4.2.3, §4.6, §6.
//!
//! Mirrors the teacher's `Storage` trait + `InMemoryStorage` pattern
//! (`data/storage/traits.rs`, `data/storage/memory.rs`): a small async
//! trait, a thread-safe in-memory implementation for tests, and (for the
//! binary) a filesystem implementation following §6's on-disk layout.

pub mod filesystem;
pub mod memory;

use async_trait::async_trait;
use std::error::Error as StdError;

pub type StoreError = Box<dyn StdError + Send + Sync>;

/// Keyed by `(data_root, relative_offset)`: spec.md §4.2.3.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn get(&self, data_root: &[u8; 32], relative_offset: u64) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(
        &self,
        data_root: &[u8; 32],
        relative_offset: u64,
        data: &[u8],
    ) -> Result<(), StoreError>;
}

/// Content-addressed by `hash`: spec.md §4.6.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn get(&self, hash: &[u8; 32]) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, hash: &[u8; 32], data: &[u8]) -> Result<(), StoreError>;
}
