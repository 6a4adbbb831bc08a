//! In-memory `ChunkStore`/`DataStore`, for tests and the default
//! `DataStoreConfig::Memory` operator setting.

use super::{ChunkStore, DataStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

type ChunkKey = ([u8; 32], u64);

#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<ChunkKey, Vec<u8>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn get(
        &self,
        data_root: &[u8; 32],
        relative_offset: u64,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.chunks.read().get(&(*data_root, relative_offset)).cloned())
    }

    async fn set(
        &self,
        data_root: &[u8; 32],
        relative_offset: u64,
        data: &[u8],
    ) -> Result<(), StoreError> {
        self.chunks
            .write()
            .insert((*data_root, relative_offset), data.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDataStore {
    blobs: RwLock<HashMap<[u8; 32], Vec<u8>>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn get(&self, hash: &[u8; 32]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().get(hash).cloned())
    }

    async fn set(&self, hash: &[u8; 32], data: &[u8]) -> Result<(), StoreError> {
        self.blobs.write().insert(*hash, data.to_vec());
        Ok(())
    }
}
