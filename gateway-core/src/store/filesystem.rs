//! Filesystem-backed `ChunkStore`/`DataStore` per spec.md §6's
//! "Local persistence layout":
//!
//! - `data/chunks/{data_root}/{relative_offset}` — chunk bytes.
//! - `data/contiguous/{hash-prefix-2}/{hash-prefix-2}/{hash}` — content-
//!   addressed blobs.
//!
//! Cleanup is external; this store only reads and writes.

use super::{ChunkStore, DataStore, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct FilesystemChunkStore {
    root: PathBuf,
}

impl FilesystemChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, data_root: &[u8; 32], relative_offset: u64) -> PathBuf {
        self.root
            .join("chunks")
            .join(hex::encode(data_root))
            .join(relative_offset.to_string())
    }
}

#[async_trait]
impl ChunkStore for FilesystemChunkStore {
    async fn get(
        &self,
        data_root: &[u8; 32],
        relative_offset: u64,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        read_if_exists(&self.path_for(data_root, relative_offset)).await
    }

    async fn set(
        &self,
        data_root: &[u8; 32],
        relative_offset: u64,
        data: &[u8],
    ) -> Result<(), StoreError> {
        write_atomically(&self.path_for(data_root, relative_offset), data).await
    }
}

pub struct FilesystemDataStore {
    root: PathBuf,
}

impl FilesystemDataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, hash: &[u8; 32]) -> PathBuf {
        let hex = hex::encode(hash);
        self.root
            .join("contiguous")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex)
    }
}

#[async_trait]
impl DataStore for FilesystemDataStore {
    async fn get(&self, hash: &[u8; 32]) -> Result<Option<Vec<u8>>, StoreError> {
        read_if_exists(&self.path_for(hash)).await
    }

    async fn set(&self, hash: &[u8; 32], data: &[u8]) -> Result<(), StoreError> {
        write_atomically(&self.path_for(hash), data).await
    }
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Box::new(e)),
    }
}

async fn write_atomically(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunk_store_round_trips_on_disk() {
        let dir = tempdir();
        let store = FilesystemChunkStore::new(dir.clone());
        let root = [7u8; 32];
        assert!(store.get(&root, 42).await.unwrap().is_none());
        store.set(&root, 42, b"chunk-bytes").await.unwrap();
        assert_eq!(store.get(&root, 42).await.unwrap().unwrap(), b"chunk-bytes");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn data_store_uses_two_level_hash_prefix_layout() {
        let dir = tempdir();
        let store = FilesystemDataStore::new(dir.clone());
        let hash = [0xabu8; 32];
        store.set(&hash, b"blob").await.unwrap();
        let expected = dir.join("contiguous").join("ab").join("ab").join(hex::encode(hash));
        assert!(expected.exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("gateway-core-store-test-{:?}", std::thread::current().id()));
        dir
    }
}
