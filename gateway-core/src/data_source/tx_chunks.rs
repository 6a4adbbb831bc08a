//! TxChunksDataSource: spec.md §4.3, §4.3.1.
//!
//! Reconstructs a transaction's payload by concatenating chunks, with a
//! single-slot prefetch pipeline (spec.md §9 "Coroutine-style prefetch"):
//! the next chunk's fetch is issued as soon as the current one resolves, and
//! is awaited only when the consumer has drained the current chunk.

use super::{DataSource, GetDataParams};
use crate::chunk_source::{ChunkMetadataSource, ChunkRequestParams, FullChunkSourceLike};
use crate::error::{Error, Result};
use crate::stream::{self, ByteStream};
use crate::trusted_node::TrustedNodeChunkSource;
use crate::types::{Chunk, ContiguousData};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct TxChunksDataSource {
    trusted_node: Arc<TrustedNodeChunkSource>,
    metadata_source: Arc<dyn ChunkMetadataSource>,
    chunk_source: Arc<dyn FullChunkSourceLike>,
}

impl TxChunksDataSource {
    pub fn new(
        trusted_node: Arc<TrustedNodeChunkSource>,
        metadata_source: Arc<dyn ChunkMetadataSource>,
        chunk_source: Arc<dyn FullChunkSourceLike>,
    ) -> Self {
        Self {
            trusted_node,
            metadata_source,
            chunk_source,
        }
    }

    fn spawn_fetch(
        chunk_source: Arc<dyn FullChunkSourceLike>,
        data_root: [u8; 32],
        start_offset: u64,
        tx_size: u64,
        relative_offset: u64,
    ) -> JoinHandle<Result<Chunk>> {
        tokio::spawn(async move {
            chunk_source
                .get_chunk(ChunkRequestParams {
                    tx_size,
                    absolute_offset: start_offset.wrapping_add(relative_offset),
                    data_root,
                    relative_offset,
                })
                .await
        })
    }

    /// Builds the untrimmed, chunk-boundary-aligned byte stream starting at
    /// the first chunk covering `target`. Returns the aligned start offset
    /// alongside the stream (the first chunk may begin before `target`).
    async fn chunk_stream_from(
        &self,
        data_root: [u8; 32],
        start_offset: u64,
        tx_size: u64,
        target: u64,
    ) -> Result<(u64, ByteStream)> {
        // Locate the chunk covering `target` using metadata only (spec.md
        // §4.3.1 step 1); chunks we skip past are never fetched in full.
        let mut bytes = 0u64;
        let mut meta = self
            .metadata_source
            .get_chunk_metadata(ChunkRequestParams {
                tx_size,
                absolute_offset: start_offset,
                data_root,
                relative_offset: 0,
            })
            .await
            .map_err(|_| Error::NotFound)?;

        while bytes + meta.chunk_size <= target {
            bytes += meta.chunk_size;
            meta = self
                .metadata_source
                .get_chunk_metadata(ChunkRequestParams {
                    tx_size,
                    absolute_offset: start_offset.wrapping_add(bytes),
                    data_root,
                    relative_offset: bytes,
                })
                .await?;
        }

        let aligned_start = bytes;
        let current = self
            .chunk_source
            .get_chunk(ChunkRequestParams {
                tx_size,
                absolute_offset: start_offset.wrapping_add(bytes),
                data_root,
                relative_offset: bytes,
            })
            .await
            .map_err(|_| Error::NotFound)?;
        let next = if bytes + (current.data.len() as u64) < tx_size {
            Some(Self::spawn_fetch(
                self.chunk_source.clone(),
                data_root,
                start_offset,
                tx_size,
                bytes + current.data.len() as u64,
            ))
        } else {
            None
        };

        let state = PipelineState {
            chunk_source: self.chunk_source.clone(),
            data_root,
            start_offset,
            tx_size,
            bytes,
            current: Some(current),
            next,
        };

        let s = futures::stream::unfold(state, |mut state| async move {
            let chunk = state.current.take()?;
            let data = chunk.data;
            let new_bytes = state.bytes + data.len() as u64;
            state.bytes = new_bytes;

            if new_bytes < state.tx_size {
                let handle = state.next.take();
                match handle {
                    Some(h) => match h.await {
                        Ok(Ok(next_chunk)) => {
                            let further = if new_bytes + (next_chunk.data.len() as u64)
                                < state.tx_size
                            {
                                Some(Self::spawn_fetch(
                                    state.chunk_source.clone(),
                                    state.data_root,
                                    state.start_offset,
                                    state.tx_size,
                                    new_bytes + next_chunk.data.len() as u64,
                                ))
                            } else {
                                None
                            };
                            state.current = Some(next_chunk);
                            state.next = further;
                        }
                        Ok(Err(e)) => {
                            return Some((Err(io::Error::other(e.to_string())), state));
                        }
                        Err(join_err) => {
                            return Some((Err(io::Error::other(join_err.to_string())), state));
                        }
                    },
                    None => {}
                }
            }

            Some((Ok(Bytes::from(data)), state))
        });

        Ok((aligned_start, stream::boxed(s)))
    }

    async fn full_stream(
        &self,
        data_root: [u8; 32],
        start_offset: u64,
        tx_size: u64,
    ) -> Result<ByteStream> {
        let (_aligned, s) = self
            .chunk_stream_from(data_root, start_offset, tx_size, 0)
            .await?;
        Ok(s)
    }

    /// spec.md §4.3.1.
    async fn range_stream(
        &self,
        data_root: [u8; 32],
        start_offset: u64,
        tx_size: u64,
        range_start: u64,
        range_end: u64,
    ) -> Result<ByteStream> {
        if range_start >= tx_size {
            return Err(Error::RangeUnsatisfiable);
        }
        let effective_end = range_end.min(tx_size);
        if range_start == effective_end {
            return Ok(stream::empty());
        }

        let (aligned_start, inner) = self
            .chunk_stream_from(data_root, start_offset, tx_size, range_start)
            .await?;

        let skip = range_start - aligned_start;
        let take = effective_end - range_start;
        Ok(trim_stream(inner, skip, take))
    }
}

struct PipelineState {
    chunk_source: Arc<dyn FullChunkSourceLike>,
    data_root: [u8; 32],
    start_offset: u64,
    tx_size: u64,
    bytes: u64,
    current: Option<Chunk>,
    next: Option<JoinHandle<Result<Chunk>>>,
}

struct TrimState {
    inner: ByteStream,
    skip: u64,
    take: u64,
}

/// Skips `skip` leading bytes and caps total output at `take` bytes.
fn trim_stream(inner: ByteStream, skip: u64, take: u64) -> ByteStream {
    let state = TrimState { inner, skip, take };
    stream::boxed(futures::stream::unfold(state, |mut state| async move {
        if state.take == 0 {
            return None;
        }
        loop {
            let chunk = match state.inner.next().await? {
                Ok(c) => c,
                Err(e) => return Some((Err(e), state)),
            };
            let mut chunk = chunk;
            if state.skip > 0 {
                if (chunk.len() as u64) <= state.skip {
                    state.skip -= chunk.len() as u64;
                    continue;
                }
                chunk = chunk.slice((state.skip as usize)..);
                state.skip = 0;
            }
            if (chunk.len() as u64) > state.take {
                chunk = chunk.slice(0..(state.take as usize));
            }
            state.take -= chunk.len() as u64;
            return Some((Ok(chunk), state));
        }
    }))
}

#[async_trait]
impl DataSource for TxChunksDataSource {
    async fn get_data(&self, params: GetDataParams) -> Result<ContiguousData> {
        let resolved = self.trusted_node.resolve_tx_offset(&params.id).await?;
        // The chain reports the *end* offset of the transaction's payload.
        let start_offset = resolved.offset + 1 - resolved.size;

        let (stream, size) = match params.region {
            Some(region) => {
                let range_end = region.offset + region.size;
                let s = self
                    .range_stream(
                        resolved.data_root,
                        start_offset,
                        resolved.size,
                        region.offset,
                        range_end,
                    )
                    .await?;
                (s, range_end.min(resolved.size) - region.offset)
            }
            None => {
                let s = self
                    .full_stream(resolved.data_root, start_offset, resolved.size)
                    .await?;
                (s, resolved.size)
            }
        };

        Ok(ContiguousData {
            stream,
            size: Some(size),
            source_content_type: None,
            cached: false,
            trusted: true,
            verified: true,
            request_attributes: Some(params.request_attributes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::testutil::multi_chunk_proofs;
    use crate::types::ChunkMetadata;
    use async_trait::async_trait;

    struct FixedChunkSource {
        chunks: Vec<Chunk>,
    }

    #[async_trait]
    impl FullChunkSourceLike for FixedChunkSource {
        async fn get_chunk(&self, params: ChunkRequestParams) -> Result<Chunk> {
            self.chunks
                .iter()
                .find(|c| c.relative_offset == params.relative_offset)
                .cloned()
                .ok_or(Error::NotFound)
        }
    }

    #[async_trait]
    impl ChunkMetadataSource for FixedChunkSource {
        async fn get_chunk_metadata(&self, params: ChunkRequestParams) -> Result<ChunkMetadata> {
            let chunk = self
                .chunks
                .iter()
                .find(|c| c.relative_offset == params.relative_offset)
                .cloned()
                .ok_or(Error::NotFound)?;
            Ok(ChunkMetadata {
                data_path: chunk.data_path,
                tx_path: chunk.tx_path,
                offset: chunk.relative_offset,
                chunk_size: chunk.data.len() as u64,
            })
        }
    }

    fn build_chunks(payloads: &[&[u8]]) -> ([u8; 32], Vec<Chunk>) {
        let (root, data_paths, tx_paths) = multi_chunk_proofs(payloads);
        let mut offset = 0u64;
        let mut chunks = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            chunks.push(Chunk {
                data: payload.to_vec(),
                data_path: data_paths[i].clone(),
                tx_path: tx_paths[i].clone(),
                absolute_offset: 1000 + offset,
                relative_offset: offset,
                data_size: payloads.iter().map(|p| p.len() as u64).sum(),
            });
            offset += payload.len() as u64;
        }
        (root, chunks)
    }

    #[tokio::test]
    async fn full_stream_emits_all_bytes_in_order() {
        let a = vec![1u8; 100];
        let b = vec![2u8; 100];
        let payloads: Vec<&[u8]> = vec![&a, &b];
        let (root, chunks) = build_chunks(&payloads);
        let tx_size: u64 = payloads.iter().map(|p| p.len() as u64).sum();
        let source = FixedChunkSource { chunks };

        let trusted_node = Arc::new(TrustedNodeChunkSource::new(
            "http://trusted.example",
            15.0,
            300.0,
            100,
        ));
        let source = Arc::new(source);
        let tx_source = TxChunksDataSource::new(trusted_node, source.clone(), source);

        let collected = stream::collect(
            tx_source.full_stream(root, 1000, tx_size).await.unwrap(),
            tx_size,
        )
        .await
        .unwrap();

        let mut expected = a.clone();
        expected.extend_from_slice(&b);
        assert_eq!(collected, expected);
    }

    #[tokio::test]
    async fn range_stream_trims_to_exact_bytes() {
        let a = vec![1u8; 100];
        let b = vec![2u8; 100];
        let c = vec![3u8; 100];
        let payloads: Vec<&[u8]> = vec![&a, &b, &c];
        let (root, chunks) = build_chunks(&payloads);
        let tx_size: u64 = payloads.iter().map(|p| p.len() as u64).sum();
        let source = FixedChunkSource { chunks };
        let trusted_node = Arc::new(TrustedNodeChunkSource::new(
            "http://trusted.example",
            15.0,
            300.0,
            100,
        ));
        let source = Arc::new(source);
        let tx_source = TxChunksDataSource::new(trusted_node, source.clone(), source);

        // Range [150, 250) spans the tail of chunk b and the head of chunk c.
        let collected = stream::collect(
            tx_source
                .range_stream(root, 1000, tx_size, 150, 250)
                .await
                .unwrap(),
            100,
        )
        .await
        .unwrap();

        let mut full = a.clone();
        full.extend_from_slice(&b);
        full.extend_from_slice(&c);
        assert_eq!(collected, full[150..250]);
    }

    #[tokio::test]
    async fn range_start_past_tx_size_is_unsatisfiable() {
        let a = vec![1u8; 100];
        let payloads: Vec<&[u8]> = vec![&a];
        let (root, chunks) = build_chunks(&payloads);
        let source = FixedChunkSource { chunks };
        let trusted_node = Arc::new(TrustedNodeChunkSource::new(
            "http://trusted.example",
            15.0,
            300.0,
            100,
        ));
        let source = Arc::new(source);
        let tx_source = TxChunksDataSource::new(trusted_node, source.clone(), source);

        let result = tx_source.range_stream(root, 1000, 100, 200, 300).await;
        assert!(matches!(result, Err(Error::RangeUnsatisfiable)));
    }

    #[tokio::test]
    async fn empty_range_emits_nothing() {
        let a = vec![1u8; 100];
        let payloads: Vec<&[u8]> = vec![&a];
        let (root, chunks) = build_chunks(&payloads);
        let source = FixedChunkSource { chunks };
        let trusted_node = Arc::new(TrustedNodeChunkSource::new(
            "http://trusted.example",
            15.0,
            300.0,
            100,
        ));
        let source = Arc::new(source);
        let tx_source = TxChunksDataSource::new(trusted_node, source.clone(), source);

        let collected = stream::collect(
            tx_source.range_stream(root, 1000, 100, 50, 50).await.unwrap(),
            100,
        )
        .await
        .unwrap();
        assert!(collected.is_empty());
    }
}
