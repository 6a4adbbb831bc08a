//! CompositeChunkMetadataSource: spec.md §4.2.1.
//!
//! Races up to `P_meta` sibling metadata sources; first success wins and the
//! rest are cancelled. Cancelled siblings must never count as failures
//! (spec.md §5: "their outcomes MUST NOT influence peer weights negatively
//! if they were cancelled").

use super::traits::{ChunkMetadataSource, ChunkRequestParams};
use crate::error::{Error, Result};
use crate::types::ChunkMetadata;
use async_trait::async_trait;
use std::sync::Arc;

pub struct CompositeChunkMetadataSource {
    sources: Vec<Arc<dyn ChunkMetadataSource>>,
}

impl CompositeChunkMetadataSource {
    pub fn new(sources: Vec<Arc<dyn ChunkMetadataSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl ChunkMetadataSource for CompositeChunkMetadataSource {
    async fn get_chunk_metadata(&self, params: ChunkRequestParams) -> Result<ChunkMetadata> {
        if self.sources.is_empty() {
            return Err(Error::AllSourcesFailed {
                sources: Vec::new(),
            });
        }

        let mut tasks = Vec::with_capacity(self.sources.len());
        for (i, source) in self.sources.iter().enumerate() {
            let source = source.clone();
            tasks.push(tokio::spawn(async move {
                (i, source.get_chunk_metadata(params).await)
            }));
        }

        let mut errors = Vec::new();
        let mut winner = None;
        let mut remaining = tasks.len();
        let mut tasks = tasks;
        while remaining > 0 {
            let (finished, _idx, rest) = futures::future::select_all(tasks).await;
            tasks = rest;
            remaining -= 1;
            match finished {
                Ok((i, Ok(metadata))) => {
                    winner = Some(metadata);
                    let _ = i;
                    break;
                }
                Ok((i, Err(e))) => errors.push(format!("source[{i}]: {e}")),
                Err(join_err) => errors.push(format!("task panicked: {join_err}")),
            }
        }

        // Cancel whatever is left racing; their outcomes are discarded, not
        // treated as failures.
        for task in tasks {
            task.abort();
        }

        winner.ok_or(Error::AllSourcesFailed { sources: errors })
    }
}
