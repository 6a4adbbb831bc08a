//! Arweave path manifest resolution: spec.md §4.7.

use crate::constants::manifest::{MAX_JSON_DEPTH, MAX_MANIFEST_BYTES};
use crate::error::{Error, Result};
use crate::stream::{self, ByteStream};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Outcome of a resolution attempt. `complete = true` means the resolver has
/// a definitive answer (hit or miss); `false` means it could not tell and a
/// fallback resolver should be tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedManifest {
    pub resolved_id: Option<String>,
    pub complete: bool,
}

impl ResolvedManifest {
    fn unresolved() -> Self {
        Self {
            resolved_id: None,
            complete: true,
        }
    }

    fn hit(id: String) -> Self {
        Self {
            resolved_id: Some(id),
            complete: true,
        }
    }

    fn incomplete() -> Self {
        Self {
            resolved_id: None,
            complete: false,
        }
    }
}

/// Consults an authoritative index external to this crate (e.g. a SQL/GraphQL
/// indexer). Out of scope per spec.md §4.7; the default implementation never
/// has an answer.
#[async_trait]
pub trait ManifestIndexSource: Send + Sync {
    async fn resolve_from_index(&self, id: &str, subpath: &str) -> Result<ResolvedManifest>;
}

pub struct NullManifestIndex;

#[async_trait]
impl ManifestIndexSource for NullManifestIndex {
    async fn resolve_from_index(&self, _id: &str, _subpath: &str) -> Result<ResolvedManifest> {
        Ok(ResolvedManifest::incomplete())
    }
}

#[derive(Debug, Deserialize)]
struct ManifestDoc {
    #[allow(dead_code)]
    manifest: String,
    #[serde(default)]
    index: Option<ManifestIndexEntry>,
    #[serde(default)]
    paths: HashMap<String, ManifestPathEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestIndexEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestPathEntry {
    id: String,
}

pub struct ManifestResolver<I: ManifestIndexSource = NullManifestIndex> {
    index: I,
}

impl ManifestResolver<NullManifestIndex> {
    pub fn new() -> Self {
        Self {
            index: NullManifestIndex,
        }
    }
}

impl Default for ManifestResolver<NullManifestIndex> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ManifestIndexSource> ManifestResolver<I> {
    pub fn with_index(index: I) -> Self {
        Self { index }
    }

    pub async fn resolve_from_index(&self, id: &str, subpath: &str) -> Result<ResolvedManifest> {
        self.index.resolve_from_index(id, subpath).await
    }

    /// Streaming JSON parse of a manifest body, bounded to
    /// [`MAX_MANIFEST_BYTES`] and rejecting nesting past [`MAX_JSON_DEPTH`].
    pub async fn resolve_from_data(
        &self,
        data_stream: ByteStream,
        _id: &str,
        subpath: &str,
    ) -> Result<ResolvedManifest> {
        let bytes = stream::collect(data_stream, MAX_MANIFEST_BYTES)
            .await
            .map_err(|e| Error::ValidationFailed(e.to_string()))?;

        check_json_depth(&bytes, MAX_JSON_DEPTH)?;

        let doc: ManifestDoc = serde_json::from_slice(&bytes)
            .map_err(|e| Error::ValidationFailed(format!("malformed manifest: {e}")))?;

        self.resolve_in_doc(&doc, subpath, 0)
    }

    fn resolve_in_doc(&self, doc: &ManifestDoc, subpath: &str, depth: usize) -> Result<ResolvedManifest> {
        // Guards against an `index.path` / `paths` cycle; a manifest has no
        // legitimate reason to need more than a couple of hops here.
        if depth > MAX_JSON_DEPTH {
            return Err(Error::ValidationFailed(
                "manifest path resolution exceeded depth bound".to_string(),
            ));
        }

        if subpath.is_empty() {
            let Some(index) = &doc.index else {
                return Ok(ResolvedManifest::unresolved());
            };
            if let Some(id) = &index.id {
                return Ok(ResolvedManifest::hit(id.clone()));
            }
            if let Some(path) = &index.path {
                return self.resolve_in_doc(doc, path, depth + 1);
            }
            return Ok(ResolvedManifest::unresolved());
        }

        match doc.paths.get(subpath) {
            Some(entry) => Ok(ResolvedManifest::hit(entry.id.clone())),
            None => Ok(ResolvedManifest::unresolved()),
        }
    }
}

/// Counts bracket nesting depth without a full parse, so a maliciously deep
/// document is rejected before `serde_json` recurses into it.
fn check_json_depth(bytes: &[u8], max_depth: usize) -> Result<()> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for &b in bytes {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > max_depth {
                    return Err(Error::ValidationFailed(
                        "manifest JSON nesting exceeds maximum depth".to_string(),
                    ));
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn body(json: &str) -> ByteStream {
        stream::once(Bytes::from(json.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn empty_subpath_uses_index_id() {
        let resolver = ManifestResolver::new();
        let doc = r#"{"manifest":"arweave/paths","index":{"id":"abc"},"paths":{}}"#;
        let resolved = resolver.resolve_from_data(body(doc), "tx", "").await.unwrap();
        assert_eq!(resolved, ResolvedManifest::hit("abc".to_string()));
    }

    #[tokio::test]
    async fn empty_subpath_follows_index_path() {
        let resolver = ManifestResolver::new();
        let doc = r#"{
            "manifest":"arweave/paths",
            "index":{"path":"index.html"},
            "paths":{"index.html":{"id":"def"}}
        }"#;
        let resolved = resolver.resolve_from_data(body(doc), "tx", "").await.unwrap();
        assert_eq!(resolved, ResolvedManifest::hit("def".to_string()));
    }

    #[tokio::test]
    async fn exact_subpath_match() {
        let resolver = ManifestResolver::new();
        let doc = r#"{"manifest":"arweave/paths","paths":{"a/b.txt":{"id":"ghi"}}}"#;
        let resolved = resolver
            .resolve_from_data(body(doc), "tx", "a/b.txt")
            .await
            .unwrap();
        assert_eq!(resolved, ResolvedManifest::hit("ghi".to_string()));
    }

    #[tokio::test]
    async fn unmatched_subpath_is_unresolved() {
        let resolver = ManifestResolver::new();
        let doc = r#"{"manifest":"arweave/paths","paths":{"a.txt":{"id":"ghi"}}}"#;
        let resolved = resolver
            .resolve_from_data(body(doc), "tx", "missing.txt")
            .await
            .unwrap();
        assert_eq!(resolved, ResolvedManifest::unresolved());
    }

    #[tokio::test]
    async fn deeply_nested_json_is_rejected() {
        let resolver = ManifestResolver::new();
        let nested = "[".repeat(MAX_JSON_DEPTH + 1) + &"]".repeat(MAX_JSON_DEPTH + 1);
        let result = resolver.resolve_from_data(body(&nested), "tx", "").await;
        assert!(matches!(result, Err(Error::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn null_index_source_is_always_incomplete() {
        let resolver = ManifestResolver::new();
        let resolved = resolver.resolve_from_index("tx", "").await.unwrap();
        assert!(!resolved.complete);
    }
}
