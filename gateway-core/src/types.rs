//! Core data model: spec.md §3.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

/// A 32-byte transaction or data-item id, conventionally rendered as a
/// 43-character unpadded base64url string.
pub type Id = String;

/// A Merkle inclusion proof, base64url-decoded to raw bytes.
pub type Proof = Vec<u8>;

/// A half-open byte range `[offset, offset + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: u64,
    pub size: u64,
}

impl Region {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// The unit of chain-level storage: payload plus its inclusion proofs.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub data: Vec<u8>,
    pub data_path: Proof,
    pub tx_path: Proof,
    pub absolute_offset: u64,
    pub relative_offset: u64,
    pub data_size: u64,
}

/// Everything about a chunk except its payload bytes.
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    pub data_path: Proof,
    pub tx_path: Proof,
    /// The chunk-boundary-aligned offset; may differ from the caller's
    /// requested `relative_offset`.
    pub offset: u64,
    pub chunk_size: u64,
}

/// Raw chunk bytes plus their content hash.
#[derive(Debug, Clone)]
pub struct ChunkData {
    pub chunk: Vec<u8>,
    pub hash: [u8; 32],
}

/// Sidecar metadata about a contiguous data object.
#[derive(Debug, Clone, Default)]
pub struct DataAttributes {
    pub hash: Option<[u8; 32]>,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub is_manifest: Option<bool>,
    pub stable: Option<bool>,
    pub data_offset: Option<u64>,
    pub parent_id: Option<Id>,
    pub root_tx_id: Option<Id>,
    pub offset: Option<u64>,
}

/// Propagated per-request trace: spec.md §4.8, §6.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAttributes {
    pub origin: Option<String>,
    pub hops: u32,
    pub origin_node_release: Option<String>,
    pub arns_name: Option<String>,
    pub arns_basename: Option<String>,
    pub arns_record: Option<String>,
    pub client_ips: Vec<IpAddr>,
    pub via: Vec<String>,
}

impl RequestAttributes {
    /// Builds the attributes to send on an outbound hop: increments `hops`,
    /// appends `self_id` to `via`, and preserves everything else.
    pub fn for_outbound_hop(&self, self_id: &str) -> Self {
        let mut via = self.via.clone();
        via.push(self_id.to_lowercase());
        Self {
            origin: self.origin.clone(),
            hops: self.hops + 1,
            origin_node_release: self.origin_node_release.clone(),
            arns_name: self.arns_name.clone(),
            arns_basename: self.arns_basename.clone(),
            arns_record: self.arns_record.clone(),
            client_ips: self.client_ips.clone(),
            via,
        }
    }

    /// True if `gateway_id` has already handled this request (loop safety,
    /// spec.md §8 "Loop safety").
    pub fn has_visited(&self, gateway_id: &str) -> bool {
        let needle = gateway_id.to_lowercase();
        self.via.iter().any(|v| v == &needle)
    }
}

/// A streamed byte range plus its metadata: spec.md §3 "ContiguousData".
pub struct ContiguousData {
    pub stream: crate::stream::ByteStream,
    pub size: Option<u64>,
    pub source_content_type: Option<String>,
    pub cached: bool,
    pub trusted: bool,
    pub verified: bool,
    pub request_attributes: Option<RequestAttributes>,
}

/// An operator-configured or discovered peer gateway/node.
#[derive(Debug, Clone)]
pub struct Peer {
    pub url: String,
    pub height: Option<u64>,
    pub blocks: Option<u64>,
    pub last_seen: Option<std::time::Instant>,
    pub sync_buckets: Option<HashSet<u64>>,
    pub buckets_last_updated: Option<std::time::Instant>,
}

/// A peer with its current selection weight, bounded to `[1, 100]`.
#[derive(Debug, Clone)]
pub struct WeightedPeer {
    pub id: String,
    pub weight: i32,
}

/// The operation category a peer is scored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerCategory {
    Chain,
    GetChunk,
    PostChunk,
}
