//! Chunk Merkle validation: spec.md §3 invariant and §8 "Chunk validation
//! soundness".
//!
//! `data_path` is a leaf-to-root inclusion proof for a chunk's payload
//! against the transaction's `data_root`; `tx_path` links that `data_root`
//! to a block and is consulted only for its encoded `data_root` suffix (the
//! block-to-header chain itself is out of this crate's scope).
//!
//! Wire format (both produced and consumed only by this crate):
//! `data_path = leaf_hash(32) || end_offset(8, BE) || [is_right(1) || sibling_hash(32)]*`
//! read leaf-to-root. `tx_path` ends in `data_root(32)`.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Re-derives `data_root` from a `tx_path`'s encoded suffix.
pub fn derive_data_root_from_tx_path(tx_path: &[u8]) -> Result<[u8; 32]> {
    if tx_path.len() < 32 {
        return Err(Error::ValidationFailed("tx_path too short".into()));
    }
    let mut root = [0u8; 32];
    root.copy_from_slice(&tx_path[tx_path.len() - 32..]);
    Ok(root)
}

/// Verifies that `data`'s leaf is included in `data_root` at `relative_offset`,
/// per the chunk invariant in spec.md §3.
pub fn verify_data_path(
    data: &[u8],
    data_path: &[u8],
    data_root: &[u8; 32],
    relative_offset: u64,
) -> Result<u64> {
    if data_path.len() < 40 {
        return Err(Error::ValidationFailed("data_path too short".into()));
    }
    let mut leaf_hash = [0u8; 32];
    leaf_hash.copy_from_slice(&data_path[0..32]);
    let end_offset = u64::from_be_bytes(data_path[32..40].try_into().unwrap());

    let computed = sha256(data);
    if computed != leaf_hash {
        return Err(Error::ValidationFailed(
            "chunk data does not match leaf hash".into(),
        ));
    }

    // The leaf must actually cover the requested offset.
    let start_offset = end_offset.saturating_sub(data.len() as u64);
    if relative_offset < start_offset || relative_offset >= end_offset {
        return Err(Error::ValidationFailed(
            "relative_offset not covered by leaf".into(),
        ));
    }

    let mut current = leaf_hash;
    let mut rest = &data_path[40..];
    if !rest.len().is_multiple_of(33) {
        return Err(Error::ValidationFailed("malformed proof chain".into()));
    }
    while !rest.is_empty() {
        let is_right = rest[0] != 0;
        let mut sibling = [0u8; 32];
        sibling.copy_from_slice(&rest[1..33]);
        current = if is_right {
            hash_pair(&sibling, &current)
        } else {
            hash_pair(&current, &sibling)
        };
        rest = &rest[33..];
    }

    if &current != data_root {
        return Err(Error::ValidationFailed(
            "derived root does not match data_root".into(),
        ));
    }

    Ok(end_offset)
}

/// Full chunk validation: both re-derives `data_root` from `tx_path` and
/// checks it against the caller-supplied `data_root`, then verifies the
/// `data_path` inclusion proof.
pub fn verify_chunk(
    data: &[u8],
    data_path: &[u8],
    tx_path: &[u8],
    expected_data_root: &[u8; 32],
    relative_offset: u64,
) -> Result<()> {
    let derived_root = derive_data_root_from_tx_path(tx_path)?;
    if &derived_root != expected_data_root {
        return Err(Error::ValidationFailed(
            "tx_path data_root mismatch".into(),
        ));
    }
    verify_data_path(data, data_path, expected_data_root, relative_offset)?;
    Ok(())
}

#[cfg(test)]
pub mod testutil {
    //! Builds well-formed chunks/proofs for tests, mirroring how a trusted
    //! node would serve them.
    use super::*;

    /// A single-leaf tree: `data_root` is just the leaf hash itself.
    pub fn single_chunk_proof(data: &[u8]) -> ([u8; 32], Vec<u8>, Vec<u8>) {
        let leaf = sha256(data);
        let end_offset = data.len() as u64;
        let mut data_path = Vec::new();
        data_path.extend_from_slice(&leaf);
        data_path.extend_from_slice(&end_offset.to_be_bytes());

        let data_root = leaf;
        let mut tx_path = Vec::new();
        tx_path.extend_from_slice(&data_root);
        (data_root, data_path, tx_path)
    }

    /// Builds a left-leaning binary tree over `chunks` and returns
    /// `(data_root, data_paths, tx_paths)` aligned by index.
    pub fn multi_chunk_proofs(chunks: &[&[u8]]) -> ([u8; 32], Vec<Vec<u8>>, Vec<Vec<u8>>) {
        assert!(!chunks.is_empty());
        let mut end_offset = 0u64;
        let leaves: Vec<(u64, [u8; 32])> = chunks
            .iter()
            .map(|c| {
                end_offset += c.len() as u64;
                (end_offset, sha256(c))
            })
            .collect();

        // Build tree bottom-up, recording the sibling chain for each leaf.
        let mut level: Vec<[u8; 32]> = leaves.iter().map(|(_, h)| *h).collect();
        let mut chains: Vec<Vec<(bool, [u8; 32])>> = vec![Vec::new(); leaves.len()];
        let mut index_map: Vec<usize> = (0..leaves.len()).collect();

        while level.len() > 1 {
            let mut next_level = Vec::new();
            let mut next_index_map = vec![0usize; index_map.len()];
            let mut i = 0;
            while i < level.len() {
                if i + 1 < level.len() {
                    let left = level[i];
                    let right = level[i + 1];
                    let parent = hash_pair(&left, &right);
                    // Leaves under the left child combine as hash(current, sibling);
                    // leaves under the right child combine as hash(sibling, current).
                    for (leaf_idx, &cur) in index_map.iter().enumerate() {
                        if cur == i {
                            chains[leaf_idx].push((false, right));
                            next_index_map[leaf_idx] = next_level.len();
                        } else if cur == i + 1 {
                            chains[leaf_idx].push((true, left));
                            next_index_map[leaf_idx] = next_level.len();
                        }
                    }
                    next_level.push(parent);
                    i += 2;
                } else {
                    // Odd one out carries straight up unchanged.
                    for (leaf_idx, &cur) in index_map.iter().enumerate() {
                        if cur == i {
                            next_index_map[leaf_idx] = next_level.len();
                        }
                    }
                    next_level.push(level[i]);
                    i += 1;
                }
            }
            level = next_level;
            index_map = next_index_map;
        }
        let data_root = level[0];

        let data_paths: Vec<Vec<u8>> = leaves
            .iter()
            .zip(chains.iter())
            .map(|((end, leaf), chain)| {
                let mut path = Vec::new();
                path.extend_from_slice(leaf);
                path.extend_from_slice(&end.to_be_bytes());
                for (is_right, sibling) in chain {
                    path.push(*is_right as u8);
                    path.extend_from_slice(sibling);
                }
                path
            })
            .collect();

        let tx_paths = vec![data_root.to_vec(); chunks.len()];
        (data_root, data_paths, tx_paths)
    }

    #[test]
    fn single_chunk_round_trips() {
        let data = b"hello world";
        let (root, data_path, tx_path) = single_chunk_proof(data);
        verify_chunk(data, &data_path, &tx_path, &root, 0).unwrap();
    }

    #[test]
    fn multi_chunk_round_trips() {
        let a = vec![1u8; 100];
        let b = vec![2u8; 200];
        let c = vec![3u8; 50];
        let chunks: Vec<&[u8]> = vec![&a, &b, &c];
        let (root, data_paths, tx_paths) = multi_chunk_proofs(&chunks);
        verify_chunk(&a, &data_paths[0], &tx_paths[0], &root, 0).unwrap();
        verify_chunk(&b, &data_paths[1], &tx_paths[1], &root, 100).unwrap();
        verify_chunk(&c, &data_paths[2], &tx_paths[2], &root, 300).unwrap();
    }

    #[test]
    fn flipped_byte_fails_verification() {
        let data = b"hello world";
        let (root, data_path, tx_path) = single_chunk_proof(data);
        let mut corrupted = data.to_vec();
        corrupted[0] ^= 0xFF;
        assert!(verify_chunk(&corrupted, &data_path, &tx_path, &root, 0).is_err());
    }

    #[test]
    fn wrong_data_root_fails() {
        let data = b"hello world";
        let (_root, data_path, tx_path) = single_chunk_proof(data);
        let wrong_root = sha256(b"not the root");
        assert!(verify_chunk(data, &data_path, &tx_path, &wrong_root, 0).is_err());
    }
}
