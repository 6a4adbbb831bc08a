//! The lazy byte-sequence abstraction every composed source returns.
//!
//! spec.md §9 calls for "a small lazy byte-sequence abstraction: a function
//! producing `Option<Bytes>` per step plus an `abort()` and a `size_hint`".
//! `futures::Stream` already models exactly that (`poll_next` is the step
//! function, dropping the stream is the abort), so `ByteStream` is a type
//! alias over a boxed stream rather than a bespoke trait.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Wraps an already-boxable stream of `Bytes` results.
pub fn boxed<S>(s: S) -> ByteStream
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    Box::pin(s)
}

/// A stream over a single, already-materialized buffer.
pub fn once(bytes: Bytes) -> ByteStream {
    boxed(stream::once(async move { Ok(bytes) }))
}

/// An empty stream (used for zero-length range requests).
pub fn empty() -> ByteStream {
    boxed(stream::empty())
}

/// Collects an entire stream into a single buffer. Used by tests and by the
/// manifest resolver, which must bound how much it reads (see
/// [`crate::constants::manifest::MAX_MANIFEST_BYTES`]).
pub async fn collect(mut s: ByteStream, max_bytes: u64) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = s.next().await {
        let chunk = chunk?;
        if out.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "stream exceeded maximum allowed size",
            ));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}
