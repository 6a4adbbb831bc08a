//! Configuration constants for the gateway core

/// Default server configuration
pub mod server {
    /// Default HTTP listening host
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Default HTTP server port
    pub const DEFAULT_PORT: u16 = 1984;
}

/// Chunk and weave geometry
pub mod weave {
    /// Maximum payload bytes per chunk
    pub const CHUNK_SIZE: u64 = 262_144;

    /// Size of a sync bucket: a 10 GiB-aligned region of the weave
    pub const SYNC_BUCKET_SIZE: u64 = 10 * 1024 * 1024 * 1024;
}

/// Peer weighting and refresh policy
pub mod peers {
    use std::time::Duration;

    /// Minimum peer weight
    pub const MIN_WEIGHT: i32 = 1;

    /// Maximum peer weight
    pub const MAX_WEIGHT: i32 = 100;

    /// Weight delta applied on report_success / report_failure
    pub const WEIGHT_DELTA: i32 = 5;

    /// Default weight assigned to a freshly-discovered `get-chunk` peer
    pub const DEFAULT_GET_CHUNK_WEIGHT: i32 = 1;

    /// Weight assigned to a preferred (operator-configured) `get-chunk` URL
    pub const PREFERRED_GET_CHUNK_WEIGHT: i32 = 100;

    /// Default weight assigned to a freshly-discovered peer for other categories
    pub const DEFAULT_OTHER_WEIGHT: i32 = 50;

    /// How often to refresh the peer list from the trusted node
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

    /// How often to refresh sync buckets
    pub const DEFAULT_BUCKET_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

    /// Timeout for a single peer `/info` probe during refresh
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Bounded parallelism for peer info probes during refresh
    pub const DEFAULT_PROBE_CONCURRENCY: usize = 20;

    /// Default number of peers to select for a chunk request
    pub const DEFAULT_N_PEERS: usize = 5;
}

/// Chunk source pipeline
pub mod chunks {
    use std::time::Duration;

    /// Bounded parallelism for composite metadata source races
    pub const DEFAULT_META_CONCURRENCY: usize = 3;

    /// Per-peer request timeout for `GET /chunk/{offset}`
    pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(10);

    /// TTL for the in-memory hot chunk cache
    pub const HOT_CACHE_TTL: Duration = Duration::from_secs(5);
}

/// Trusted-node rate limiting and backpressure
pub mod trusted_node {
    use std::time::Duration;

    /// Default sustained requests/sec against the trusted node
    pub const DEFAULT_MAX_RPS: f64 = 15.0;

    /// Burst credit as a multiple of `max_rps`
    pub const DEFAULT_BURST_MULTIPLIER: f64 = 300.0;

    /// Maximum outstanding concurrent requests to the trusted node
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 100;

    /// Maximum retry attempts before giving up on a trusted-node request
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Timeout for a single trusted-node request
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
}

/// In-flight request deduplication
pub mod dedup {
    use std::time::Duration;

    /// TTL for a completed dedup entry kept around for stable-caching purposes
    pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(45);
}

/// Range-reconstruction prefetch window
pub mod range {
    /// How many chunks ahead of the current read position may be prefetched
    pub const PREFETCH_WINDOW: usize = 3;
}

/// Chain / fork-depth defaults
pub mod chain {
    /// Number of blocks behind the tip beyond which a block is considered stable
    pub const DEFAULT_FORK_DEPTH: u64 = 18;
}

/// Manifest resolution
pub mod manifest {
    /// Maximum manifest body size accepted for streaming parse
    pub const MAX_MANIFEST_BYTES: u64 = 10 * 1024 * 1024;

    /// Maximum nesting depth accepted while streaming-parsing a manifest
    pub const MAX_JSON_DEPTH: usize = 32;

    /// Content-type tag identifying an Arweave path manifest
    pub const CONTENT_TYPE: &str = "application/x.arweave-manifest+json";
}

/// Request-attribute propagation
pub mod request_attrs {
    /// Maximum number of hops before a request is rejected as a likely loop
    pub const DEFAULT_MAX_HOPS: u32 = 10;
}

/// Cache-Control policy (seconds)
pub mod cache_control {
    /// `stable = true` objects: 30 days, immutable
    pub const STABLE_MAX_AGE: u64 = 2_592_000;

    /// `stable = false` objects: 2 hours
    pub const UNSTABLE_MAX_AGE: u64 = 7_200;

    /// Not-found responses: 1 minute, immutable
    pub const NOT_FOUND_MAX_AGE: u64 = 60;
}
