//! PeerManager: spec.md §4.1.
//!
//! Maintains a weighted peer list per operation category and hands out
//! weighted-random selections with success/failure feedback. Mutation is
//! behind a `parking_lot::RwLock` per category, following the teacher's
//! `Arc<RwLock<..>>` shared-state idiom (`services/msp.rs`'s `stats_cache`).

use crate::config::PeerManagerConfig;
use crate::constants::peers as peer_consts;
use crate::constants::weave::SYNC_BUCKET_SIZE;
use crate::error::Result;
use crate::etf;
use crate::http_client::HttpClient;
use crate::types::{Peer, PeerCategory, WeightedPeer};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct State {
    categories: HashMap<PeerCategory, Vec<WeightedPeer>>,
    peers: HashMap<String, Peer>,
}

impl State {
    fn new() -> Self {
        let mut categories = HashMap::new();
        categories.insert(PeerCategory::Chain, Vec::new());
        categories.insert(PeerCategory::GetChunk, Vec::new());
        categories.insert(PeerCategory::PostChunk, Vec::new());
        Self {
            categories,
            peers: HashMap::new(),
        }
    }
}

pub struct PeerManager {
    state: RwLock<State>,
    http: HttpClient,
    trusted_node_url: String,
    config: PeerManagerConfig,
    preferred_get_chunk: HashSet<String>,
    ignore: HashSet<String>,
    refresh_task: RwLock<Option<JoinHandle<()>>>,
    bucket_task: RwLock<Option<JoinHandle<()>>>,
}

impl PeerManager {
    pub fn new(trusted_node_url: impl Into<String>, config: PeerManagerConfig) -> Arc<Self> {
        let mut state = State::new();
        let preferred_get_chunk: HashSet<String> =
            config.preferred_get_chunk_urls.iter().cloned().collect();
        for url in &config.preferred_get_chunk_urls {
            state.categories.get_mut(&PeerCategory::GetChunk).unwrap().push(WeightedPeer {
                id: url.clone(),
                weight: peer_consts::PREFERRED_GET_CHUNK_WEIGHT,
            });
        }
        let ignore: HashSet<String> = config.ignore_urls.iter().cloned().collect();
        Arc::new(Self {
            state: RwLock::new(state),
            http: HttpClient::new(),
            trusted_node_url: trusted_node_url.into(),
            config,
            preferred_get_chunk,
            ignore,
            refresh_task: RwLock::new(None),
            bucket_task: RwLock::new(None),
        })
    }

    fn default_weight(category: PeerCategory) -> i32 {
        match category {
            PeerCategory::GetChunk => peer_consts::DEFAULT_GET_CHUNK_WEIGHT,
            _ => peer_consts::DEFAULT_OTHER_WEIGHT,
        }
    }

    /// Fetches `/peers` from the trusted node, probes each host's `/info`
    /// with bounded parallelism, and (re)populates the peer map.
    pub async fn refresh_peers(&self) -> Result<()> {
        let peers_url = format!("{}/peers", self.trusted_node_url.trim_end_matches('/'));
        let discovered: Vec<String> = self
            .http
            .get_json(&peers_url, Duration::from_secs(self.config.probe_timeout_secs))
            .await
            .map_err(|e| crate::error::Error::PeerRefresh(e.to_string()))?;

        let candidates: Vec<String> = discovered
            .into_iter()
            .filter(|h| !self.ignore.contains(h))
            .collect();

        let probe_timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let results = futures::stream::iter(candidates.into_iter().map(|host| {
            let http = self.http.clone();
            async move {
                let url = format!("http://{host}");
                let info: Result<InfoResponse> =
                    http.get_json(&format!("{url}/info"), probe_timeout).await;
                (url, info)
            }
        }))
        .buffer_unordered(self.config.probe_concurrency)
        .collect::<Vec<_>>()
        .await;

        let mut live = HashSet::new();
        {
            let mut state = self.state.write();
            for (url, info) in results {
                let info = match info {
                    Ok(i) => i,
                    Err(e) => {
                        debug!(%url, error = %e, "peer /info probe failed");
                        continue;
                    }
                };
                live.insert(url.clone());
                let (existing_buckets, existing_buckets_updated) = state
                    .peers
                    .get(&url)
                    .map(|p| (p.sync_buckets.clone(), p.buckets_last_updated))
                    .unwrap_or((None, None));
                state.peers.insert(
                    url.clone(),
                    Peer {
                        url: url.clone(),
                        height: Some(info.height),
                        blocks: Some(info.blocks),
                        last_seen: Some(Instant::now()),
                        sync_buckets: existing_buckets,
                        buckets_last_updated: existing_buckets_updated,
                    },
                );
            }

            for category in [PeerCategory::Chain, PeerCategory::GetChunk, PeerCategory::PostChunk] {
                let default_weight = Self::default_weight(category);
                let list = state.categories.get_mut(&category).unwrap();
                for url in &live {
                    if !list.iter().any(|p| &p.id == url) {
                        list.push(WeightedPeer {
                            id: url.clone(),
                            weight: default_weight,
                        });
                    }
                }
                // Evict peers absent from this refresh, preserving preferred urls.
                list.retain(|p| live.contains(&p.id) || self.preferred_get_chunk.contains(&p.id));
            }
            state.peers.retain(|url, _| live.contains(url) || self.preferred_get_chunk.contains(url));
        }

        Ok(())
    }

    /// Fetches `/sync_buckets` for every known peer and updates their
    /// `sync_buckets` set.
    pub async fn refresh_sync_buckets(&self) {
        let urls: Vec<String> = {
            let state = self.state.read();
            state.peers.keys().cloned().collect()
        };

        for url in urls {
            let body = self
                .http
                .get_bytes(&format!("{url}/sync_buckets"), Duration::from_secs(10))
                .await;
            let mut state = self.state.write();
            let Some(peer) = state.peers.get_mut(&url) else {
                continue;
            };
            match body.and_then(|b| {
                etf::parse_sync_buckets(&b)
                    .map_err(|e| crate::error::Error::PeerUnavailable(e.0))
            }) {
                Ok(parsed) => {
                    peer.sync_buckets = Some(parsed.buckets);
                    peer.buckets_last_updated = Some(Instant::now());
                }
                Err(e) => {
                    warn!(%url, error = %e, "sync_buckets probe failed; clearing");
                    peer.sync_buckets = None;
                }
            }
        }
    }

    /// Weighted-random selection with replacement from a category's list.
    pub fn select_peers(&self, category: PeerCategory, count: usize) -> Vec<String> {
        let snapshot: Vec<WeightedPeer> = {
            let state = self.state.read();
            state.categories.get(&category).cloned().unwrap_or_default()
        };
        Self::sample(&snapshot, count)
    }

    /// Selects peers whose sync buckets cover `absolute_offset`, falling
    /// back to plain `get-chunk` selection if none match.
    pub fn select_peers_for_offset(&self, absolute_offset: u64, count: usize) -> Vec<String> {
        let bucket = absolute_offset / SYNC_BUCKET_SIZE;
        let snapshot: Vec<WeightedPeer> = {
            let state = self.state.read();
            let list = state.categories.get(&PeerCategory::GetChunk).cloned().unwrap_or_default();
            list.into_iter()
                .filter(|p| {
                    state
                        .peers
                        .get(&p.id)
                        .and_then(|peer| peer.sync_buckets.as_ref())
                        .is_some_and(|buckets| buckets.contains(&bucket))
                })
                .collect()
        };
        if snapshot.is_empty() {
            return self.select_peers(PeerCategory::GetChunk, count);
        }
        Self::sample(&snapshot, count)
    }

    fn sample(list: &[WeightedPeer], count: usize) -> Vec<String> {
        if list.is_empty() {
            return Vec::new();
        }
        let total: i32 = list.iter().map(|p| p.weight).sum();
        if total <= 0 {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let mut pick = rng.gen_range(0..total);
                for p in list {
                    if pick < p.weight {
                        return p.id.clone();
                    }
                    pick -= p.weight;
                }
                list.last().unwrap().id.clone()
            })
            .collect()
    }

    pub fn report_success(&self, category: PeerCategory, url: &str) {
        self.adjust_weight(category, url, peer_consts::WEIGHT_DELTA);
    }

    pub fn report_failure(&self, category: PeerCategory, url: &str) {
        self.adjust_weight(category, url, -peer_consts::WEIGHT_DELTA);
    }

    fn adjust_weight(&self, category: PeerCategory, url: &str, delta: i32) {
        let mut state = self.state.write();
        let list = state.categories.entry(category).or_default();
        if let Some(entry) = list.iter_mut().find(|p| p.id == url) {
            entry.weight = (entry.weight + delta)
                .clamp(peer_consts::MIN_WEIGHT, peer_consts::MAX_WEIGHT);
            return;
        }
        // Feedback for an unknown peer is a no-op, except reportSuccess
        // against a brand-new preferred get-chunk URL.
        if delta > 0 && category == PeerCategory::GetChunk && self.preferred_get_chunk.contains(url)
        {
            list.push(WeightedPeer {
                id: url.to_string(),
                weight: peer_consts::PREFERRED_GET_CHUNK_WEIGHT,
            });
        }
    }

    pub fn start_auto_refresh(self: &Arc<Self>) {
        {
            let mut refresh_task = self.refresh_task.write();
            if refresh_task.is_none() {
                let this = self.clone();
                let interval = Duration::from_secs(self.config.refresh_interval_secs);
                *refresh_task = Some(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        ticker.tick().await;
                        if let Err(e) = this.refresh_peers().await {
                            warn!(error = %e, "peer refresh failed");
                        }
                    }
                }));
            }
        }
        {
            let mut bucket_task = self.bucket_task.write();
            if bucket_task.is_none() {
                let this = self.clone();
                let interval = Duration::from_secs(self.config.bucket_refresh_interval_secs);
                *bucket_task = Some(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        ticker.tick().await;
                        this.refresh_sync_buckets().await;
                    }
                }));
            }
        }
    }

    pub fn stop_auto_refresh(&self) {
        if let Some(handle) = self.refresh_task.write().take() {
            handle.abort();
        }
        if let Some(handle) = self.bucket_task.write().take() {
            handle.abort();
        }
    }
}

use futures::StreamExt;

#[derive(Debug, serde::Deserialize)]
struct InfoResponse {
    #[serde(default)]
    height: u64,
    #[serde(default)]
    blocks: u64,
}
