use crate::constants;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// This node's own identifier, appended to `x-ar-io-via` on outbound
    /// requests and checked against inbound `via` lists for loop detection.
    #[serde(default = "default_gateway_id")]
    pub gateway_id: String,
    pub trusted_node: TrustedNodeConfig,
    pub peers: PeerManagerConfig,
    #[serde(default)]
    pub gateways: Vec<String>,
    pub data_store: DataStoreConfig,
    #[serde(default = "default_origin_release")]
    pub origin_release: String,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedNodeConfig {
    pub url: String,
    #[serde(default = "default_max_rps")]
    pub max_rps: f64,
    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerManagerConfig {
    #[serde(default)]
    pub preferred_get_chunk_urls: Vec<String>,
    /// Hosts discovered via `/peers` that are never added to the pool, e.g.
    /// known-bad or operator-blocked peers.
    #[serde(default)]
    pub ignore_urls: Vec<String>,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_bucket_refresh_interval_secs")]
    pub bucket_refresh_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum DataStoreConfig {
    Memory,
    Filesystem { path: PathBuf },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
    #[default]
    Auto,
}

impl LogFormat {
    /// Resolves `Auto` by checking whether stdout is a TTY.
    pub fn resolve(self) -> LogFormat {
        match self {
            LogFormat::Auto => {
                if atty_stdout() {
                    LogFormat::Text
                } else {
                    LogFormat::Json
                }
            }
            other => other,
        }
    }
}

/// Minimal TTY check: avoids pulling in an `atty`/`is-terminal` dependency the
/// teacher doesn't already carry.
fn atty_stdout() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_gateway_id() -> String {
    "localhost".to_string()
}

fn default_origin_release() -> String {
    "ar-io-gateway-core/0.1.0".to_string()
}

fn default_max_hops() -> u32 {
    constants::request_attrs::DEFAULT_MAX_HOPS
}

fn default_max_rps() -> f64 {
    constants::trusted_node::DEFAULT_MAX_RPS
}

fn default_burst_multiplier() -> f64 {
    constants::trusted_node::DEFAULT_BURST_MULTIPLIER
}

fn default_max_in_flight() -> usize {
    constants::trusted_node::DEFAULT_MAX_IN_FLIGHT
}

fn default_refresh_interval_secs() -> u64 {
    constants::peers::DEFAULT_REFRESH_INTERVAL.as_secs()
}

fn default_bucket_refresh_interval_secs() -> u64 {
    constants::peers::DEFAULT_BUCKET_REFRESH_INTERVAL.as_secs()
}

fn default_probe_timeout_secs() -> u64 {
    constants::peers::DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_probe_concurrency() -> usize {
    constants::peers::DEFAULT_PROBE_CONCURRENCY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: constants::server::DEFAULT_HOST.to_string(),
            port: constants::server::DEFAULT_PORT,
            gateway_id: default_gateway_id(),
            trusted_node: TrustedNodeConfig {
                url: "https://arweave.net".to_string(),
                max_rps: default_max_rps(),
                burst_multiplier: default_burst_multiplier(),
                max_in_flight: default_max_in_flight(),
            },
            peers: PeerManagerConfig {
                preferred_get_chunk_urls: Vec::new(),
                ignore_urls: Vec::new(),
                refresh_interval_secs: default_refresh_interval_secs(),
                bucket_refresh_interval_secs: default_bucket_refresh_interval_secs(),
                probe_timeout_secs: default_probe_timeout_secs(),
                probe_concurrency: default_probe_concurrency(),
            },
            gateways: Vec::new(),
            data_store: DataStoreConfig::Memory,
            origin_release: default_origin_release(),
            max_hops: default_max_hops(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }
}
