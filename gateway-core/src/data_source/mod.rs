//! DataSource composition layer: spec.md §4.3-§4.6.

pub mod gateway;
pub mod request_attrs;
pub mod sequential;
pub mod tx_chunks;
pub mod cache;

use crate::error::Result;
use crate::types::{DataAttributes, RequestAttributes};
use async_trait::async_trait;

/// A byte region request: `None` means the whole object.
#[derive(Debug, Clone, Copy)]
pub struct RegionRequest {
    pub offset: u64,
    pub size: u64,
}

pub struct GetDataParams {
    pub id: String,
    pub region: Option<RegionRequest>,
    pub request_attributes: RequestAttributes,
    pub data_attributes: DataAttributes,
}

/// Capability interface shared by every composable source in the pipeline:
/// spec.md §2, §9 "Dynamic dispatch across data sources".
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn get_data(&self, params: GetDataParams) -> Result<crate::types::ContiguousData>;
}

pub use cache::ReadThroughDataCache;
pub use gateway::GatewayDataSource;
pub use sequential::SequentialDataSource;
pub use tx_chunks::TxChunksDataSource;
