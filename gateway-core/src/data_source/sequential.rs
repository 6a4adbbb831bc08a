//! SequentialDataSource: spec.md §4.5.

use super::{DataSource, GetDataParams};
use crate::error::{Error, Result};
use crate::types::ContiguousData;
use async_trait::async_trait;
use std::sync::Arc;

/// Tries each child source in order. `NotFound` moves to the next source;
/// `PermanentError` (and anything else besides `NotFound`) propagates
/// immediately.
pub struct SequentialDataSource {
    sources: Vec<Arc<dyn DataSource>>,
}

impl SequentialDataSource {
    pub fn new(sources: Vec<Arc<dyn DataSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl DataSource for SequentialDataSource {
    async fn get_data(&self, params: GetDataParams) -> Result<ContiguousData> {
        for source in &self.sources {
            let cloned = GetDataParams {
                id: params.id.clone(),
                region: params.region,
                request_attributes: params.request_attributes.clone(),
                data_attributes: params.data_attributes.clone(),
            };
            match source.get_data(cloned).await {
                Ok(data) => return Ok(data),
                Err(Error::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataAttributes, RequestAttributes};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysNotFound(Arc<AtomicUsize>);

    #[async_trait]
    impl DataSource for AlwaysNotFound {
        async fn get_data(&self, _params: GetDataParams) -> Result<ContiguousData> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::NotFound)
        }
    }

    struct AlwaysPermanentError;

    #[async_trait]
    impl DataSource for AlwaysPermanentError {
        async fn get_data(&self, _params: GetDataParams) -> Result<ContiguousData> {
            Err(Error::PermanentError("blocked mid-stream".to_string()))
        }
    }

    struct Succeeds;

    #[async_trait]
    impl DataSource for Succeeds {
        async fn get_data(&self, _params: GetDataParams) -> Result<ContiguousData> {
            Ok(ContiguousData {
                stream: crate::stream::empty(),
                size: Some(0),
                source_content_type: None,
                cached: false,
                trusted: true,
                verified: true,
                request_attributes: None,
            })
        }
    }

    fn params() -> GetDataParams {
        GetDataParams {
            id: "abc".to_string(),
            region: None,
            request_attributes: RequestAttributes::default(),
            data_attributes: DataAttributes::default(),
        }
    }

    #[tokio::test]
    async fn tries_next_source_on_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seq = SequentialDataSource::new(vec![
            Arc::new(AlwaysNotFound(calls.clone())),
            Arc::new(Succeeds),
        ]);
        assert!(seq.get_data(params()).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_error_short_circuits() {
        let seq = SequentialDataSource::new(vec![
            Arc::new(AlwaysPermanentError),
            Arc::new(Succeeds),
        ]);
        let result = seq.get_data(params()).await;
        assert!(matches!(result, Err(Error::PermanentError(_))));
    }

    #[tokio::test]
    async fn all_not_found_surfaces_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seq = SequentialDataSource::new(vec![Arc::new(AlwaysNotFound(calls))]);
        let result = seq.get_data(params()).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }
}
