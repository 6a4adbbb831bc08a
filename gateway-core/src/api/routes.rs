//! Route table: spec.md §6 "Client HTTP surface".

use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use super::handlers;
use crate::gateway_core::GatewayCore;

/// `axum`'s `get` method router also answers `HEAD` for the same handler,
/// satisfying spec.md §6's "`HEAD` variants return the same headers with no
/// body" without a separate route.
pub fn routes(core: Arc<GatewayCore>) -> Router {
    Router::new()
        .route("/raw/{id}", get(handlers::serve_raw))
        .route("/{id}/{*subpath}", get(handlers::serve_subpath))
        .route("/{id}", get(handlers::serve_root))
        .with_state(core)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data_source::{DataSource, GetDataParams};
    use crate::error::Result;
    use crate::stream;
    use crate::types::ContiguousData;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use bytes::Bytes;

    /// Serves a fixed in-memory payload, honoring `region` the way a real
    /// source would, so range handling can be exercised without a network.
    struct FixedSource {
        payload: Vec<u8>,
    }

    #[async_trait]
    impl DataSource for FixedSource {
        async fn get_data(&self, params: GetDataParams) -> Result<ContiguousData> {
            let (bytes, size) = match params.region {
                Some(region) => {
                    let start = region.offset as usize;
                    let end = (region.offset + region.size) as usize;
                    (self.payload[start..end].to_vec(), region.size)
                }
                None => (self.payload.clone(), self.payload.len() as u64),
            };
            Ok(ContiguousData {
                stream: stream::once(Bytes::from(bytes)),
                size: Some(size),
                source_content_type: Some("application/octet-stream".to_string()),
                cached: false,
                trusted: true,
                verified: true,
                request_attributes: Some(params.request_attributes),
            })
        }
    }

    fn test_server(payload: Vec<u8>) -> TestServer {
        let mut core = GatewayCore::new(Config::default());
        core.data_source = std::sync::Arc::new(FixedSource { payload });
        TestServer::new(routes(std::sync::Arc::new(core))).unwrap()
    }

    #[tokio::test]
    async fn full_object_fetch_returns_whole_payload() {
        let payload = vec![7u8; 1024];
        let server = test_server(payload.clone());

        let response = server.get("/abc").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.header("x-cache"), "MISS");
        assert_eq!(response.as_bytes().to_vec(), payload);
    }

    #[tokio::test]
    async fn range_request_returns_exact_slice() {
        let payload: Vec<u8> = (0..1000u32).map(|b| (b % 256) as u8).collect();
        let server = test_server(payload.clone());

        let response = server.get("/abc").add_header(axum::http::header::RANGE, "bytes=300-399").await;
        assert_eq!(response.status_code(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.header("content-range"), "bytes 300-399/1000");
        assert_eq!(response.as_bytes().to_vec(), payload[300..400].to_vec());
    }

    #[tokio::test]
    async fn multi_range_is_rejected() {
        let server = test_server(vec![1u8; 100]);
        let response = server
            .get("/abc")
            .add_header(axum::http::header::RANGE, "bytes=0-10,20-30")
            .await;
        assert_eq!(response.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[tokio::test]
    async fn raw_route_sets_hardening_headers() {
        let server = test_server(vec![1u8; 16]);
        let response = server.get("/raw/abc").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.header("content-security-policy"), "default-src 'self'");
        assert_eq!(response.header("cross-origin-opener-policy"), "same-origin");
    }
}
