//! HTTP surface for the gateway: spec.md §6.

pub mod handlers;
pub mod routes;

use crate::gateway_core::GatewayCore;
use crate::log;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, Method},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Builds the axum application: CORS, body-limit, and per-request tracing
/// layered over the route table.
pub fn create_app(core: Arc<GatewayCore>) -> Router {
    let router = routes::routes(core);

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(false);

    router
        .layer(cors)
        .layer(log::create_http_trace_layer::<Body>())
        .layer(DefaultBodyLimit::max(200 * 1024 * 1024))
}
