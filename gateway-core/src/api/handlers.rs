//! Shared HTTP handler logic: spec.md §6.

use crate::constants::cache_control;
use crate::data_source::{request_attrs, GetDataParams, RegionRequest};
use crate::error::{Error, Result};
use crate::gateway_core::GatewayCore;
use crate::types::{ContiguousData, DataAttributes, RequestAttributes};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// A parsed `Range` header. Only the forms the core commits to supporting;
/// everything else (suffix ranges, multi-range) is rejected upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeSpec {
    Closed(u64, u64),
    OpenStart(u64),
}

fn parse_range_header(headers: &HeaderMap) -> Result<Option<RangeSpec>> {
    let Some(value) = headers.get(header::RANGE) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| Error::MalformedRange)?;
    let value = value.strip_prefix("bytes=").ok_or(Error::MalformedRange)?;

    // Multi-range requests are syntactically valid but explicitly out of
    // scope: spec.md §6 says these return 416.
    if value.contains(',') {
        return Err(Error::RangeUnsatisfiable);
    }

    let mut parts = value.splitn(2, '-');
    let start_str = parts.next().unwrap_or("");
    let end_str = parts.next().ok_or(Error::MalformedRange)?;

    // A suffix range (`bytes=-N`) has an empty start; not supported.
    if start_str.is_empty() {
        return Err(Error::MalformedRange);
    }
    let start: u64 = start_str.parse().map_err(|_| Error::MalformedRange)?;

    if end_str.is_empty() {
        return Ok(Some(RangeSpec::OpenStart(start)));
    }
    let end: u64 = end_str.parse().map_err(|_| Error::MalformedRange)?;
    if end < start {
        return Err(Error::MalformedRange);
    }
    Ok(Some(RangeSpec::Closed(start, end)))
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

async fn fetch(
    core: &GatewayCore,
    id: &str,
    region: Option<RegionRequest>,
    attrs: RequestAttributes,
) -> Result<ContiguousData> {
    core.data_source
        .get_data(GetDataParams {
            id: id.to_string(),
            region,
            request_attributes: attrs,
            data_attributes: DataAttributes::default(),
        })
        .await
}

/// Learns the object's total size without consuming its body, so a Range
/// request can compute an exact `Content-Range` denominator.
async fn probe_size(core: &GatewayCore, id: &str, attrs: RequestAttributes) -> Result<u64> {
    let data = fetch(core, id, None, attrs).await?;
    data.size.ok_or(Error::RangeUnsatisfiable)
}

async fn resolve_manifest(
    core: &GatewayCore,
    id: &str,
    subpath: &str,
    attrs: &RequestAttributes,
) -> Result<String> {
    let from_index = core.manifest_resolver.resolve_from_index(id, subpath).await?;
    if from_index.complete {
        return from_index.resolved_id.ok_or(Error::NotFound);
    }

    let data = fetch(core, id, None, attrs.clone()).await?;
    let resolved = core
        .manifest_resolver
        .resolve_from_data(data.stream, id, subpath)
        .await?;
    resolved.resolved_id.ok_or(Error::NotFound)
}

/// Core handler logic shared by the three routes: loop/hop checks, optional
/// manifest resolution, range handling, and response assembly.
async fn serve(
    core: &GatewayCore,
    id: String,
    subpath: Option<String>,
    headers: HeaderMap,
    raw: bool,
) -> Result<Response> {
    let attrs = request_attrs::parse_request_attrs(&header_pairs(&headers));
    if attrs.has_visited(&core.config.gateway_id) || attrs.hops >= core.config.max_hops {
        return Err(Error::NotFound);
    }

    let resolved_id = match subpath.filter(|p| !p.is_empty()) {
        Some(subpath) => resolve_manifest(core, &id, &subpath, &attrs).await?,
        None => id,
    };

    let range = parse_range_header(&headers)?;

    let (data, status, content_range) = match range {
        None => {
            let data = fetch(core, &resolved_id, None, attrs.clone()).await?;
            (data, StatusCode::OK, None)
        }
        Some(spec) => {
            let total = probe_size(core, &resolved_id, attrs.clone()).await?;
            let (start, end) = match spec {
                RangeSpec::Closed(s, e) => (s, e.min(total.saturating_sub(1))),
                RangeSpec::OpenStart(s) => (s, total.saturating_sub(1)),
            };
            if start >= total {
                return Err(Error::RangeUnsatisfiable);
            }
            let size = end - start + 1;
            let data = fetch(
                core,
                &resolved_id,
                Some(RegionRequest { offset: start, size }),
                attrs.clone(),
            )
            .await?;
            (
                data,
                StatusCode::PARTIAL_CONTENT,
                Some(format!("bytes {start}-{end}/{total}")),
            )
        }
    };

    Ok(build_response(data, status, content_range, raw))
}

fn build_response(data: ContiguousData, status: StatusCode, content_range: Option<String>, raw: bool) -> Response {
    let content_type = data
        .source_content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(
            "x-cache",
            if data.cached { "HIT" } else { "MISS" },
        )
        .header(
            header::CACHE_CONTROL,
            if data.cached {
                format!("public, max-age={}, immutable", cache_control::STABLE_MAX_AGE)
            } else {
                format!("public, max-age={}", cache_control::UNSTABLE_MAX_AGE)
            },
        );

    if let Some(size) = data.size {
        builder = builder.header(header::CONTENT_LENGTH, size);
    }
    if let Some(content_range) = content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }
    if let Some(attrs) = &data.request_attributes {
        for (name, value) in request_attrs::format_request_attrs(attrs) {
            builder = builder.header(name, value);
        }
    }
    if raw {
        builder = builder
            .header("content-security-policy", "default-src 'self'")
            .header("cross-origin-opener-policy", "same-origin")
            .header("cross-origin-embedder-policy", "require-corp");
    }

    builder
        .body(Body::from_stream(data.stream))
        .expect("response builder invariants upheld above")
}

/// Converts a core `Error` into a response, adding the not-found
/// `Cache-Control` spec.md §6 requires beyond what [`Error::into_response`]
/// sets generically.
fn error_response(err: Error) -> Response {
    let mut response = err.into_response();
    if response.status() == StatusCode::NOT_FOUND {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            format!("public, max-age={}, immutable", cache_control::NOT_FOUND_MAX_AGE)
                .parse()
                .expect("valid header value"),
        );
    }
    response
}

pub async fn serve_raw(
    State(core): State<Arc<GatewayCore>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match serve(&core, id, None, headers, true).await {
        Ok(response) => response,
        Err(err) => error_response(err),
    }
}

pub async fn serve_root(
    State(core): State<Arc<GatewayCore>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match serve(&core, id, None, headers, false).await {
        Ok(response) => response,
        Err(err) => error_response(err),
    }
}

pub async fn serve_subpath(
    State(core): State<Arc<GatewayCore>>,
    Path((id, subpath)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    match serve(&core, id, Some(subpath), headers, false).await {
        Ok(response) => response,
        Err(err) => error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_header(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, value.parse().unwrap());
        headers
    }

    #[test]
    fn parses_closed_range() {
        let spec = parse_range_header(&range_header("bytes=10-20")).unwrap().unwrap();
        assert_eq!(spec, RangeSpec::Closed(10, 20));
    }

    #[test]
    fn parses_open_start_range() {
        let spec = parse_range_header(&range_header("bytes=100-")).unwrap().unwrap();
        assert_eq!(spec, RangeSpec::OpenStart(100));
    }

    #[test]
    fn rejects_suffix_range() {
        let result = parse_range_header(&range_header("bytes=-500"));
        assert!(matches!(result, Err(Error::MalformedRange)));
    }

    #[test]
    fn rejects_multi_range_as_unsatisfiable() {
        let result = parse_range_header(&range_header("bytes=0-10,20-30"));
        assert!(matches!(result, Err(Error::RangeUnsatisfiable)));
    }

    #[test]
    fn rejects_inverted_range() {
        let result = parse_range_header(&range_header("bytes=50-10"));
        assert!(matches!(result, Err(Error::MalformedRange)));
    }

    #[test]
    fn no_range_header_is_none() {
        let result = parse_range_header(&HeaderMap::new()).unwrap();
        assert!(result.is_none());
    }
}
