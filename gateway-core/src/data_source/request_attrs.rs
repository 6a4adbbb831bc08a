//! Request-attribute header propagation: spec.md §4.8, §6, §8 round-trip
//! laws.

use crate::types::RequestAttributes;
use std::net::IpAddr;

pub const HOPS: &str = "x-ar-io-hops";
pub const ORIGIN: &str = "x-ar-io-origin";
pub const ORIGIN_NODE_RELEASE: &str = "x-ar-io-origin-node-release";
pub const VIA: &str = "x-ar-io-via";
pub const ARNS_NAME: &str = "x-ar-io-arns-name";
pub const ARNS_BASENAME: &str = "x-ar-io-arns-basename";
pub const ARNS_RECORD: &str = "x-ar-io-arns-record";
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Parses the inbound `x-ar-io-*` headers into `RequestAttributes`.
/// Unrecognized/missing headers default to `RequestAttributes::default()`'s
/// fields. `via` entries are lowercased, per spec.md §8's round-trip law.
/// `client_ips` comes from `X-Forwarded-For`, nearest-proxy first.
pub fn parse_request_attrs(headers: &[(String, String)]) -> RequestAttributes {
    let find = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };

    RequestAttributes {
        origin: find(ORIGIN),
        hops: find(HOPS).and_then(|v| v.parse().ok()).unwrap_or(0),
        origin_node_release: find(ORIGIN_NODE_RELEASE),
        arns_name: find(ARNS_NAME),
        arns_basename: find(ARNS_BASENAME),
        arns_record: find(ARNS_RECORD),
        client_ips: parse_client_ips(find(FORWARDED_FOR).as_deref().unwrap_or("")),
        via: parse_via(find(VIA).as_deref().unwrap_or("")),
    }
}

/// Formats `RequestAttributes` into the outbound `x-ar-io-*` header set.
pub fn format_request_attrs(attrs: &RequestAttributes) -> Vec<(String, String)> {
    let mut headers = vec![(HOPS.to_string(), attrs.hops.to_string())];
    if let Some(origin) = &attrs.origin {
        headers.push((ORIGIN.to_string(), origin.clone()));
    }
    if let Some(release) = &attrs.origin_node_release {
        headers.push((ORIGIN_NODE_RELEASE.to_string(), release.clone()));
    }
    if let Some(name) = &attrs.arns_name {
        headers.push((ARNS_NAME.to_string(), name.clone()));
    }
    if let Some(basename) = &attrs.arns_basename {
        headers.push((ARNS_BASENAME.to_string(), basename.clone()));
    }
    if let Some(record) = &attrs.arns_record {
        headers.push((ARNS_RECORD.to_string(), record.clone()));
    }
    if !attrs.via.is_empty() {
        headers.push((VIA.to_string(), format_via(&attrs.via)));
    }
    headers
}

/// Parses a comma-separated `x-ar-io-via` header value, lowercasing and
/// trimming each entry, dropping empties.
pub fn parse_via(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn format_via(via: &[String]) -> String {
    via.join(", ")
}

/// True if any entry of `via` equals `candidate_id` (case-insensitively):
/// spec.md §4.8 loop detection / §8 "Loop safety".
pub fn is_in_via(via: &[String], candidate_id: &str) -> bool {
    let needle = candidate_id.to_lowercase();
    via.iter().any(|v| v == &needle)
}

/// Parses a comma-separated `X-Forwarded-For`-style client IP list.
pub fn parse_client_ips(value: &str) -> Vec<IpAddr> {
    value
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn via_round_trips_modulo_case() {
        let via = vec!["gw-a".to_string(), "gw-b".to_string()];
        let formatted = format_via(&via);
        assert_eq!(parse_via(&formatted), via);

        let mixed_case = "GW-A, Gw-B";
        assert_eq!(parse_via(mixed_case), via);
    }

    #[test]
    fn request_attrs_round_trip() {
        let attrs = RequestAttributes {
            origin: Some("example.com".to_string()),
            hops: 3,
            origin_node_release: Some("gw/1.2.3".to_string()),
            arns_name: Some("mysite".to_string()),
            arns_basename: Some("mysite".to_string()),
            arns_record: None,
            client_ips: Vec::new(),
            via: vec!["gw-a".to_string()],
        };
        let headers = format_request_attrs(&attrs);
        let parsed = parse_request_attrs(&headers);
        assert_eq!(parsed, attrs);
    }

    #[test]
    fn loop_detection_matches_regardless_of_case() {
        let via = parse_via("GW-A");
        assert!(is_in_via(&via, "gw-a"));
        assert!(!is_in_via(&via, "gw-b"));
    }

    #[test]
    fn client_ips_parsed_from_forwarded_for_header() {
        let headers = vec![(
            FORWARDED_FOR.to_string(),
            "203.0.113.5, 198.51.100.9".to_string(),
        )];
        let attrs = parse_request_attrs(&headers);
        assert_eq!(
            attrs.client_ips,
            vec!["203.0.113.5".parse::<IpAddr>().unwrap(), "198.51.100.9".parse().unwrap()]
        );
    }
}
