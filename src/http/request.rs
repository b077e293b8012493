//! Outbound request preparation.
//!
//! # Responsibilities
//! - Build the backend URI from origin, rewritten path and query
//! - Strip hop-by-hop headers
//! - Append the client address to `X-Forwarded-For`
//!
//! Method, end-to-end headers (including `Host`) and body pass through as-is.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Uri, Version};

use crate::error::ForwardError;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that apply to a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append `client` to any existing `X-Forwarded-For` chain.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let chain = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client)
    };

    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Peer address recorded by the server, when served with connect info.
pub fn client_ip(parts: &Parts) -> Option<IpAddr> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// `origin` + `path` + `?query`.
pub fn target_uri(origin: &str, path: &str, query: Option<&str>) -> Result<Uri, ForwardError> {
    let target = match query {
        Some(q) => format!("{}{}?{}", origin, path, q),
        None => format!("{}{}", origin, path),
    };
    target
        .parse::<Uri>()
        .map_err(|_| ForwardError::InvalidTarget { target })
}

/// Turn inbound request parts into the parts sent to the backend.
pub fn prepare_outbound(parts: &mut Parts, target: Uri) {
    let client = client_ip(parts);

    parts.uri = target;
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    if let Some(ip) = client {
        append_forwarded_for(&mut parts.headers, ip);
    }
}
