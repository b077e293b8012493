//! Protocol discrimination.
//!
//! Classifies a request as a WebSocket upgrade or plain HTTP by looking at
//! headers only. The body is never touched.
//!
//! The default mode keys on `Sec-WebSocket-Protocol`, which misses clients
//! that upgrade without naming a subprotocol. `UpgradeHeader` checks the
//! standard `Connection: upgrade` + `Upgrade: websocket` pair instead.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

/// Which protocol a request is forwarded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    WebSocket,
}

/// How WebSocket upgrades are recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebSocketDetection {
    /// A `Sec-WebSocket-Protocol` header is present.
    #[default]
    ProtocolHeader,
    /// `Connection` lists `upgrade` and `Upgrade` names `websocket`.
    UpgradeHeader,
    /// Either of the above.
    Either,
}

impl WebSocketDetection {
    pub fn classify(self, headers: &HeaderMap) -> Protocol {
        let websocket = match self {
            WebSocketDetection::ProtocolHeader => has_protocol_header(headers),
            WebSocketDetection::UpgradeHeader => is_upgrade_request(headers),
            WebSocketDetection::Either => {
                has_protocol_header(headers) || is_upgrade_request(headers)
            }
        };

        if websocket {
            Protocol::WebSocket
        } else {
            Protocol::Http
        }
    }
}

/// `HeaderMap` lookups are case-insensitive on the name.
fn has_protocol_header(headers: &HeaderMap) -> bool {
    headers.contains_key(header::SEC_WEBSOCKET_PROTOCOL)
}

fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    connection_upgrade && upgrade_websocket
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn protocol_header_any_case() {
        let mode = WebSocketDetection::ProtocolHeader;
        let lower = headers(&[("sec-websocket-protocol", "graphql-ws")]);
        let mut upper = HeaderMap::new();
        upper.insert(
            axum::http::HeaderName::from_bytes(b"SEC-WEBSOCKET-PROTOCOL").unwrap(),
            HeaderValue::from_static("graphql-ws"),
        );

        assert_eq!(mode.classify(&lower), Protocol::WebSocket);
        assert_eq!(mode.classify(&upper), Protocol::WebSocket);
    }

    #[test]
    fn plain_request_is_http() {
        let plain = headers(&[("accept", "application/json")]);
        for mode in [
            WebSocketDetection::ProtocolHeader,
            WebSocketDetection::UpgradeHeader,
            WebSocketDetection::Either,
        ] {
            assert_eq!(mode.classify(&plain), Protocol::Http);
        }
    }

    #[test]
    fn default_mode_ignores_bare_upgrade() {
        let upgrade = headers(&[("connection", "keep-alive, Upgrade"), ("upgrade", "websocket")]);

        assert_eq!(WebSocketDetection::ProtocolHeader.classify(&upgrade), Protocol::Http);
        assert_eq!(WebSocketDetection::UpgradeHeader.classify(&upgrade), Protocol::WebSocket);
        assert_eq!(WebSocketDetection::Either.classify(&upgrade), Protocol::WebSocket);
    }

    #[test]
    fn upgrade_mode_needs_both_headers() {
        let only_upgrade = headers(&[("upgrade", "websocket")]);
        let protocol_only = headers(&[("sec-websocket-protocol", "graphql-ws")]);

        assert_eq!(WebSocketDetection::UpgradeHeader.classify(&only_upgrade), Protocol::Http);
        assert_eq!(WebSocketDetection::UpgradeHeader.classify(&protocol_only), Protocol::Http);
        assert_eq!(WebSocketDetection::Either.classify(&protocol_only), Protocol::WebSocket);
    }
}
