//! Error types for the proxy.
//!
//! # Taxonomy
//! - `ProxyError`: configuration and lifecycle failures. Returned to the caller
//!   of registration and server operations; never swallowed.
//! - `ForwardError`: per-request upstream and upgrade failures. Converted into
//!   a gateway-class response; the server keeps serving.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors raised while building the server or registering services.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The backend address of a service is not a usable URL.
    #[error("invalid backend address {address:?} for service {service}: {reason}")]
    InvalidBackend {
        service: String,
        address: String,
        reason: String,
    },

    /// A route prefix is not a valid URL path prefix.
    #[error("invalid {kind} prefix {prefix:?} in route {route}: {reason}")]
    InvalidPrefix {
        route: String,
        kind: &'static str,
        prefix: String,
        reason: &'static str,
    },

    /// The handle base path is not an absolute path.
    #[error("invalid handle base path {0:?}: must begin with '/'")]
    InvalidBasePath(String),

    /// Two routes claim the same dispatch key.
    #[error("route {route} of service {service} collides on {key}, already registered by {owner}")]
    RouteCollision {
        key: String,
        route: String,
        service: String,
        owner: String,
    },

    /// A service with the same name is already attached.
    #[error("service {0} is already registered")]
    DuplicateService(String),

    /// The named service is not attached to the server.
    #[error("service {0} is not registered")]
    UnknownService(String),

    /// The requested operation is not allowed in the server's current state.
    #[error("server is {0}")]
    InvalidState(crate::lifecycle::ServerState),

    /// No port in the probed range accepted a bind.
    #[error("no free port found in {start}..={end}")]
    NoFreePort { start: u16, end: u16 },

    /// The per-run call log directory could not be created.
    #[error("failed to create call log directory {path:?}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Binding or serving the listener failed.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for proxy setup and lifecycle operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors raised while forwarding a single request.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The backend could not be reached or failed mid-response.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The server context was cancelled while the request was in flight.
    #[error("context canceled")]
    Cancelled,

    /// The rewritten target could not be assembled into a URI.
    #[error("invalid upstream target {target:?}")]
    InvalidTarget { target: String },

    /// The WebSocket handshake with the backend failed.
    #[error("websocket handshake with {target} failed: {source}")]
    Handshake {
        target: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

impl ForwardError {
    /// Status code presented to the client for this failure.
    pub fn status(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let body = match &self {
            ForwardError::Cancelled => "context canceled".to_string(),
            ForwardError::Handshake { .. } => "WebSocket upgrade failed".to_string(),
            _ => "Bad Gateway".to_string(),
        };
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_maps_to_bad_gateway() {
        let response = ForwardError::Cancelled.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn collision_message_names_both_owners() {
        let err = ProxyError::RouteCollision {
            key: "/v1/api/".into(),
            route: "api-2".into(),
            service: "storage".into(),
            owner: "api".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("storage"));
        assert!(msg.contains("already registered by api"));
    }
}
