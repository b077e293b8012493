//! Backend service definition.
//!
//! # Responsibilities
//! - Own the service's routes
//! - Derive the HTTP and WebSocket base URLs of the backend
//! - Carry the logger handed over by the server

use url::Url;

use crate::error::{ProxyError, ProxyResult};
use crate::observability::Logger;
use crate::routing::route::{join_path, Route};

/// A backend process reachable on a local port.
#[derive(Debug, Clone)]
pub struct Service {
    /// Service identifier; also the log component and call log file name.
    pub name: String,
    /// Backend address, with or without scheme (e.g. `http://localhost`).
    pub address: String,
    /// Backend port.
    pub port: u16,
    /// Routes exposed through the proxy.
    pub routes: Vec<Route>,
    logger: Option<Logger>,
}

impl Service {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            routes: Vec::new(),
            logger: None,
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Hand the service its logger.
    pub fn bind_logger(&mut self, logger: Logger) {
        self.logger = Some(logger);
    }

    /// The bound logger, or one on the current dispatcher.
    pub fn logger(&self) -> Logger {
        self.logger
            .clone()
            .unwrap_or_else(|| Logger::current(self.name.clone()))
    }

    /// Base URL for plain HTTP forwarding.
    ///
    /// A missing scheme defaults to `http`; a missing port is filled from `port`.
    pub fn http_url(&self) -> ProxyResult<Url> {
        let raw = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        };

        let mut url = Url::parse(&raw).map_err(|e| self.invalid(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(self.invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(self.invalid("missing host".to_string()));
        }
        if url.port().is_none() && self.port != 0 {
            url.set_port(Some(self.port))
                .map_err(|_| self.invalid("cannot carry a port".to_string()))?;
        }

        Ok(url)
    }

    /// Scheme and authority of the backend, e.g. `http://localhost:4000`.
    pub fn http_origin(&self) -> ProxyResult<String> {
        Ok(self.http_url()?.origin().ascii_serialization())
    }

    /// Base URL for WebSocket passthrough: `ws://localhost:<port>`.
    pub fn websocket_url(&self) -> ProxyResult<Url> {
        Url::parse(&format!("ws://localhost:{}", self.port))
            .map_err(|e| self.invalid(e.to_string()))
    }

    /// Backend address a route forwards to, used in registration logs.
    pub fn source_address(&self, route: &Route) -> ProxyResult<String> {
        let origin = self.http_origin()?;
        if route.is_root_source() {
            Ok(origin)
        } else {
            Ok(join_path(&origin, &route.source))
        }
    }

    fn invalid(&self, reason: String) -> ProxyError {
        ProxyError::InvalidBackend {
            service: self.name.clone(),
            address: self.address.clone(),
            reason,
        }
    }
}
