//! Route definitions and path rewriting.
//!
//! # Responsibilities
//! - Hold one `source → destination` prefix mapping
//! - Validate both prefixes before registration
//! - Compute the mount point (dispatch key) under the handle base path
//! - Rewrite an inbound path from the external prefix to the backend prefix

use axum::http::uri::PathAndQuery;

use crate::error::{ProxyError, ProxyResult};

/// A mapping from an externally exposed path prefix to a backend path prefix.
///
/// Routes are immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Route identifier for logging.
    pub name: String,
    /// Path prefix on the backend.
    pub source: String,
    /// Path prefix exposed by the proxy.
    pub destination: String,
    /// Whether the route is listed in the startup endpoint summary.
    pub visible: bool,
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            visible: false,
        }
    }

    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Check that both prefixes are valid URL path prefixes.
    pub fn validate(&self) -> ProxyResult<()> {
        validate_prefix(&self.name, "source", &self.source)?;
        validate_prefix(&self.name, "destination", &self.destination)
    }

    /// Dispatch key for this route under `base`.
    pub fn mount_point(&self, base: &str) -> String {
        if base == "/" || base.is_empty() {
            return self.destination.clone();
        }
        join_path(base, &self.destination)
    }

    /// Rewrite `path` (served under `mount`) into the backend path.
    ///
    /// The mount prefix is replaced by the source prefix; the remainder is kept.
    pub fn rewrite(&self, mount: &str, path: &str) -> String {
        match path.strip_prefix(mount) {
            Some("") => self.source.clone(),
            Some(rest) => join_path(&self.source, rest),
            None => path.replacen(&self.destination, &self.source, 1),
        }
    }

    /// True when the backend prefix is the backend root.
    pub fn is_root_source(&self) -> bool {
        self.source == "/"
    }
}

/// Join two path segments with exactly one slash between them.
pub fn join_path(a: &str, b: &str) -> String {
    if b.is_empty() {
        return a.to_string();
    }
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}

fn validate_prefix(route: &str, kind: &'static str, prefix: &str) -> ProxyResult<()> {
    let invalid = |reason: &'static str| ProxyError::InvalidPrefix {
        route: route.to_string(),
        kind,
        prefix: prefix.to_string(),
        reason,
    };

    if !prefix.starts_with('/') {
        return Err(invalid("must begin with '/'"));
    }
    if prefix.contains(['?', '#']) {
        return Err(invalid("must not carry a query or fragment"));
    }
    prefix
        .parse::<PathAndQuery>()
        .map_err(|_| invalid("not a valid URL path"))?;
    Ok(())
}
