//! Path-prefix multiplexer.
//!
//! # Responsibilities
//! - Map dispatch keys (mount points) to handlers
//! - Resolve the handler for a request path
//! - Reject conflicting registrations
//!
//! # Matching Rules
//! - A key ending in `/` matches its whole subtree
//! - A key without a trailing `/` matches the exact path only
//! - Longest matching key wins
//! - `/x` with only `/x/` registered is redirected to `/x/`
//!
//! Reads take a lock-free snapshot of the table. Writers are serialized and
//! publish a new table atomically, so a batch of keys becomes visible at once.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

use crate::error::{ProxyError, ProxyResult};

/// Something that can answer a request dispatched by the multiplexer.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Response>;
}

/// Adapts an async closure into a `Handler`.
pub struct FnHandler<F>(pub F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Response> {
        Box::pin((self.0)(req))
    }
}

/// A handler waiting to be inserted under `key`.
pub struct Registration {
    pub key: String,
    pub owner: String,
    pub route: String,
    pub handler: Arc<dyn Handler>,
}

#[derive(Clone)]
struct Entry {
    owner: String,
    route: String,
    handler: Arc<dyn Handler>,
}

/// Outcome of resolving a path.
pub enum Lookup {
    Found { key: String, handler: Arc<dyn Handler> },
    Redirect(String),
    NotFound,
}

/// Dispatch table shared by every registered service.
pub struct Multiplexer {
    table: ArcSwap<BTreeMap<String, Entry>>,
    writer: Mutex<()>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(BTreeMap::new()),
            writer: Mutex::new(()),
        }
    }

    /// Register a single handler.
    pub fn handle(
        &self,
        key: impl Into<String>,
        owner: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> ProxyResult<()> {
        let key = key.into();
        let owner = owner.into();
        self.handle_all(vec![Registration {
            route: key.clone(),
            key,
            owner,
            handler,
        }])
    }

    /// Register a batch of handlers. Either every key is inserted or none is.
    pub fn handle_all(&self, batch: Vec<Registration>) -> ProxyResult<()> {
        self.swap_owners(&[], batch)
    }

    /// Drop every key owned by `retired` and insert `batch` in one step.
    ///
    /// Readers see either the old table or the new one. On error the table is
    /// left as it was.
    pub fn swap_owners(&self, retired: &[String], batch: Vec<Registration>) -> ProxyResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.table.load_full();
        let mut next: BTreeMap<String, Entry> = current
            .iter()
            .filter(|(_, entry)| !retired.contains(&entry.owner))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        for registration in batch {
            if let Some(existing) = next.get(&registration.key) {
                return Err(ProxyError::RouteCollision {
                    key: registration.key,
                    route: registration.route,
                    service: registration.owner,
                    owner: format!("{} (route {})", existing.owner, existing.route),
                });
            }
            next.insert(
                registration.key,
                Entry {
                    owner: registration.owner,
                    route: registration.route,
                    handler: registration.handler,
                },
            );
        }

        self.table.store(Arc::new(next));
        Ok(())
    }

    /// Remove every key registered by `owner`. Returns the number removed.
    pub fn remove_owner(&self, owner: &str) -> usize {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.table.load_full();
        let next: BTreeMap<String, Entry> = current
            .iter()
            .filter(|(_, entry)| entry.owner != owner)
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        let removed = current.len() - next.len();
        self.table.store(Arc::new(next));
        removed
    }

    /// Resolve the handler responsible for `path`.
    pub fn lookup(&self, path: &str) -> Lookup {
        let table = self.table.load();

        if let Some(entry) = table.get(path) {
            return Lookup::Found {
                key: path.to_string(),
                handler: entry.handler.clone(),
            };
        }

        if !path.ends_with('/') {
            let subtree = format!("{}/", path);
            if table.contains_key(&subtree) {
                return Lookup::Redirect(subtree);
            }
        }

        table
            .iter()
            .filter(|(key, _)| key.ends_with('/') && path.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(key, entry)| Lookup::Found {
                key: key.clone(),
                handler: entry.handler.clone(),
            })
            .unwrap_or(Lookup::NotFound)
    }

    /// Dispatch a request to its handler.
    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        match self.lookup(req.uri().path()) {
            Lookup::Found { handler, .. } => handler.handle(req).await,
            Lookup::Redirect(location) => {
                let location = match req.uri().query() {
                    Some(query) => format!("{}?{}", location, query),
                    None => location,
                };
                (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
            }
            Lookup::NotFound => {
                tracing::debug!(path = %req.uri().path(), "No route matched");
                (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
            }
        }
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.table.load().keys().cloned().collect()
    }

    /// Whether `owner` has at least one key registered.
    pub fn has_owner(&self, owner: &str) -> bool {
        self.table.load().values().any(|entry| entry.owner == owner)
    }

    /// Owner of `key`, if registered.
    pub fn owner_of(&self, key: &str) -> Option<String> {
        self.table.load().get(key).map(|entry| entry.owner.clone())
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer").field("keys", &self.keys()).finish()
    }
}

/// Axum fallback that routes every request through the multiplexer.
pub async fn dispatch(State(mux): State<Arc<Multiplexer>>, req: Request<Body>) -> Response {
    mux.dispatch(req).await
}
