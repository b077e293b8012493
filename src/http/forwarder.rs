//! Dual-protocol forwarder.
//!
//! # Responsibilities
//! - Classify each request (plain HTTP or WebSocket upgrade)
//! - Rewrite the path from the mount point to the backend prefix
//! - Forward plain HTTP through a pooled client to the service origin
//! - Hand WebSocket upgrades to the relay in `websocket.rs`
//! - Bind in-flight forwards to the server context, if one was given
//!
//! No retries and no timeouts of its own: a forward ends when the backend
//! answers, the connection fails, or the context is cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio_util::sync::CancellationToken;

use crate::error::{ForwardError, ProxyResult};
use crate::http::discriminator::{Protocol, WebSocketDetection};
use crate::http::request::{prepare_outbound, target_uri};
use crate::http::response;
use crate::http::websocket::WebSocketSettings;
use crate::observability::call_log::{CallLog, CallRecord};
use crate::observability::{metrics, Logger};
use crate::registry::Service;
use crate::routing::{Handler, Route};

/// Client used for plain HTTP forwarding.
pub type HttpClient = Client<HttpConnector, Body>;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Where a single route forwards to.
#[derive(Debug, Clone)]
pub struct ForwardTarget {
    pub service: String,
    pub route: Route,
    /// Dispatch key the route is mounted on.
    pub mount: String,
    /// Scheme and authority for HTTP, e.g. `http://localhost:4000`.
    pub http_origin: String,
    /// Scheme and authority for WebSocket, e.g. `ws://localhost:4000`.
    pub ws_origin: String,
}

impl ForwardTarget {
    pub fn for_route(service: &Service, route: &Route, base_path: &str) -> ProxyResult<Self> {
        route.validate()?;
        let ws_origin = service.websocket_url()?.origin().ascii_serialization();

        Ok(Self {
            service: service.name.clone(),
            route: route.clone(),
            mount: route.mount_point(base_path),
            http_origin: service.http_origin()?,
            ws_origin,
        })
    }

    /// Backend path for an inbound path.
    pub fn backend_path(&self, inbound: &str) -> String {
        self.route.rewrite(&self.mount, inbound)
    }
}

/// Settings shared by every forwarder of a server.
#[derive(Clone)]
pub struct ForwardOptions {
    pub detection: WebSocketDetection,
    pub websocket: WebSocketSettings,
    pub client: HttpClient,
    pub context: Option<CancellationToken>,
    pub call_log: Option<CallLog>,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            detection: WebSocketDetection::default(),
            websocket: WebSocketSettings::default(),
            client: http_client(),
            context: None,
            call_log: None,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) target: ForwardTarget,
    pub(crate) options: ForwardOptions,
    pub(crate) logger: Logger,
}

/// Handler bound to one route of one service.
#[derive(Clone)]
pub struct Forwarder {
    pub(crate) inner: Arc<Inner>,
}

impl Forwarder {
    pub fn new(target: ForwardTarget, options: ForwardOptions, logger: Logger) -> Self {
        Self {
            inner: Arc::new(Inner {
                target,
                options,
                logger,
            }),
        }
    }

    pub fn target(&self) -> &ForwardTarget {
        &self.inner.target
    }

    pub async fn forward(&self, req: Request<Body>) -> Response {
        match self.inner.options.detection.classify(req.headers()) {
            Protocol::WebSocket => self.forward_websocket(req).await,
            Protocol::Http => self.forward_http(req).await,
        }
    }

    async fn forward_http(&self, req: Request<Body>) -> Response {
        let start = Instant::now();
        let target = &self.inner.target;
        let (mut parts, body) = req.into_parts();
        let method = parts.method.to_string();
        let inbound_path = parts.uri.path().to_string();

        let path = target.backend_path(&inbound_path);
        let uri = match target_uri(&target.http_origin, &path, parts.uri.query()) {
            Ok(uri) => uri,
            Err(e) => return self.fail(e, &method, &inbound_path, &path, start).await,
        };
        let target_str = uri.to_string();

        tracing::debug!(
            service = %target.service,
            route = %target.route.name,
            method = %method,
            path = %inbound_path,
            target = %target_str,
            "Forwarding request"
        );

        prepare_outbound(&mut parts, uri);
        let outbound = Request::from_parts(parts, body);
        let request = self.inner.options.client.request(outbound);

        match bind_context(self.inner.options.context.as_ref(), async {
            request.await.map_err(ForwardError::from)
        })
        .await
        {
            Ok(upstream) => {
                let response = response::from_upstream(upstream, self.inner.options.context.as_ref());
                self.finish(&method, &inbound_path, &target_str, response.status().as_u16(), start)
                    .await;
                response
            }
            Err(e) => self.fail(e, &method, &inbound_path, &target_str, start).await,
        }
    }

    pub(crate) async fn fail(
        &self,
        error: ForwardError,
        method: &str,
        path: &str,
        target: &str,
        start: Instant,
    ) -> Response {
        self.inner.logger.error(&error, "Forwarding failed");
        self.finish(method, path, target, error.status().as_u16(), start)
            .await;
        error.into_response()
    }

    pub(crate) async fn finish(
        &self,
        method: &str,
        path: &str,
        target: &str,
        status: u16,
        start: Instant,
    ) {
        metrics::record_request(&self.inner.target.service, method, status, start);

        if let Some(call_log) = &self.inner.options.call_log {
            let call = CallRecord {
                method,
                path,
                target,
                status,
                elapsed: start.elapsed(),
            };
            call_log.record(&self.inner.target.service, &call).await;
        }
    }
}

impl Handler for Forwarder {
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Response> {
        let this = self.clone();
        Box::pin(async move { this.forward(req).await })
    }
}

/// Run `fut` unless `context` is cancelled first.
pub(crate) async fn bind_context<T, F>(
    context: Option<&CancellationToken>,
    fut: F,
) -> Result<T, ForwardError>
where
    F: Future<Output = Result<T, ForwardError>>,
{
    match context {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ForwardError::Cancelled),
                result = fut => result,
            }
        }
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn echo_path_backend() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]).to_string();
                    let line = head.lines().next().unwrap_or_default().to_string();
                    let body = line.split(' ').nth(1).unwrap_or_default().to_string();
                    let reply = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        port
    }

    fn forwarder(port: u16, route: Route, options: ForwardOptions) -> Forwarder {
        let service = Service::new("api", "http://127.0.0.1", port).with_route(route.clone());
        let target = ForwardTarget::for_route(&service, &route, "/").unwrap();
        Forwarder::new(target, options, Logger::current("api"))
    }

    #[test]
    fn target_derives_both_origins() {
        let service = Service::new("api", "http://localhost", 4000);
        let route = Route::new("api", "/", "/v1/api/");
        let target = ForwardTarget::for_route(&service, &route, "/").unwrap();

        assert_eq!(target.http_origin, "http://localhost:4000");
        assert_eq!(target.ws_origin, "ws://localhost:4000");
        assert_eq!(target.backend_path("/v1/api/graphql"), "/graphql");
    }

    #[tokio::test]
    async fn plain_request_reaches_rewritten_path() {
        let port = echo_path_backend().await;
        let fwd = forwarder(port, Route::new("api", "/", "/v1/api/"), ForwardOptions::default());

        let req = Request::builder()
            .uri("/v1/api/health?deep=1")
            .body(Body::empty())
            .unwrap();
        let response = fwd.forward(req).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"/health?deep=1");
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fwd = forwarder(port, Route::new("api", "/", "/v1/api/"), ForwardOptions::default());
        let req = Request::builder().uri("/v1/api/x").body(Body::empty()).unwrap();

        assert_eq!(fwd.forward(req).await.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), ForwardError> =
            bind_context(Some(&token), std::future::pending()).await;
        assert!(matches!(result, Err(ForwardError::Cancelled)));
    }
}
