//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Validate the client's upgrade request
//! - Complete the handshake with the backend first, forwarding the
//!   requested subprotocols and end-to-end headers
//! - Upgrade the client with the subprotocol the backend selected
//! - Bidirectional frame forwarding until either side closes
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! Every origin is accepted. This is only acceptable for a proxy that is
//! reachable from the local machine; do not expose it to a network.
//!
//! Frames are relayed uncompressed; permessage-deflate is not negotiated.

use std::time::Instant;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{header, HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as UpstreamRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{
    CloseFrame as UpstreamCloseFrame, WebSocketConfig,
};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ForwardError;
use crate::http::forwarder::{bind_context, Forwarder};
use crate::http::request::strip_hop_by_hop;
use crate::observability::metrics;

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frame buffer sizing for both legs of a relayed session.
///
/// There is no compression setting. Neither axum nor tungstenite implement
/// permessage-deflate, so a client's `Sec-WebSocket-Extensions` offer is
/// dropped from the backend handshake and frames are relayed uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketSettings {
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub max_message_size: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            read_buffer_size: 64 * 1024,
            write_buffer_size: 64 * 1024,
            max_message_size: 64 << 20,
        }
    }
}

impl WebSocketSettings {
    fn upstream_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .read_buffer_size(self.read_buffer_size)
            .write_buffer_size(self.write_buffer_size)
            .max_message_size(Some(self.max_message_size))
    }
}

/// Headers owned by the handshake itself; the backend leg sets its own.
const HANDSHAKE_HEADERS: [header::HeaderName; 5] = [
    header::HOST,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
    header::CONTENT_LENGTH,
];

/// Build the backend handshake request carrying the client's headers.
pub fn upstream_request(
    target: &str,
    inbound: &HeaderMap,
) -> Result<UpstreamRequest, tokio_tungstenite::tungstenite::Error> {
    let mut request = target.into_client_request()?;

    let mut forwarded = inbound.clone();
    strip_hop_by_hop(&mut forwarded);
    for name in HANDSHAKE_HEADERS {
        forwarded.remove(name);
    }

    let headers = request.headers_mut();
    for (name, value) in forwarded.iter() {
        headers.append(name.clone(), value.clone());
    }
    Ok(request)
}

impl Forwarder {
    pub(crate) async fn forward_websocket(&self, req: Request<Body>) -> Response {
        let start = Instant::now();
        let target = &self.inner.target;
        let settings = self.inner.options.websocket;
        let (mut parts, _body) = req.into_parts();
        let inbound_path = parts.uri.path().to_string();

        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                self.inner
                    .logger
                    .warn(&inbound_path, "Request is not a valid WebSocket upgrade");
                return rejection.into_response();
            }
        };

        let path = target.backend_path(&inbound_path);
        let url = match parts.uri.query() {
            Some(query) => format!("{}{}?{}", target.ws_origin, path, query),
            None => format!("{}{}", target.ws_origin, path),
        };

        let request = match upstream_request(&url, &parts.headers) {
            Ok(request) => request,
            Err(source) => {
                let error = ForwardError::Handshake { target: url.clone(), source };
                return self.fail(error, "GET", &inbound_path, &url, start).await;
            }
        };

        let connect = tokio_tungstenite::connect_async_with_config(
            request,
            Some(settings.upstream_config()),
            false,
        );
        let handshake = bind_context(self.inner.options.context.as_ref(), async {
            connect.await.map_err(|source| ForwardError::Handshake {
                target: url.clone(),
                source,
            })
        })
        .await;

        let (upstream, upstream_response) = match handshake {
            Ok(pair) => pair,
            Err(e) => return self.fail(e, "GET", &inbound_path, &url, start).await,
        };

        let selected = upstream_response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        tracing::debug!(
            service = %target.service,
            path = %inbound_path,
            target = %url,
            protocol = ?selected,
            "Upgrading WebSocket connection"
        );

        metrics::record_websocket_session(&target.service);
        self.finish("GET", &inbound_path, &url, 101, start).await;

        let mut upgrade = upgrade
            .read_buffer_size(settings.read_buffer_size)
            .write_buffer_size(settings.write_buffer_size)
            .max_message_size(settings.max_message_size);
        if let Some(protocol) = selected {
            upgrade = upgrade.protocols([protocol]);
        }

        let failure_logger = self.inner.logger.clone();
        let this = self.clone();
        upgrade
            .on_failed_upgrade(move |e| failure_logger.warn(e, "Client WebSocket upgrade failed"))
            .on_upgrade(move |socket| async move { this.relay(socket, upstream).await })
    }

    async fn relay(self, client: WebSocket, upstream: Upstream) {
        let (mut client_tx, mut client_rx) = client.split();
        let (mut upstream_tx, mut upstream_rx) = upstream.split();
        let service = self.inner.target.service.clone();

        let client_to_upstream = async {
            while let Some(message) = client_rx.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::debug!(service = %service, error = %e, "Client WebSocket read failed");
                        break;
                    }
                };
                let closing = matches!(message, Message::Close(_));
                if upstream_tx.send(into_upstream(message)).await.is_err() || closing {
                    break;
                }
            }
        };

        let upstream_to_client = async {
            while let Some(message) = upstream_rx.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::debug!(service = %service, error = %e, "Backend WebSocket read failed");
                        break;
                    }
                };
                let Some(message) = into_client(message) else {
                    continue;
                };
                let closing = matches!(message, Message::Close(_));
                if client_tx.send(message).await.is_err() || closing {
                    break;
                }
            }
        };

        let sessions = async {
            tokio::select! {
                _ = client_to_upstream => {}
                _ = upstream_to_client => {}
            }
        };

        match &self.inner.options.context {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!(service = %service, "WebSocket relay cancelled");
                    }
                    _ = sessions => {}
                }
            }
            None => sessions.await,
        }

        self.inner.logger.debug(&service, "WebSocket relay closed");
    }
}

fn into_upstream(message: Message) -> UpstreamMessage {
    match message {
        Message::Text(text) => UpstreamMessage::Text(text.as_str().into()),
        Message::Binary(data) => UpstreamMessage::Binary(data),
        Message::Ping(data) => UpstreamMessage::Ping(data),
        Message::Pong(data) => UpstreamMessage::Pong(data),
        Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().into(),
        })),
    }
}

fn into_client(message: UpstreamMessage) -> Option<Message> {
    let message = match message {
        UpstreamMessage::Text(text) => Message::Text(text.as_str().into()),
        UpstreamMessage::Binary(data) => Message::Binary(data),
        UpstreamMessage::Ping(data) => Message::Ping(data),
        UpstreamMessage::Pong(data) => Message::Pong(data),
        UpstreamMessage::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        })),
        UpstreamMessage::Frame(_) => return None,
    };
    Some(message)
}
