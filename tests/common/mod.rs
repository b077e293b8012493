//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dev_proxy::{ProxyError, ProxyServer, ServerConfig, ServerState, Service};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Header the echo backend uses to report the X-Forwarded-For it received.
pub const SEEN_FORWARDED_FOR: &str = "x-seen-forwarded-for";

/// Header the echo backend uses to report the Host it received.
pub const SEEN_HOST: &str = "x-seen-host";

async fn bind_loopback() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn header_value<'a>(head: &'a str, name: &str) -> &'a str {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
        .unwrap_or("")
}

/// Start a backend that answers every request with its request target as
/// the body. Returns the backend port.
pub async fn start_echo_backend() -> u16 {
    let (listener, port) = bind_loopback().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();

                let target = head
                    .lines()
                    .next()
                    .and_then(|line| line.split(' ').nth(1))
                    .unwrap_or_default()
                    .to_string();

                let response = format!(
                    "HTTP/1.1 200 OK\r\n{}: {}\r\n{}: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    SEEN_FORWARDED_FOR,
                    header_value(&head, "x-forwarded-for"),
                    SEEN_HOST,
                    header_value(&head, "host"),
                    target.len(),
                    target
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    port
}

/// Start a backend that waits `delay` before answering.
pub async fn start_slow_backend(delay: Duration) -> u16 {
    let (listener, port) = bind_loopback().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let response = "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nslow";
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    port
}

/// Start a backend that sends its headers and part of the body, then stalls.
pub async fn start_stalling_backend() -> u16 {
    let (listener, port) = bind_loopback().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial";
                let _ = socket.write_all(response.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    port
}

/// Start a backend that answers `418` with `"{method} {target}\n{body}"`.
pub async fn start_recording_backend() -> u16 {
    let (listener, port) = bind_loopback().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut buf = vec![0u8; 8192];
                let head_end = loop {
                    if let Some(pos) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => received.extend_from_slice(&buf[..n]),
                    }
                };

                let head = String::from_utf8_lossy(&received[..head_end]).to_string();
                let length: usize = header_value(&head, "content-length").parse().unwrap_or(0);
                while received.len() < head_end + length {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => received.extend_from_slice(&buf[..n]),
                    }
                }

                let mut request_line = head.lines().next().unwrap_or_default().split(' ');
                let method = request_line.next().unwrap_or_default();
                let target = request_line.next().unwrap_or_default();
                let body = String::from_utf8_lossy(&received[head_end..head_end + length]);
                let reply = format!("{method} {target}\n{body}");

                let response = format!(
                    "HTTP/1.1 418 I'm a teapot\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    reply.len(),
                    reply
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    port
}

/// A port nothing is listening on.
pub async fn closed_port() -> u16 {
    let (listener, port) = bind_loopback().await;
    drop(listener);
    port
}

/// Start a WebSocket backend that selects the first offered subprotocol,
/// sends the request path as its first message, then echoes every frame.
pub async fn start_websocket_backend() -> u16 {
    let (listener, port) = bind_loopback().await;

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut path = String::new();
                let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                    path = request.uri().to_string();
                    let offered = request
                        .headers()
                        .get("sec-websocket-protocol")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.split(',').next())
                        .map(|v| v.trim().to_string());
                    if let Some(protocol) = offered {
                        response
                            .headers_mut()
                            .insert("sec-websocket-protocol", protocol.parse().unwrap());
                    }
                    Ok(response)
                };

                let Ok(mut stream) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };
                if stream.send(Message::Text(path.into())).await.is_err() {
                    return;
                }
                while let Some(Ok(message)) = stream.next().await {
                    if message.is_close() {
                        break;
                    }
                    if stream.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    port
}

/// A proxy running on a loopback port.
pub struct TestProxy {
    pub server: Arc<ProxyServer>,
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<(), ProxyError>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the serve task to finish.
    pub async fn stop(self) -> Result<(), ProxyError> {
        self.server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// Start a proxy serving `services` with `config` on an ephemeral loopback port.
pub async fn start_proxy(config: ServerConfig, services: Vec<Service>) -> TestProxy {
    let (listener, port) = bind_loopback().await;
    let server = Arc::new(ProxyServer::new(config.with_listen_port(port)).unwrap());

    for service in services {
        server.add_service(service).unwrap();
    }
    server.issue_all().unwrap();

    let runner = server.clone();
    let handle = tokio::spawn(async move { runner.run(listener).await });
    server.wait_for_state(ServerState::Serving).await;

    TestProxy {
        server,
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        handle,
    }
}

/// HTTP client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
