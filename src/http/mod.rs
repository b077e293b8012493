//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, multiplexer fallback)
//!     → routing::mux (longest prefix match)
//!     → forwarder.rs (one per route)
//!         → discriminator.rs (plain HTTP or WebSocket upgrade?)
//!         → request.rs (rewrite path, strip hop-by-hop, X-Forwarded-For)
//!         → backend via hyper client  |  websocket.rs (handshake + relay)
//!     → response.rs (strip hop-by-hop, stream body back)
//!     → Send to client
//! ```

pub mod discriminator;
pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use discriminator::{Protocol, WebSocketDetection};
pub use forwarder::{ForwardOptions, ForwardTarget, Forwarder};
pub use server::ProxyServer;
pub use websocket::WebSocketSettings;
