//! Local development reverse proxy.
//!
//! Fronts a set of locally running backend services on a single port. Each
//! service declares routes mapping a public path prefix to a backend path
//! prefix; requests are dispatched by longest prefix, rewritten, and forwarded
//! as plain HTTP or as a relayed WebSocket session.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod registry;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{ProxyConfig, ServerConfig};
pub use error::{ForwardError, ProxyError, ProxyResult};
pub use http::ProxyServer;
pub use lifecycle::{ServerState, Shutdown};
pub use registry::Service;
pub use routing::{Multiplexer, Route};
