//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → server.rs (ServerConfig with live handles) + registry Services
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → new ProxyConfig sent to the binary
//!     → ProxyServer::reload swaps the service set
//! ```

pub mod loader;
pub mod schema;
pub mod server;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{ProxyConfig, RouteConfig, ServerSettings, ServiceConfig};
pub use server::ServerConfig;
