//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyServer::new    → Constructed (call log dir created, cleanup hook registered)
//! ProxyServer::run    → Serving (listener accepting)
//! shutdown() or parent context cancelled
//!                     → ShuttingDown (stop accepting, drain, run hooks once)
//!                     → Stopped
//! ```

pub mod shutdown;
pub mod state;

pub use shutdown::Shutdown;
pub use state::ServerState;
