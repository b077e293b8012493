//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig.listen_port (or port.rs probe)
//!     → listener.rs (bind)
//!     → HTTP layer (axum serve)
//! ```

pub mod listener;
pub mod port;
