//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (setup or reload):
//!     Service.routes
//!     → route.rs (validate prefixes, compute mount point)
//!     → mux.rs (insert handler per mount point, reject collisions)
//!
//! Request time:
//!     request path
//!     → mux.rs (longest matching mount point)
//!     → handler (dual-protocol forwarder)
//! ```
//!
//! # Design Decisions
//! - Mount points are unique per server; a duplicate fails registration
//! - A service's routes are inserted together or not at all
//! - Dispatch reads never block on registration

pub mod mux;
pub mod route;

pub use mux::{FnHandler, Handler, Lookup, Multiplexer, Registration};
pub use route::Route;
