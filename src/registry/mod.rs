//! Service registry.
//!
//! A `Service` is one backend process fronted by the proxy: a name, an
//! address and port, and the routes it exposes. Services are attached to a
//! server, which owns them for its lifetime.

pub mod service;

pub use service::Service;
