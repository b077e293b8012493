//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registration and forwarding produce:
//!     → logging.rs (structured events through an injected Logger)
//!     → call_log.rs (one line per forwarded call, per service file)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → per-run log directory (kept only with save_logs)
//!     → optional Prometheus endpoint
//! ```

pub mod call_log;
pub mod logging;
pub mod metrics;

pub use call_log::CallLog;
pub use logging::Logger;
