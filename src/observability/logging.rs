//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide subscriber for the binary
//! - Provide `Logger`, a component-scoped handle onto a chosen dispatcher
//!
//! A `Logger` carries its own `tracing::Dispatch`, so a server built with an
//! external subscriber keeps writing to that sink regardless of the global
//! default. Every line it emits is tagged with `component`.

use std::fmt;

use tracing::Dispatch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "dev_proxy=info,tower_http=info";

/// Install the global subscriber. `verbose` lowers the default level to debug.
pub fn init(verbose: bool) {
    let fallback = if verbose {
        "dev_proxy=debug,tower_http=debug"
    } else {
        DEFAULT_FILTER
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// A leveled logger bound to a dispatcher and a component name.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    component: String,
}

impl Logger {
    pub fn new(dispatch: Dispatch, component: impl Into<String>) -> Self {
        Self {
            dispatch,
            component: component.into(),
        }
    }

    /// Logger on whatever dispatcher is current for the calling thread.
    pub fn current(component: impl Into<String>) -> Self {
        Self::new(tracing::dispatcher::get_default(Dispatch::clone), component)
    }

    /// Same sink, different component tag.
    pub fn scoped(&self, component: impl Into<String>) -> Self {
        Self::new(self.dispatch.clone(), component)
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn debug(&self, value: impl fmt::Display, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::debug!(component = %self.component, value = %value, "{}", message)
        });
    }

    pub fn info(&self, value: impl fmt::Display, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(component = %self.component, value = %value, "{}", message)
        });
    }

    pub fn warn(&self, value: impl fmt::Display, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::warn!(component = %self.component, value = %value, "{}", message)
        });
    }

    pub fn error(&self, value: impl fmt::Display, message: &str) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::error!(component = %self.component, value = %value, "{}", message)
        });
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}
