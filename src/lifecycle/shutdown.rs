//! Shutdown coordination for the proxy.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

type Hook = Box<dyn FnOnce() + Send>;

/// Coordinator for graceful shutdown.
///
/// Holds the signal that stops the listener and the hooks to run once the
/// server has stopped accepting. When created under a parent context,
/// cancelling the parent triggers shutdown too.
pub struct Shutdown {
    token: CancellationToken,
    hooks: Mutex<Vec<Hook>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Coordinator that also fires when `parent` is cancelled.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self::with_token(parent.child_token())
    }

    fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Future that resolves once shutdown has been triggered.
    pub fn signalled(&self) -> tokio_util::sync::WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a hook to run during shutdown.
    pub fn on_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
        self.lock_hooks().push(Box::new(hook));
    }

    /// Run every registered hook. Hooks run at most once.
    pub fn run_hooks(&self) -> usize {
        let hooks: Vec<Hook> = std::mem::take(&mut *self.lock_hooks());
        let count = hooks.len();
        for hook in hooks {
            hook();
        }
        count
    }

    fn lock_hooks(&self) -> std::sync::MutexGuard<'_, Vec<Hook>> {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
