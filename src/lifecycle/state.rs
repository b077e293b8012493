//! Server state machine.
//!
//! ```text
//! Constructed → Serving → ShuttingDown → Stopped
//!      └──────────────────────↑
//! ```
//! A server shut down before it ever served skips `Serving`.

use std::fmt;

/// Lifecycle state of a proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Constructed,
    Serving,
    ShuttingDown,
    Stopped,
}

impl ServerState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ServerState) -> bool {
        matches!(
            (self, next),
            (ServerState::Constructed, ServerState::Serving)
                | (ServerState::Constructed, ServerState::ShuttingDown)
                | (ServerState::Serving, ServerState::ShuttingDown)
                | (ServerState::ShuttingDown, ServerState::Stopped)
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Constructed => "constructed",
            ServerState::Serving => "serving",
            ServerState::ShuttingDown => "shutting-down",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
