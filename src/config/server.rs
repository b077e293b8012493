//! Runtime server configuration.
//!
//! Unlike the file schema, this carries live handles: the log sink, a shared
//! multiplexer and the parent context. Unset fields are derived by
//! `ProxyServer::new`.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Dispatch;

use crate::config::schema::ServerSettings;
use crate::http::discriminator::WebSocketDetection;
use crate::http::websocket::WebSocketSettings;
use crate::routing::Multiplexer;

/// Options recognised by `ProxyServer::new`.
#[derive(Clone)]
pub struct ServerConfig {
    /// Path every destination prefix is mounted under.
    pub handle_base_path: String,
    /// Listen port; probed from the ephemeral range when `None`.
    pub listen_port: Option<u16>,
    /// Interface to bind.
    pub bind_address: String,
    /// Log sink; the process-wide default when `None`.
    pub logger: Option<Dispatch>,
    /// Dispatch table; a fresh one when `None`.
    pub multiplexer: Option<Arc<Multiplexer>>,
    /// Keep the call log directory after shutdown.
    pub save_logs: bool,
    /// Parent of the call log directory; the system temp dir when `None`.
    pub log_dir: Option<PathBuf>,
    pub websocket_detection: WebSocketDetection,
    pub websocket: WebSocketSettings,
    /// Parent context. Cancelling it stops the server and every in-flight forward.
    pub context: Option<CancellationToken>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            handle_base_path: settings.handle_base_path.clone(),
            listen_port: settings.listen_port,
            bind_address: settings.bind_address.clone(),
            logger: None,
            multiplexer: None,
            save_logs: settings.save_logs,
            log_dir: settings.log_dir.as_ref().map(PathBuf::from),
            websocket_detection: settings.websocket_detection,
            websocket: WebSocketSettings::default(),
            context: None,
        }
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    pub fn with_logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    pub fn with_multiplexer(mut self, multiplexer: Arc<Multiplexer>) -> Self {
        self.multiplexer = Some(multiplexer);
        self
    }

    pub fn with_context(mut self, context: CancellationToken) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_save_logs(mut self, save_logs: bool) -> Self {
        self.save_logs = save_logs;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_websocket_detection(mut self, detection: WebSocketDetection) -> Self {
        self.websocket_detection = detection;
        self
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("handle_base_path", &self.handle_base_path)
            .field("listen_port", &self.listen_port)
            .field("bind_address", &self.bind_address)
            .field("external_logger", &self.logger.is_some())
            .field("external_multiplexer", &self.multiplexer.is_some())
            .field("save_logs", &self.save_logs)
            .field("log_dir", &self.log_dir)
            .field("websocket_detection", &self.websocket_detection)
            .field("context", &self.context.is_some())
            .finish()
    }
}
