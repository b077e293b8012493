//! Proxy server.
//!
//! # Responsibilities
//! - Derive defaults for unset configuration (port, multiplexer, logger)
//! - Own the service registry and hand each service its logger
//! - Compile every route of every service into multiplexer entries
//! - Serve the multiplexer through Axum until shutdown
//! - Remove the per-run call log directory on shutdown unless told to keep it
//!
//! The registry and dispatch table are written by one caller at a time
//! (setup, reload) and read concurrently by request handlers.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::Dispatch;

use crate::config::ServerConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::http::forwarder::{http_client, ForwardOptions, ForwardTarget, Forwarder};
use crate::lifecycle::{ServerState, Shutdown};
use crate::net::{listener, port};
use crate::observability::{CallLog, Logger};
use crate::registry::Service;
use crate::routing::mux::{self, Multiplexer, Registration};

/// A reverse proxy fronting a set of local services on one port.
pub struct ProxyServer {
    config: ServerConfig,
    listen_port: u16,
    logger: Logger,
    mux: Arc<Multiplexer>,
    services: RwLock<Vec<Service>>,
    forward: ForwardOptions,
    call_log: CallLog,
    shutdown: Shutdown,
    state: watch::Sender<ServerState>,
}

impl ProxyServer {
    /// Build a server, filling in every unset option.
    pub fn new(config: ServerConfig) -> ProxyResult<Self> {
        if !config.handle_base_path.starts_with('/') {
            return Err(ProxyError::InvalidBasePath(config.handle_base_path));
        }

        let listen_port = match config.listen_port {
            Some(port) => port,
            None => port::find_free_port(port::EPHEMERAL_PORTS)?,
        };

        let dispatch = config
            .logger
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));
        let logger = Logger::new(dispatch, "proxy");

        let mux = config.multiplexer.clone().unwrap_or_default();
        let call_log = CallLog::create(config.log_dir.as_deref())?;

        let shutdown = match &config.context {
            Some(parent) => Shutdown::child_of(parent),
            None => Shutdown::new(),
        };
        shutdown.on_shutdown(cleanup_hook(call_log.clone(), config.save_logs, logger.clone()));

        let forward = ForwardOptions {
            detection: config.websocket_detection,
            websocket: config.websocket,
            client: http_client(),
            context: config.context.clone(),
            call_log: Some(call_log.clone()),
        };

        let (state, _) = watch::channel(ServerState::Constructed);

        logger.debug(
            format!("port={} logs={}", listen_port, call_log.dir().display()),
            "Server constructed",
        );

        Ok(Self {
            config,
            listen_port,
            logger,
            mux,
            services: RwLock::new(Vec::new()),
            forward,
            call_log,
            shutdown,
            state,
        })
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.mux
    }

    /// Directory holding this run's call logs.
    pub fn log_dir(&self) -> &Path {
        self.call_log.dir()
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Wait until the server has reached `target` or a later state.
    pub async fn wait_for_state(&self, target: ServerState) -> ServerState {
        let mut rx = self.state.subscribe();
        let reached = rx.wait_for(|state| *state >= target).await.map(|state| *state);
        reached.unwrap_or(ServerState::Stopped)
    }

    /// Names of attached services, in registration order.
    pub fn service_names(&self) -> Vec<String> {
        self.read_services().iter().map(|s| s.name.clone()).collect()
    }

    /// Attach a service. Its routes are not served until issued.
    pub fn add_service(&self, service: Service) -> ProxyResult<()> {
        let mut services = self.write_services();
        self.attach(&mut services, service)
    }

    /// Detach a service and withdraw every route it registered.
    pub fn remove_service(&self, name: &str) -> ProxyResult<Service> {
        let mut services = self.write_services();
        let index = services
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ProxyError::UnknownService(name.to_string()))?;

        let service = services.remove(index);
        let removed = self.mux.remove_owner(name);
        self.logger.debug(format!("{} ({} routes)", name, removed), "Service removed");
        Ok(service)
    }

    /// Register every route of `service` on the multiplexer.
    ///
    /// All routes are validated and compiled before any is inserted; on error
    /// none of this service's routes are served.
    pub fn register_service(&self, service: &Service) -> ProxyResult<()> {
        let (batch, mappings) = self.compile(service)?;
        self.mux.handle_all(batch)?;
        log_mappings(service, mappings);
        Ok(())
    }

    /// Register the routes of every attached service, stopping at the first error.
    ///
    /// Services that already own routes in the multiplexer are skipped, so
    /// calling this again after `add_service` only issues the new ones.
    pub fn issue_all(&self) -> ProxyResult<()> {
        let services = self.read_services().clone();
        for service in services.iter().filter(|s| !self.mux.has_owner(&s.name)) {
            self.register_service(service)?;
        }
        Ok(())
    }

    /// Replace the whole service set and issue the new routes.
    ///
    /// The swap is all-or-nothing: on error the previous services and their
    /// routes stay in place.
    pub fn reload(&self, services: Vec<Service>) -> ProxyResult<()> {
        let mut registry = self.write_services();

        let mut next = Vec::with_capacity(services.len());
        for service in services {
            self.attach(&mut next, service)?;
        }

        let mut batch = Vec::new();
        let mut logged = Vec::with_capacity(next.len());
        for service in &next {
            let (registrations, mappings) = self.compile(service)?;
            batch.extend(registrations);
            logged.push(mappings);
        }

        let retired: Vec<String> = registry.iter().map(|s| s.name.clone()).collect();
        self.mux.swap_owners(&retired, batch)?;
        *registry = next;

        for (service, mappings) in registry.iter().zip(logged) {
            log_mappings(service, mappings);
        }
        let names: Vec<&str> = registry.iter().map(|s| s.name.as_str()).collect();
        self.logger.info(names.join(","), "Services reloaded");
        Ok(())
    }

    /// External URLs of every visible route.
    pub fn endpoints(&self) -> Vec<String> {
        let base = &self.config.handle_base_path;
        self.read_services()
            .iter()
            .flat_map(|service| service.routes.iter())
            .filter(|route| route.visible)
            .map(|route| format!("http://localhost:{}{}", self.listen_port, route.mount_point(base)))
            .collect()
    }

    /// Axum router dispatching every request through the multiplexer.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(mux::dispatch)
            .with_state(self.mux.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and port, then serve.
    pub async fn serve(&self) -> ProxyResult<()> {
        let listener = listener::bind(&self.config.bind_address, self.listen_port).await?;
        self.run(listener).await
    }

    /// Serve on `listener` until shutdown is triggered or the parent context
    /// is cancelled, then run the shutdown hooks.
    pub async fn run(&self, listener: TcpListener) -> ProxyResult<()> {
        let started = self.state.send_if_modified(|state| {
            if *state == ServerState::Constructed {
                *state = ServerState::Serving;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ProxyError::InvalidState(self.state()));
        }

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy server starting");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(self.shutdown.signalled())
            .await;

        self.enter_shutting_down();
        self.complete_shutdown();

        tracing::info!(address = %addr, "Proxy server stopped");
        result.map_err(ProxyError::from)
    }

    /// Stop accepting connections and clean up.
    ///
    /// A server that never served is stopped immediately; a serving one stops
    /// once its listener has drained.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
        if self.enter_shutting_down() == Some(ServerState::Constructed) {
            self.complete_shutdown();
        }
    }

    fn enter_shutting_down(&self) -> Option<ServerState> {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if state.can_transition_to(ServerState::ShuttingDown) {
                previous = Some(*state);
                *state = ServerState::ShuttingDown;
                true
            } else {
                false
            }
        });
        previous
    }

    fn complete_shutdown(&self) {
        let hooks = self.shutdown.run_hooks();
        let stopped = self.state.send_if_modified(|state| {
            if *state == ServerState::ShuttingDown {
                *state = ServerState::Stopped;
                true
            } else {
                false
            }
        });
        if stopped {
            self.logger.debug(hooks, "Shutdown hooks complete");
        }
    }

    /// Build the multiplexer entries for every route of `service`, along with
    /// the `source --> mount` lines logged once they are registered.
    fn compile(&self, service: &Service) -> ProxyResult<(Vec<Registration>, Vec<String>)> {
        let logger = service.logger();
        let mut batch = Vec::with_capacity(service.routes.len());
        let mut mappings = Vec::with_capacity(service.routes.len());

        for route in &service.routes {
            let target = ForwardTarget::for_route(service, route, &self.config.handle_base_path)?;
            mappings.push(format!("{} --> {}", service.source_address(route)?, target.mount));

            batch.push(Registration {
                key: target.mount.clone(),
                owner: service.name.clone(),
                route: route.name.clone(),
                handler: Arc::new(Forwarder::new(target, self.forward.clone(), logger.clone())),
            });
        }
        Ok((batch, mappings))
    }

    fn attach(&self, registry: &mut Vec<Service>, mut service: Service) -> ProxyResult<()> {
        if registry.iter().any(|s| s.name == service.name) {
            return Err(ProxyError::DuplicateService(service.name));
        }
        service.bind_logger(self.logger.scoped(service.name.clone()));
        self.logger.debug(&service.name, "Service attached");
        registry.push(service);
        Ok(())
    }

    fn read_services(&self) -> RwLockReadGuard<'_, Vec<Service>> {
        self.services.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_services(&self) -> RwLockWriteGuard<'_, Vec<Service>> {
        self.services.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn log_mappings(service: &Service, mappings: Vec<String>) {
    let logger = service.logger();
    for mapping in mappings {
        logger.debug(mapping, "Route registered");
    }
}

/// Remove the call log directory unless the run asked to keep it.
fn cleanup_hook(call_log: CallLog, save_logs: bool, logger: Logger) -> impl FnOnce() + Send + 'static {
    move || {
        let dir = call_log.dir().display().to_string();
        if save_logs {
            logger.info(dir, "Keeping call logs");
        } else if let Err(e) = call_log.remove() {
            logger.warn(format!("{}: {}", dir, e), "Failed to remove call log directory");
        } else {
            logger.debug(dir, "Removed call log directory");
        }
    }
}
