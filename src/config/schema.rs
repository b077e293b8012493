//! Configuration schema definitions.
//!
//! This module defines the configuration file structure for the proxy.
//! All types derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};

use crate::http::discriminator::WebSocketDetection;
use crate::registry::Service;
use crate::routing::Route;

/// Root configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener and server behaviour.
    pub server: ServerSettings,

    /// Backend services and their routes.
    pub services: Vec<ServiceConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Services as registry entries, in file order.
    pub fn to_services(&self) -> Vec<Service> {
        self.services.iter().map(Service::from).collect()
    }
}

/// Server settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen port. Probed from the ephemeral range when absent.
    pub listen_port: Option<u16>,

    /// Interface to bind.
    pub bind_address: String,

    /// Path every route's destination prefix is mounted under.
    pub handle_base_path: String,

    /// Keep the per-run call log directory after shutdown.
    pub save_logs: bool,

    /// Parent for the per-run call log directory. System temp dir when absent.
    pub log_dir: Option<String>,

    /// How WebSocket upgrades are recognised.
    pub websocket_detection: WebSocketDetection,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_port: None,
            bind_address: "0.0.0.0".to_string(),
            handle_base_path: "/".to_string(),
            save_logs: false,
            log_dir: None,
            websocket_detection: WebSocketDetection::default(),
        }
    }
}

/// A backend service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Unique service name.
    pub name: String,

    /// Backend address (e.g., "http://localhost").
    #[serde(default = "default_address")]
    pub address: String,

    /// Backend port.
    pub port: u16,

    /// Routes exposed for this service.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

fn default_address() -> String {
    "http://localhost".to_string()
}

/// A route of a service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Path prefix on the backend.
    #[serde(default = "default_source")]
    pub source: String,

    /// Path prefix exposed by the proxy.
    pub destination: String,

    /// List the route in the startup summary.
    #[serde(default)]
    pub visible: bool,
}

fn default_source() -> String {
    "/".to_string()
}

impl From<&RouteConfig> for Route {
    fn from(config: &RouteConfig) -> Self {
        Route::new(&config.name, &config.source, &config.destination)
            .with_visibility(config.visible)
    }
}

impl From<&ServiceConfig> for Service {
    fn from(config: &ServiceConfig) -> Self {
        config
            .routes
            .iter()
            .fold(Service::new(&config.name, &config.address, config.port), |service, route| {
                service.with_route(Route::from(route))
            })
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Prometheus scrape endpoint. Disabled when absent.
    pub metrics_address: Option<String>,
}
