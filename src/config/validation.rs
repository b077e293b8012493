//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Unique, non-empty service names and non-zero ports
//! - Well-formed route prefixes and backend addresses
//! - No two routes mounted on the same destination
//!
//! Every problem is reported, not just the first.

use std::collections::HashMap;
use std::fmt;

use crate::config::schema::ProxyConfig;
use crate::registry::Service;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let base = &config.server.handle_base_path;
    if !base.starts_with('/') {
        errors.push(ValidationError::new("server.handle_base_path", "must begin with '/'"));
    }
    if config.server.listen_port == Some(0) {
        errors.push(ValidationError::new("server.listen_port", "must be non-zero"));
    }

    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut mounts: HashMap<String, String> = HashMap::new();

    for (i, service) in config.services.iter().enumerate() {
        let field = format!("services[{}]", i);

        if service.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if let Some(first) = names.insert(service.name.as_str(), i) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate of services[{}]", first),
            ));
        }

        if service.port == 0 {
            errors.push(ValidationError::new(format!("{}.port", field), "must be non-zero"));
        }

        let registry_entry = Service::from(service);
        if let Err(e) = registry_entry.http_url() {
            errors.push(ValidationError::new(format!("{}.address", field), e.to_string()));
        }

        for (j, route) in registry_entry.routes.iter().enumerate() {
            let route_field = format!("{}.routes[{}]", field, j);

            if let Err(e) = route.validate() {
                errors.push(ValidationError::new(route_field, e.to_string()));
                continue;
            }

            let mount = route.mount_point(base);
            if let Some(owner) = mounts.insert(mount.clone(), route_field.clone()) {
                errors.push(ValidationError::new(
                    format!("{}.destination", route_field),
                    format!("{} is already mounted by {}", mount, owner),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
