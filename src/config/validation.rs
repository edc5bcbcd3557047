#![allow(clippy::collapsible_if)]

use std::net::SocketAddr;

use http::Method;

use crate::config::models::{GatewayConfig, MongoDbConfig, RouteDefinition};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Rules applied to route definitions entering a store.
pub struct RouteValidator;

impl RouteValidator {
    /// Fields the admin API insists on before a route is persisted:
    /// `path`, `upstream` and a non-empty `methods` list.
    pub fn check_required_fields(route: &RouteDefinition) -> ValidationResult<()> {
        if route.path.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "path".to_string(),
            });
        }
        if route.upstream.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "upstream".to_string(),
            });
        }
        if route.methods.is_empty() {
            return Err(ValidationError::MissingField {
                field: "methods".to_string(),
            });
        }
        Ok(())
    }

    /// Full structural validation of a single route, collecting every problem.
    pub fn validate(route: &RouteDefinition) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let path = &route.path;

        if path.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "path".to_string(),
            });
        } else if !path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("route path: {path}"),
                message: "Route paths must start with '/'".to_string(),
            });
        }

        if let Err(e) = Self::validate_upstream(&route.upstream, path) {
            errors.push(e);
        }

        // Prefix routes accept any method, so only exact routes need a method list.
        if !route.is_prefix() && route.methods.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("route '{path}' methods"),
            });
        }
        for method in &route.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}' methods"),
                    message: format!("'{method}' is not a valid HTTP method"),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_upstream(upstream: &str, path: &str) -> ValidationResult<()> {
        let field = format!("route '{path}' upstream");
        if upstream.is_empty() {
            return Err(ValidationError::MissingField { field });
        }
        match url::Url::parse(upstream) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
            Ok(_) => Err(ValidationError::InvalidField {
                field,
                message: "Upstream must be an absolute http:// or https:// URL with a host"
                    .to_string(),
            }),
            Err(e) => Err(ValidationError::InvalidField {
                field,
                message: e.to_string(),
            }),
        }
    }
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, routes included.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Self::settings_errors(config);
        errors.extend(Self::route_errors(config));
        Self::into_result(errors)
    }

    /// Validate only the process-level settings.
    ///
    /// Route problems are left to the table builder, which skips or degrades
    /// the offending routes instead of refusing to start.
    pub fn validate_settings(config: &GatewayConfig) -> ValidationResult<()> {
        Self::into_result(Self::settings_errors(config))
    }

    /// Problems found in the static `routes:` section.
    pub fn route_errors(config: &GatewayConfig) -> Vec<ValidationError> {
        config
            .routes
            .iter()
            .filter_map(|route| RouteValidator::validate(route).err())
            .flatten()
            .collect()
    }

    fn settings_errors(config: &GatewayConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(e) = config.upstream_timeout() {
            errors.push(ValidationError::InvalidField {
                field: "upstream_timeout".to_string(),
                message: e.to_string(),
            });
        }

        if let Some(mongo) = &config.persistence.mongodb {
            errors.extend(Self::validate_mongodb(mongo));
        }

        if let Some(key) = &config.admin.api_key {
            if key.trim().is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: "admin.api_key".to_string(),
                    message: "API key must not be blank when set".to_string(),
                });
            }
        }

        errors
    }

    fn into_result(errors: Vec<ValidationError>) -> ValidationResult<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_mongodb(mongo: &MongoDbConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !(mongo.uri.starts_with("mongodb://") || mongo.uri.starts_with("mongodb+srv://")) {
            errors.push(ValidationError::InvalidField {
                field: "persistence.mongodb.uri".to_string(),
                message: "Must start with mongodb:// or mongodb+srv://".to_string(),
            });
        }
        if let Err(e) = mongo.timeout() {
            errors.push(ValidationError::InvalidField {
                field: "persistence.mongodb.timeout".to_string(),
                message: e.to_string(),
            });
        }
        if mongo.username.is_some() != mongo.password.is_some() {
            tracing::warn!("MongoDB username and password must both be set; credentials ignored");
        }
        errors
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("  {}. {}", i + 1, e))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
