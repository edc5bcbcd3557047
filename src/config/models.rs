//! Configuration data structures for Switchyard.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. They are
//! serde‑friendly and include defaults so that minimal configs remain concise.
//! [`RouteDefinition`] doubles as the wire format of the admin API and the
//! document shape persisted by route stores.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Marker that turns a route path into a prefix route.
pub const WILDCARD_MARKER: char = '*';

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_upstream_timeout() -> String {
    "30s".to_string()
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Address the gateway listens on (e.g. "0.0.0.0:8080")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upper bound for a single proxied request, humantime format
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: String,
    /// Re-read routes from the config file when it changes (in-memory store only)
    #[serde(default)]
    pub watch_config: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Opaque per-plugin configuration handed to `Plugin::init`, keyed by plugin name
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,
    /// Static route definitions seeding the in-memory store
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream_timeout: default_upstream_timeout(),
            watch_config: false,
            logging: LoggingConfig::default(),
            admin: AdminConfig::default(),
            persistence: PersistenceConfig::default(),
            plugins: HashMap::new(),
            routes: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Parsed `upstream_timeout`.
    pub fn upstream_timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.upstream_timeout)
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, overridden by `RUST_LOG` when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Administrative API settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API under `/admin`
    pub enabled: bool,
    /// When set, admin requests must carry `Authorization: Bearer <api_key>`
    pub api_key: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
        }
    }
}

/// Where route definitions live. Absent backends fall back to the in-memory store.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PersistenceConfig {
    pub mongodb: Option<MongoDbConfig>,
}

fn default_mongo_database() -> String {
    "apigateway".to_string()
}

fn default_mongo_collection() -> String {
    "routes".to_string()
}

fn default_store_timeout() -> String {
    "5s".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MongoDbConfig {
    pub uri: String,
    #[serde(default = "default_mongo_database")]
    pub database: String,
    #[serde(default = "default_mongo_collection")]
    pub collection: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Bound applied to every store operation, humantime format
    #[serde(default = "default_store_timeout")]
    pub timeout: String,
}

impl MongoDbConfig {
    pub fn timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.timeout)
    }
}

/// Declarative mapping from a path/method pattern to an upstream and plugin list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct RouteDefinition {
    /// Stable identifier, assigned by the store on creation when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    pub upstream: String,
    #[serde(default)]
    pub strip_prefix: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
}

impl RouteDefinition {
    pub fn new(path: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            upstream: upstream.into(),
            ..Self::default()
        }
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_plugins<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plugins = plugins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_strip_prefix(mut self, strip: bool) -> Self {
        self.strip_prefix = strip;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// True when the path ends with the wildcard marker.
    pub fn is_prefix(&self) -> bool {
        self.path.ends_with(WILDCARD_MARKER)
    }

    /// Path with the wildcard marker and trailing slashes removed.
    ///
    /// `/echo/*` becomes `/echo`; `/*` becomes `/`.
    pub fn mount_path(&self) -> String {
        normalize_path(self.path.trim_end_matches(WILDCARD_MARKER))
    }
}

/// Trim trailing slashes, keeping the root path intact.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_path_strips_marker_and_slash() {
        assert_eq!(RouteDefinition::new("/echo/*", "http://up").mount_path(), "/echo");
        assert_eq!(RouteDefinition::new("/api*", "http://up").mount_path(), "/api");
        assert_eq!(RouteDefinition::new("/*", "http://up").mount_path(), "/");
        assert!(RouteDefinition::new("/echo/*", "http://up").is_prefix());
        assert!(!RouteDefinition::new("/echo", "http://up").is_prefix());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/users/"), "/users");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("users"), "/users");
    }

    #[test]
    fn test_route_definition_json_shape() {
        let route: RouteDefinition = serde_json::from_str(
            r#"{"path":"/users","methods":["GET"],"upstream":"http://users:8080"}"#,
        )
        .unwrap();
        assert_eq!(route.id, None);
        assert!(!route.strip_prefix);
        assert!(route.plugins.is_empty());

        let json = serde_json::to_value(route.with_id("abc")).unwrap();
        assert_eq!(json["id"], "abc");
        assert!(json.get("plugins").is_none());
    }

    #[test]
    fn test_gateway_config_defaults() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.upstream_timeout().unwrap(), Duration::from_secs(30));
        assert!(cfg.admin.enabled);
        assert!(cfg.persistence.mongodb.is_none());
    }
}
