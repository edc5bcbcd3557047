//! Plugin contract, registry and per-route chain.
//!
//! A plugin is a cross-cutting request processor that runs before a request is
//! proxied. Each route names the plugins it wants; the route table builder asks
//! the [`PluginRegistry`] to materialize fresh instances for every table build,
//! so instances live exactly as long as the table that owns them and are shared
//! by every request served from it.
//!
//! The registry is an ordinary value. It is filled at startup through
//! `&mut self` and then frozen behind an `Arc`, which makes late registration
//! during live traffic impossible rather than merely unsupported.
use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use axum::body::Body;
use http::Request;
use thiserror::Error;

use crate::core::recorder::ResponseRecorder;

/// Error type for plugin construction and execution
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PluginError {
    /// No factory registered under this name
    #[error("plugin not registered: {0}")]
    NotRegistered(String),

    /// `init` refused its configuration
    #[error("plugin '{plugin}' failed to initialize: {reason}")]
    Init { plugin: String, reason: String },

    /// The plugin wrote a terminal response; the chain must stop
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Capability set every plugin implements.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Called once per materialization with the plugin's configuration block, if any.
    fn init(&mut self, config: Option<&serde_json::Value>) -> Result<(), PluginError>;

    /// Process one request. Returning an error means the plugin has already
    /// written a terminal response into `recorder`.
    async fn execute(
        &self,
        recorder: &mut ResponseRecorder,
        request: &mut Request<Body>,
    ) -> Result<(), PluginError>;
}

/// Zero-argument plugin constructor.
pub type PluginFactory = fn() -> Box<dyn Plugin>;

/// Name → constructor mapping plus the per-plugin settings handed to `init`.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
    settings: HashMap<String, serde_json::Value>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor, replacing any earlier one with the same name.
    pub fn register(&mut self, name: impl Into<String>, factory: PluginFactory) -> &mut Self {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            tracing::warn!(plugin = %name, "Plugin factory replaced");
        } else {
            tracing::debug!(plugin = %name, "Registered plugin factory");
        }
        self
    }

    /// Attach configuration blocks keyed by plugin name.
    pub fn with_settings(mut self, settings: HashMap<String, serde_json::Value>) -> Self {
        self.settings = settings;
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct and initialize a new instance of `name`.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Plugin>, PluginError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PluginError::NotRegistered(name.to_string()))?;
        let mut plugin = factory();
        plugin.init(self.settings.get(name))?;
        Ok(plugin)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

/// Ordered plugins attached to one route.
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginChain {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run every plugin in order, stopping at the first one that fails.
    pub async fn run(
        &self,
        recorder: &mut ResponseRecorder,
        request: &mut Request<Body>,
    ) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            if let Err(e) = plugin.execute(recorder, request).await {
                tracing::debug!(
                    plugin = plugin.name(),
                    path = %request.uri().path(),
                    error = %e,
                    "Plugin short-circuited request"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
