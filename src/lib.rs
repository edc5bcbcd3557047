//! Switchyard - a dynamic API gateway with hot-reloadable routing.
//!
//! Requests are matched against a routing table compiled from route
//! definitions, passed through the route's plugin chain, and forwarded to a
//! single upstream. The table is rebuilt from a [`ports::RouteStore`] whenever
//! routes change and published atomically: in-flight requests finish on the
//! table they started with, new requests see the new one, and nobody waits.
//!
//! # Layout
//! - [`config`]: configuration models, loading and validation
//! - [`ports`]: traits at the seams (route store, upstream client, reloader)
//! - [`core`]: plugin contract, response recorder, proxy adapter, route table
//!   and the hot-reload manager
//! - [`plugins`]: built-in `jwt-auth` and `logging` plugins
//! - [`adapters`]: hyper client, route stores, admin API, the axum app and
//!   the config file watcher
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use switchyard::{
//!     adapters::{HttpClientAdapter, InMemoryRouteStore, build_app},
//!     config::{AdminConfig, RouteDefinition},
//!     core::{HotReloadManager, PluginRegistry, RouteTableBuilder},
//!     plugins,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let mut registry = PluginRegistry::new();
//! plugins::register_builtin(&mut registry);
//!
//! let store = Arc::new(InMemoryRouteStore::new(vec![
//!     RouteDefinition::new("/echo/*", "http://127.0.0.1:9000").with_strip_prefix(true),
//! ]));
//! let builder = RouteTableBuilder::new(
//!     Arc::new(registry),
//!     Arc::new(HttpClientAdapter::new()?),
//!     Duration::from_secs(30),
//! );
//! let manager = Arc::new(HotReloadManager::new(store.clone(), builder).await?);
//! let app = build_app(manager, store, &AdminConfig::default());
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Cargo features
//! - `mongodb`: route store backed by a MongoDB collection.
pub mod adapters;
pub mod config;
pub mod core;
pub mod plugins;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub use crate::{
    adapters::{HttpClientAdapter, InMemoryRouteStore, build_app},
    core::{HotReloadManager, PluginRegistry, RouteTableBuilder},
    ports::{HttpClient, Reloader, RouteStore},
    utils::GracefulShutdown,
};
