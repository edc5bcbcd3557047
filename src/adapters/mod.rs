pub mod admin;
pub mod config_watcher;
pub mod http_client;
pub mod memory_store;
#[cfg(feature = "mongodb")]
pub mod mongo_store;
pub mod server;

pub use admin::AdminState;
pub use config_watcher::{ConfigWatcher, spawn_route_sync};
pub use http_client::HttpClientAdapter;
pub use memory_store::InMemoryRouteStore;
#[cfg(feature = "mongodb")]
pub use mongo_store::MongoRouteStore;
pub use server::build_app;
