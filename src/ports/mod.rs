pub mod http_client;
pub mod reloader;
pub mod route_store;

pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use reloader::{ReloadError, Reloader};
pub use route_store::{RouteStore, StoreError, StoreResult};
