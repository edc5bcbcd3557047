use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::models::RouteDefinition;

/// Error type for route store operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// No route with the given id exists
    #[error("route not found: {0}")]
    NotFound(String),

    /// The backend did not answer within the configured bound
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Connectivity or driver failure in the backing store
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for route store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// RouteStore defines the port (interface) for persisting route definitions
#[async_trait]
pub trait RouteStore: Send + Sync + 'static {
    /// Snapshot of every stored route, in storage order
    async fn load_routes(&self) -> StoreResult<Vec<RouteDefinition>>;

    /// Persist a new route, assigning an id when `route.id` is absent
    ///
    /// # Returns
    /// The id under which the route was stored
    async fn save_route(&self, route: &mut RouteDefinition) -> StoreResult<String>;

    /// Remove a route by id; `StoreError::NotFound` when nothing matched
    async fn delete_route(&self, id: &str) -> StoreResult<()>;
}
