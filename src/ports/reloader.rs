use async_trait::async_trait;
use thiserror::Error;

use crate::ports::route_store::StoreError;

/// Error returned when a reload could not publish a new routing table.
///
/// Table construction itself never fails, so the only cause is the store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReloadError {
    #[error("failed to load routes: {0}")]
    Store(#[from] StoreError),
}

/// Anything that can rebuild and publish the routing table on demand.
#[async_trait]
pub trait Reloader: Send + Sync + 'static {
    /// Rebuild from the current store contents.
    ///
    /// # Returns
    /// The number of route definitions in the published table
    async fn reload(&self) -> Result<usize, ReloadError>;
}
