//! Atomic publication of routing tables.
//!
//! The live [`RouteTable`] sits behind an [`ArcSwap`]. Request dispatch loads
//! the current table once and keeps that `Arc` until the response is produced,
//! so a reload never changes the table under an in-flight request and readers
//! never block. Writers serialize on a mutex so the most recent reload always
//! publishes the most recent store snapshot.
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::{body::Body, response::Response};
use http::Request;
use tokio::sync::Mutex;

use crate::{
    core::route_table::{RouteTable, RouteTableBuilder},
    ports::{
        reloader::{ReloadError, Reloader},
        route_store::RouteStore,
    },
};

pub struct HotReloadManager {
    store: Arc<dyn RouteStore>,
    builder: RouteTableBuilder,
    current: ArcSwap<RouteTable>,
    reload_lock: Mutex<()>,
    generation: AtomicU64,
}

impl HotReloadManager {
    /// Create the manager and publish the first table.
    ///
    /// Fails when the store cannot be read; there is no previous table to
    /// fall back on at startup.
    pub async fn new(
        store: Arc<dyn RouteStore>,
        builder: RouteTableBuilder,
    ) -> Result<Self, ReloadError> {
        let manager = Self {
            store,
            builder,
            current: ArcSwap::from_pointee(RouteTable::empty(0)),
            reload_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        };
        manager.reload().await?;
        Ok(manager)
    }

    /// Re-read the store, build a new table and swap it in.
    ///
    /// On failure the current table stays in place.
    pub async fn reload(&self) -> Result<usize, ReloadError> {
        let _guard = self.reload_lock.lock().await;

        let routes = match self.store.load_routes().await {
            Ok(routes) => routes,
            Err(e) => {
                tracing::error!(error = %e, "Reload failed, keeping current routes");
                return Err(e.into());
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let table = self.builder.build(&routes, generation);
        let count = table.route_count();
        self.current.store(Arc::new(table));

        tracing::info!(generation, routes = count, "Route table published");
        Ok(count)
    }

    /// The table new requests will be dispatched against.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    pub fn store(&self) -> &Arc<dyn RouteStore> {
        &self.store
    }

    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let table = self.current.load_full();
        table.dispatch(request).await
    }
}

#[async_trait]
impl Reloader for HotReloadManager {
    async fn reload(&self) -> Result<usize, ReloadError> {
        HotReloadManager::reload(self).await
    }
}

impl std::fmt::Debug for HotReloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotReloadManager")
            .field("current", &self.current.load_full())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicBool, time::Duration};

    use super::*;
    use crate::{
        config::models::RouteDefinition,
        core::plugin::PluginRegistry,
        ports::{
            http_client::{HttpClient, HttpClientError, HttpClientResult},
            route_store::{StoreError, StoreResult},
        },
    };

    struct RefusingClient;

    #[async_trait]
    impl HttpClient for RefusingClient {
        async fn send_request(&self, _req: Request<Body>) -> HttpClientResult<Response> {
            Err(HttpClientError::ConnectionError("refused".to_string()))
        }
    }

    #[derive(Default)]
    struct ToggleStore {
        routes: std::sync::Mutex<Vec<RouteDefinition>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl RouteStore for ToggleStore {
        async fn load_routes(&self) -> StoreResult<Vec<RouteDefinition>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("down".to_string()));
            }
            Ok(self.routes.lock().unwrap().clone())
        }

        async fn save_route(&self, route: &mut RouteDefinition) -> StoreResult<String> {
            let id = route.id.get_or_insert_with(|| "r1".to_string()).clone();
            self.routes.lock().unwrap().push(route.clone());
            Ok(id)
        }

        async fn delete_route(&self, id: &str) -> StoreResult<()> {
            let mut routes = self.routes.lock().unwrap();
            let before = routes.len();
            routes.retain(|r| r.id.as_deref() != Some(id));
            if routes.len() == before {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        }
    }

    fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new(
            Arc::new(PluginRegistry::new()),
            Arc::new(RefusingClient),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_initial_reload_failure_is_fatal() {
        let store = Arc::new(ToggleStore::default());
        store.failing.store(true, Ordering::SeqCst);
        assert!(HotReloadManager::new(store, builder()).await.is_err());
    }

    #[tokio::test]
    async fn test_reload_bumps_generation_and_count() {
        let store = Arc::new(ToggleStore::default());
        let manager = HotReloadManager::new(store.clone(), builder()).await.unwrap();
        assert_eq!(manager.snapshot().generation(), 1);
        assert_eq!(manager.snapshot().route_count(), 0);

        let mut route = RouteDefinition::new("/a", "http://up:1").with_methods(["GET"]);
        store.save_route(&mut route).await.unwrap();
        assert_eq!(manager.reload().await.unwrap(), 1);
        assert_eq!(manager.snapshot().generation(), 2);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_table() {
        let store = Arc::new(ToggleStore::default());
        let mut route = RouteDefinition::new("/a", "http://up:1").with_methods(["GET"]);
        store.save_route(&mut route).await.unwrap();
        let manager = HotReloadManager::new(store.clone(), builder()).await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            Reloader::reload(&manager).await,
            Err(ReloadError::Store(StoreError::Backend(_)))
        ));
        let table = manager.snapshot();
        assert_eq!(table.generation(), 1);
        assert_eq!(table.route_count(), 1);
    }
}
