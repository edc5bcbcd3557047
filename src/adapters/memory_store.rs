use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    config::models::RouteDefinition,
    ports::route_store::{RouteStore, StoreError, StoreResult},
};

/// Route store holding definitions in process memory.
///
/// Seeded from the `routes:` section of the configuration file. Routes that
/// arrive without an id get a UUIDv4 so they can be deleted through the admin
/// API like any other route.
#[derive(Debug, Default)]
pub struct InMemoryRouteStore {
    routes: RwLock<Vec<RouteDefinition>>,
}

impl InMemoryRouteStore {
    pub fn new(routes: Vec<RouteDefinition>) -> Self {
        Self {
            routes: RwLock::new(with_ids(routes)),
        }
    }

    /// Swap the whole route list, e.g. after the configuration file changed.
    pub async fn replace_routes(&self, routes: Vec<RouteDefinition>) {
        let routes = with_ids(routes);
        let mut guard = self.routes.write().await;
        tracing::debug!(old = guard.len(), new = routes.len(), "Replacing stored routes");
        *guard = routes;
    }
}

fn with_ids(mut routes: Vec<RouteDefinition>) -> Vec<RouteDefinition> {
    for route in &mut routes {
        if route.id.as_deref().is_none_or(str::is_empty) {
            route.id = Some(Uuid::new_v4().to_string());
        }
    }
    routes
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn load_routes(&self) -> StoreResult<Vec<RouteDefinition>> {
        Ok(self.routes.read().await.clone())
    }

    async fn save_route(&self, route: &mut RouteDefinition) -> StoreResult<String> {
        let id = match route.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        route.id = Some(id.clone());
        self.routes.write().await.push(route.clone());
        Ok(id)
    }

    async fn delete_route(&self, id: &str) -> StoreResult<()> {
        let mut routes = self.routes.write().await;
        let position = routes
            .iter()
            .position(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        routes.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str) -> RouteDefinition {
        RouteDefinition::new(path, "http://up:1").with_methods(["GET"])
    }

    #[tokio::test]
    async fn test_static_routes_get_ids() {
        let store = InMemoryRouteStore::new(vec![route("/a"), route("/b").with_id("fixed")]);
        let routes = store.load_routes().await.unwrap();
        assert!(routes.iter().all(|r| r.id.is_some()));
        assert_eq!(routes[1].id.as_deref(), Some("fixed"));
        assert_ne!(routes[0].id, routes[1].id);
    }

    #[tokio::test]
    async fn test_save_then_delete() {
        let store = InMemoryRouteStore::default();
        let mut new_route = route("/new");
        let id = store.save_route(&mut new_route).await.unwrap();
        assert_eq!(new_route.id.as_deref(), Some(id.as_str()));
        assert_eq!(store.load_routes().await.unwrap().len(), 1);

        store.delete_route(&id).await.unwrap();
        assert!(store.load_routes().await.unwrap().is_empty());
        assert!(matches!(
            store.delete_route(&id).await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_load_returns_a_copy() {
        let store = InMemoryRouteStore::new(vec![route("/a")]);
        let mut snapshot = store.load_routes().await.unwrap();
        snapshot.clear();
        assert_eq!(store.load_routes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_routes() {
        let store = InMemoryRouteStore::new(vec![route("/a")]);
        store.replace_routes(vec![route("/x"), route("/y")]).await;
        let paths: Vec<String> = store
            .load_routes()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["/x", "/y"]);
    }
}
