#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{body::Body, response::Response};
use http::{Request, StatusCode};
use switchyard::{
    adapters::InMemoryRouteStore,
    config::RouteDefinition,
    core::{HotReloadManager, PluginRegistry, RouteTableBuilder},
    plugins,
    ports::{HttpClient, HttpClientError, HttpClientResult, RouteStore, StoreError, StoreResult},
};

/// Upstream stand-in that answers with the URI it was asked for.
#[derive(Default)]
pub struct RecordingClient {
    pub requests: Mutex<Vec<Request<()>>>,
}

impl RecordingClient {
    pub fn uris(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.uri().to_string())
            .collect()
    }
}

#[async_trait]
impl HttpClient for RecordingClient {
    async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response> {
        let (parts, _) = req.into_parts();
        let uri = parts.uri.to_string();
        self.requests
            .lock()
            .unwrap()
            .push(Request::from_parts(parts, ()));
        Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(uri))
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))
    }
}

/// In-memory store that can be switched into a failing state.
pub struct FlakyStore {
    pub inner: InMemoryRouteStore,
    pub failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(routes: Vec<RouteDefinition>) -> Self {
        Self {
            inner: InMemoryRouteStore::new(routes),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RouteStore for FlakyStore {
    async fn load_routes(&self) -> StoreResult<Vec<RouteDefinition>> {
        self.check()?;
        self.inner.load_routes().await
    }

    async fn save_route(&self, route: &mut RouteDefinition) -> StoreResult<String> {
        self.check()?;
        self.inner.save_route(route).await
    }

    async fn delete_route(&self, id: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete_route(id).await
    }
}

pub fn registry_with_tokens(tokens: &[&str]) -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    plugins::register_builtin(&mut registry);
    let mut settings = std::collections::HashMap::new();
    settings.insert(
        "jwt-auth".to_string(),
        serde_json::json!({ "tokens": tokens }),
    );
    Arc::new(registry.with_settings(settings))
}

pub fn builder(client: Arc<dyn HttpClient>) -> RouteTableBuilder {
    RouteTableBuilder::new(
        registry_with_tokens(&["valid-token"]),
        client,
        Duration::from_secs(5),
    )
}

pub async fn manager(
    store: Arc<dyn RouteStore>,
    client: Arc<dyn HttpClient>,
) -> Arc<HotReloadManager> {
    Arc::new(HotReloadManager::new(store, builder(client)).await.unwrap())
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
