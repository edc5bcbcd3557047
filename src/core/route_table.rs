//! Compiled routing table.
//!
//! [`RouteTableBuilder::build`] turns a list of [`RouteDefinition`]s into an
//! immutable [`RouteTable`]. Exact routes live in a `matchit` radix router
//! keyed by normalized path, with a per-method handler map at each leaf.
//! Prefix routes are kept in a list ordered by mount length, longest first, so
//! the most specific mount always wins.
//!
//! Building never fails. Malformed entries are logged and either skipped or
//! turned into fixed error responders so one bad route cannot take down the
//! rest of the table.
use std::{
    collections::{BTreeMap, HashMap, hash_map::Entry},
    sync::Arc,
    time::Duration,
};

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::{Method, Request, StatusCode};
use matchit::Router;

use crate::{
    config::models::{RouteDefinition, normalize_path},
    core::{
        plugin::{PluginChain, PluginError, PluginRegistry},
        proxy::ProxyAdapter,
        recorder::ResponseRecorder,
    },
    ports::http_client::HttpClient,
};

pub const PING_PATH: &str = "/ping";
pub const NOT_FOUND_MESSAGE: &str = "Route not found";
pub const BAD_UPSTREAM_MESSAGE: &str = "bad upstream configuration";
pub const PLUGIN_INIT_MESSAGE: &str = "plugin initialization failed";

/// What a matched route ultimately does once its plugins let the request through.
#[derive(Debug)]
pub enum RouteTarget {
    Proxy(ProxyAdapter),
    /// Canned response for routes that could not be built correctly.
    Fixed {
        status: StatusCode,
        message: &'static str,
    },
}

/// Plugin chain plus target for one route definition.
#[derive(Debug)]
pub struct RouteHandler {
    route_path: String,
    chain: PluginChain,
    target: RouteTarget,
}

impl RouteHandler {
    /// Run the plugin chain, then the target, and produce the client response.
    pub async fn handle(&self, mut request: Request<Body>) -> Response {
        let mut recorder = ResponseRecorder::new();

        if self.chain.run(&mut recorder, &mut request).await.is_err() {
            tracing::debug!(route = %self.route_path, status = %recorder.status(), "Request rejected by plugin chain");
            return recorder.finish();
        }

        match &self.target {
            RouteTarget::Proxy(proxy) => proxy.forward(&mut recorder, request).await,
            RouteTarget::Fixed { status, message } => recorder.reply(*status, *message),
        }
        recorder.finish()
    }
}

#[derive(Debug, Default)]
struct MethodRoutes(HashMap<Method, Arc<RouteHandler>>);

#[derive(Debug)]
struct PrefixRoute {
    mount: String,
    handler: Arc<RouteHandler>,
}

impl PrefixRoute {
    fn matches(&self, path: &str) -> bool {
        if self.mount == "/" {
            return true;
        }
        match path.strip_prefix(self.mount.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Immutable dispatch structure produced by one build.
pub struct RouteTable {
    exact: Router<MethodRoutes>,
    prefixes: Vec<PrefixRoute>,
    route_count: usize,
    generation: u64,
}

impl RouteTable {
    /// Table with no routes; only `/ping` answers.
    pub fn empty(generation: u64) -> Self {
        Self {
            exact: Router::new(),
            prefixes: Vec::new(),
            route_count: 0,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of definitions this table was built from.
    pub fn route_count(&self) -> usize {
        self.route_count
    }

    /// Mount paths of prefix routes in match order.
    pub fn prefix_mounts(&self) -> Vec<&str> {
        self.prefixes.iter().map(|p| p.mount.as_str()).collect()
    }

    /// Find the handler for `method` and an already normalized `path`.
    pub fn find(&self, method: &Method, path: &str) -> Option<&Arc<RouteHandler>> {
        if let Ok(matched) = self.exact.at(path) {
            if let Some(handler) = matched.value.0.get(method) {
                return Some(handler);
            }
        }
        self.prefixes
            .iter()
            .find(|prefix| prefix.matches(path))
            .map(|prefix| &prefix.handler)
    }

    /// Route one request to completion against this table.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let path = normalize_path(request.uri().path());

        if request.method() == Method::GET && path == PING_PATH {
            return (StatusCode::OK, "pong").into_response();
        }

        match self.find(request.method(), &path) {
            Some(handler) => handler.handle(request).await,
            None => {
                tracing::debug!(method = %request.method(), %path, "No route matched");
                let mut recorder = ResponseRecorder::new();
                recorder.reply(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE);
                recorder.finish()
            }
        }
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("generation", &self.generation)
            .field("route_count", &self.route_count)
            .field("prefixes", &self.prefix_mounts())
            .finish()
    }
}

/// Compiles route definitions into a [`RouteTable`].
#[derive(Clone)]
pub struct RouteTableBuilder {
    registry: Arc<PluginRegistry>,
    client: Arc<dyn HttpClient>,
    upstream_timeout: Duration,
}

impl RouteTableBuilder {
    pub fn new(
        registry: Arc<PluginRegistry>,
        client: Arc<dyn HttpClient>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            upstream_timeout,
        }
    }

    pub fn build(&self, routes: &[RouteDefinition], generation: u64) -> RouteTable {
        let mut exact_paths: BTreeMap<String, MethodRoutes> = BTreeMap::new();
        let mut prefixes: Vec<PrefixRoute> = Vec::new();

        for route in routes {
            if route.path.trim().is_empty() {
                tracing::warn!(upstream = %route.upstream, "Route with empty path skipped");
                continue;
            }
            if route.is_prefix() {
                let mount = route.mount_path();
                if prefixes.iter().any(|p| p.mount == mount) {
                    tracing::warn!(path = %route.path, mount = %mount, "Duplicate prefix route skipped");
                    continue;
                }
                prefixes.push(PrefixRoute {
                    mount,
                    handler: Arc::new(self.build_handler(route)),
                });
                continue;
            }

            let methods = parse_methods(route);
            if methods.is_empty() {
                tracing::warn!(path = %route.path, "Exact route has no usable methods, skipped");
                continue;
            }

            let handler = Arc::new(self.build_handler(route));
            let leaf = exact_paths.entry(normalize_path(&route.path)).or_default();
            for method in methods {
                match leaf.0.entry(method) {
                    Entry::Occupied(occupied) => {
                        tracing::warn!(
                            path = %route.path,
                            method = %occupied.key(),
                            "Duplicate exact route skipped"
                        );
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(handler.clone());
                    }
                }
            }
        }

        let mut exact = Router::new();
        for (path, methods) in exact_paths {
            if methods.0.is_empty() {
                continue;
            }
            if let Err(e) = exact.insert(path.clone(), methods) {
                tracing::warn!(path = %path, error = %e, "Exact route rejected by router, skipped");
            }
        }

        // stable sort keeps registration order among equal lengths
        prefixes.sort_by(|a, b| b.mount.len().cmp(&a.mount.len()));

        tracing::debug!(
            generation,
            routes = routes.len(),
            prefixes = prefixes.len(),
            "Built route table"
        );

        RouteTable {
            exact,
            prefixes,
            route_count: routes.len(),
            generation,
        }
    }

    fn build_handler(&self, route: &RouteDefinition) -> RouteHandler {
        let mut plugins = Vec::with_capacity(route.plugins.len());
        for name in &route.plugins {
            match self.registry.instantiate(name) {
                Ok(plugin) => plugins.push(plugin),
                Err(PluginError::NotRegistered(_)) => {
                    tracing::warn!(path = %route.path, plugin = %name, "Unknown plugin skipped");
                }
                Err(e) => {
                    tracing::error!(path = %route.path, plugin = %name, error = %e, "Plugin init failed, route disabled");
                    return RouteHandler {
                        route_path: route.path.clone(),
                        chain: PluginChain::default(),
                        target: RouteTarget::Fixed {
                            status: StatusCode::INTERNAL_SERVER_ERROR,
                            message: PLUGIN_INIT_MESSAGE,
                        },
                    };
                }
            }
        }

        let mount = route.mount_path();
        let strip = (route.is_prefix() && route.strip_prefix).then_some(mount.as_str());
        let target = match ProxyAdapter::new(
            &route.upstream,
            strip,
            self.client.clone(),
            self.upstream_timeout,
        ) {
            Ok(proxy) => RouteTarget::Proxy(proxy),
            Err(e) => {
                tracing::error!(path = %route.path, upstream = %route.upstream, error = %e, "Bad upstream");
                RouteTarget::Fixed {
                    status: StatusCode::BAD_GATEWAY,
                    message: BAD_UPSTREAM_MESSAGE,
                }
            }
        };

        RouteHandler {
            route_path: route.path.clone(),
            chain: PluginChain::new(plugins),
            target,
        }
    }
}

fn parse_methods(route: &RouteDefinition) -> Vec<Method> {
    route
        .methods
        .iter()
        .filter_map(|raw| {
            let upper = raw.trim().to_ascii_uppercase();
            match Method::from_bytes(upper.as_bytes()) {
                Ok(method) if !upper.is_empty() => Some(method),
                _ => {
                    tracing::warn!(path = %route.path, method = %raw, "Invalid method skipped");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        core::plugin::Plugin,
        ports::http_client::{HttpClientError, HttpClientResult},
    };

    /// Answers every request with the upstream URI it received.
    #[derive(Default)]
    struct EchoUriClient {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for EchoUriClient {
        async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response> {
            let uri = req.uri().to_string();
            self.seen.lock().unwrap().push(uri.clone());
            Response::builder()
                .body(Body::from(uri))
                .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))
        }
    }

    struct Broken;

    #[async_trait]
    impl Plugin for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn init(&mut self, _config: Option<&serde_json::Value>) -> Result<(), PluginError> {
            Err(PluginError::Init {
                plugin: "broken".to_string(),
                reason: "always".to_string(),
            })
        }

        async fn execute(
            &self,
            _recorder: &mut ResponseRecorder,
            _request: &mut Request<Body>,
        ) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn builder() -> RouteTableBuilder {
        let mut registry = PluginRegistry::new();
        registry.register("broken", || Box::new(Broken));
        RouteTableBuilder::new(
            Arc::new(registry),
            Arc::new(EchoUriClient::default()),
            Duration::from_secs(5),
        )
    }

    async fn call(table: &RouteTable, method: &str, uri: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = table.dispatch(req).await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_ping_and_not_found() {
        let table = RouteTable::empty(0);
        assert_eq!(call(&table, "GET", "/ping").await, (StatusCode::OK, "pong".into()));
        assert_eq!(
            call(&table, "GET", "/nowhere").await,
            (StatusCode::NOT_FOUND, "Route not found\n".into())
        );
    }

    #[tokio::test]
    async fn test_exact_route_by_method() {
        let routes = vec![RouteDefinition::new("/users", "http://users:8080").with_methods(["get", "POST"])];
        let table = builder().build(&routes, 1);

        assert_eq!(
            call(&table, "GET", "/users").await,
            (StatusCode::OK, "http://users:8080/users".into())
        );
        assert_eq!(call(&table, "POST", "/users/").await.0, StatusCode::OK);
        assert_eq!(call(&table, "DELETE", "/users").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exact_route_with_params() {
        let routes = vec![RouteDefinition::new("/users/{id}", "http://users:8080").with_methods(["GET"])];
        let table = builder().build(&routes, 1);
        assert_eq!(
            call(&table, "GET", "/users/42").await.1,
            "http://users:8080/users/42"
        );
    }

    #[tokio::test]
    async fn test_longest_mount_wins() {
        let routes = vec![
            RouteDefinition::new("/*", "http://root:1"),
            RouteDefinition::new("/api/*", "http://api:1"),
            RouteDefinition::new("/api/v2/*", "http://v2:1").with_strip_prefix(true),
        ];
        let table = builder().build(&routes, 1);
        assert_eq!(table.prefix_mounts(), vec!["/api/v2", "/api", "/"]);

        assert_eq!(call(&table, "GET", "/api/v2/x").await.1, "http://v2:1/x");
        assert_eq!(call(&table, "DELETE", "/api/x").await.1, "http://api:1/api/x");
        assert_eq!(call(&table, "GET", "/apiv2").await.1, "http://root:1/apiv2");
    }

    #[tokio::test]
    async fn test_exact_method_miss_falls_through_to_prefix() {
        let routes = vec![
            RouteDefinition::new("/api/users", "http://exact:1").with_methods(["GET"]),
            RouteDefinition::new("/api/*", "http://prefix:1"),
        ];
        let table = builder().build(&routes, 1);
        assert_eq!(call(&table, "GET", "/api/users").await.1, "http://exact:1/api/users");
        assert_eq!(call(&table, "POST", "/api/users").await.1, "http://prefix:1/api/users");
    }

    #[tokio::test]
    async fn test_first_duplicate_wins() {
        let routes = vec![
            RouteDefinition::new("/dup", "http://first:1").with_methods(["GET"]),
            RouteDefinition::new("/dup", "http://second:1").with_methods(["GET", "PUT"]),
            RouteDefinition::new("/p/*", "http://first:1"),
            RouteDefinition::new("/p/*", "http://second:1"),
        ];
        let table = builder().build(&routes, 1);
        assert_eq!(call(&table, "GET", "/dup").await.1, "http://first:1/dup");
        assert_eq!(call(&table, "PUT", "/dup").await.1, "http://second:1/dup");
        assert_eq!(call(&table, "GET", "/p/x").await.1, "http://first:1/p/x");
        assert_eq!(table.route_count(), 4);
    }

    #[tokio::test]
    async fn test_malformed_routes_are_isolated() {
        let routes = vec![
            RouteDefinition::new("/no-methods", "http://up:1"),
            RouteDefinition::new("/bad-method", "http://up:1").with_methods(["NOT A METHOD"]),
            RouteDefinition::new("/bad-upstream", "::not-a-url::").with_methods(["GET"]),
            RouteDefinition::new("/broken", "http://up:1")
                .with_methods(["GET"])
                .with_plugins(["broken"]),
            RouteDefinition::new("/unknown-plugin", "http://up:1")
                .with_methods(["GET"])
                .with_plugins(["does-not-exist"]),
        ];
        let table = builder().build(&routes, 1);

        assert_eq!(call(&table, "GET", "/no-methods").await.0, StatusCode::NOT_FOUND);
        assert_eq!(call(&table, "GET", "/bad-method").await.0, StatusCode::NOT_FOUND);
        assert_eq!(
            call(&table, "GET", "/bad-upstream").await,
            (StatusCode::BAD_GATEWAY, "bad upstream configuration\n".into())
        );
        assert_eq!(
            call(&table, "GET", "/broken").await,
            (StatusCode::INTERNAL_SERVER_ERROR, "plugin initialization failed\n".into())
        );
        assert_eq!(call(&table, "GET", "/unknown-plugin").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_path_does_not_bind_root() {
        let routes = vec![
            RouteDefinition::new("", "http://empty:1").with_methods(["GET"]),
            RouteDefinition::new("  ", "http://blank:1").with_methods(["GET"]),
        ];
        let table = builder().build(&routes, 1);
        assert_eq!(call(&table, "GET", "/").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ping_shadows_routes() {
        let routes = vec![RouteDefinition::new("/*", "http://root:1")];
        let table = builder().build(&routes, 1);
        assert_eq!(call(&table, "GET", "/ping").await.1, "pong");
        assert_eq!(call(&table, "POST", "/ping").await.1, "http://root:1/ping");
    }
}
