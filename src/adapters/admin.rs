//! Route management REST API, mounted under `/admin`.
//!
//! | Method | Path            | Effect                                   |
//! |--------|-----------------|------------------------------------------|
//! | GET    | `/routes`       | list stored routes                       |
//! | POST   | `/routes`       | store a route, then reload               |
//! | DELETE | `/routes/{id}`  | delete a route, then reload              |
//! | POST   | `/reload`       | reload from the store                    |
//!
//! When an API key is configured every request must carry
//! `Authorization: Bearer <key>`.
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use bytes::Bytes;
use http::{Request, StatusCode, header};
use serde_json::json;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

use crate::{
    config::{models::RouteDefinition, validation::RouteValidator},
    ports::{
        reloader::{ReloadError, Reloader},
        route_store::{RouteStore, StoreError},
    },
};

#[derive(Clone)]
pub struct AdminState {
    store: Arc<dyn RouteStore>,
    reloader: Arc<dyn Reloader>,
    api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(
        store: Arc<dyn RouteStore>,
        reloader: Arc<dyn Reloader>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            store,
            reloader,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }
}

/// Failures surfaced to admin clients.
#[derive(Debug)]
enum AdminError {
    InvalidBody,
    MissingFields,
    NotFound,
    Store(StoreError),
    Reload(&'static str, ReloadError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidBody => (StatusCode::BAD_REQUEST, "Invalid route data").into_response(),
            Self::MissingFields => {
                (StatusCode::BAD_REQUEST, "Missing required route fields").into_response()
            }
            Self::NotFound => (StatusCode::NOT_FOUND, "route not found").into_response(),
            Self::Store(e) => {
                tracing::error!(error = %e, "Admin store operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("store error: {e}")).into_response()
            }
            Self::Reload(message, e) => {
                tracing::error!(error = %e, "{message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

/// Build the admin router. The caller nests it under `/admin`.
pub fn router(state: AdminState) -> Router {
    let mut router = Router::new()
        .route("/routes", get(list_routes).post(create_route))
        .route("/routes/{id}", delete(delete_route))
        .route("/reload", post(reload_routes))
        .fallback(admin_not_found);

    if state.api_key.is_some() {
        router = router.layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn require_api_key(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized =
        presented.is_some_and(|key| bool::from(key.as_bytes().ct_eq(expected.as_bytes())));

    if authorized {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request without valid API key");
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            "unauthorized",
        )
            .into_response()
    }
}

async fn list_routes(
    State(state): State<AdminState>,
) -> Result<Json<Vec<RouteDefinition>>, AdminError> {
    let routes = state.store.load_routes().await.map_err(AdminError::Store)?;
    Ok(Json(routes))
}

async fn create_route(
    State(state): State<AdminState>,
    body: Bytes,
) -> Result<Response, AdminError> {
    let mut route: RouteDefinition =
        serde_json::from_slice(&body).map_err(|_| AdminError::InvalidBody)?;
    RouteValidator::check_required_fields(&route).map_err(|_| AdminError::MissingFields)?;

    let id = state
        .store
        .save_route(&mut route)
        .await
        .map_err(AdminError::Store)?;
    tracing::info!(id = %id, path = %route.path, upstream = %route.upstream, "Route saved");

    state
        .reloader
        .reload()
        .await
        .map_err(|e| AdminError::Reload("saved but reload failed", e))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Route saved" })),
    )
        .into_response())
}

async fn delete_route(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AdminError> {
    match state.store.delete_route(&id).await {
        Ok(()) => tracing::info!(id = %id, "Route deleted"),
        Err(StoreError::NotFound(_)) => return Err(AdminError::NotFound),
        Err(e) => return Err(AdminError::Store(e)),
    }

    state
        .reloader
        .reload()
        .await
        .map_err(|e| AdminError::Reload("deleted but reload failed", e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reload_routes(State(state): State<AdminState>) -> Result<Response, AdminError> {
    let routes = state
        .reloader
        .reload()
        .await
        .map_err(|e| AdminError::Reload("reload failed", e))?;
    Ok(Json(json!({ "routes": routes })).into_response())
}

async fn admin_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "admin route not found")
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tower::ServiceExt;

    use super::*;
    use crate::adapters::memory_store::InMemoryRouteStore;

    struct CountingReloader(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl Reloader for CountingReloader {
        async fn reload(&self) -> Result<usize, ReloadError> {
            Ok(self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1)
        }
    }

    fn app(api_key: Option<&str>) -> Router {
        let state = AdminState::new(
            Arc::new(InMemoryRouteStore::default()),
            Arc::new(CountingReloader(Default::default())),
            api_key.map(str::to_string),
        );
        router(state)
    }

    #[tokio::test]
    async fn test_unknown_admin_path() {
        let response = app(None)
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let response = app(None)
            .oneshot(Request::put("/routes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let app = app(Some("secret"));

        let denied = app
            .clone()
            .oneshot(Request::get("/routes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                Request::get("/routes")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wrong_api_key_rejected() {
        let app = app(Some("secret"));
        for presented in ["Bearer secreT", "Bearer secret2", "Bearer ", "secret"] {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/routes")
                        .header(header::AUTHORIZATION, presented)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{presented}");
            assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        }
    }
}
