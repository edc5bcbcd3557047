use std::sync::Arc;

use axum::{Router, body::Body, extract::State, response::Response};
use http::Request;

use crate::{
    adapters::admin::{self, AdminState},
    config::models::AdminConfig,
    core::hot_reload::HotReloadManager,
    ports::route_store::RouteStore,
};

/// Top-level gateway application.
///
/// `/admin` is served by the admin API when enabled; everything else goes to
/// the current routing table.
pub fn build_app(
    manager: Arc<HotReloadManager>,
    store: Arc<dyn RouteStore>,
    admin_config: &AdminConfig,
) -> Router {
    let app = Router::new().fallback(dispatch).with_state(manager.clone());

    if !admin_config.enabled {
        tracing::info!("Admin API disabled");
        return app;
    }

    let state = AdminState::new(store, manager, admin_config.api_key.clone());
    app.nest("/admin", admin::router(state))
}

async fn dispatch(State(manager): State<Arc<HotReloadManager>>, request: Request<Body>) -> Response {
    manager.dispatch(request).await
}
