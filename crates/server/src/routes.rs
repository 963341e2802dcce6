//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let chunk_body_limit =
        usize::try_from(state.config.server.max_chunk_body_bytes).unwrap_or(usize::MAX);

    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/fragments", post(handlers::create_fragment))
        .route(
            "/v1/fragments/{fragment_id}",
            get(handlers::get_fragment).delete(handlers::delete_fragment),
        )
        .route(
            "/v1/fragments/{fragment_id}/chunks",
            get(handlers::list_chunks),
        )
        .route(
            "/v1/fragments/{fragment_id}/chunks/{number}",
            put(handlers::upload_chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route(
            "/v1/fragments/{fragment_id}/merge",
            post(handlers::merge_fragment),
        )
        .route(
            "/v1/fragments/{fragment_id}/release",
            post(handlers::release_fragment),
        );

    let mut router = Router::new().merge(api_routes);

    // Unauthenticated; keep it behind the network boundary.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    if state.config.server.enable_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}
