//! Route table and middleware stack.

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the application router.
pub fn build_router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route(
            "/core/bitstreams/{id}/content",
            get(routes::bitstreams::retrieve),
        )
        .route("/core/bitstreams/{id}", get(routes::bitstreams::get_metadata))
        .route("/core/usage/recent", get(routes::usage::recent_usage));

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api", api)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
