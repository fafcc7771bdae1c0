//! Composable API router.
//!
//! Returns a `Router` that can be mounted on any axum server. Routes are
//! nested under `/api/`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Build the API router.
///
/// The upload route drops axum's default body limit: per-file and per-batch
/// caps are enforced by batch validation, which names the violated
/// constraint instead of failing opaquely at the transport layer.
pub fn api_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route(
            "/batches",
            post(endpoints::batches::submit).layer(DefaultBodyLimit::disable()),
        )
        .route("/batches/:id", get(endpoints::batches::status))
        .route("/documents/:id/retry", post(endpoints::batches::retry))
        .route("/validation", get(endpoints::validation::list))
        .route("/validation/stats", get(endpoints::validation::stats))
        .route(
            "/validation/:id/approve",
            post(endpoints::validation::approve),
        )
        .route(
            "/validation/:id/reject",
            post(endpoints::validation::reject),
        )
        .route(
            "/validation/:id/reextract",
            post(endpoints::validation::reextract),
        )
        .route(
            "/templates",
            get(endpoints::templates::list).post(endpoints::templates::create),
        )
        .route(
            "/templates/:id",
            get(endpoints::templates::get)
                .put(endpoints::templates::update)
                .delete(endpoints::templates::remove),
        )
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
}
