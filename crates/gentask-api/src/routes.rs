//! API routes.

use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::generations::{get_generation, submit_generation};
use crate::handlers::health;
use crate::handlers::owners::{get_balance, top_up};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/generations", post(submit_generation))
        .route("/generations/:task_id", get(get_generation))
        .route("/owners/:owner_id/balance", get(get_balance))
        .route("/owners/:owner_id/credits", post(top_up));

    Router::new()
        .nest("/v1", api_routes)
        .route("/health", get(health))
        // Inline images arrive base64-encoded in the request body
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
