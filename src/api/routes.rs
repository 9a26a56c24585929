//! API route definitions

use super::handlers;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/schema", get(handlers::get_schema))
        .route("/api/ask", post(handlers::ask))
        .route("/api/cypher", post(handlers::translate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
