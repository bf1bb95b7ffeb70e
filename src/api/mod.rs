//! REST API for the insights dashboard
//!
//! The filter surface for remote callers: a filter goes in as JSON, the full
//! render comes back as JSON.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use handlers::AppState;

pub fn create_rest_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/filters", get(handlers::get_filters))
        .route("/api/v1/dashboard", post(handlers::render_dashboard))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
