use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        // Recommendations
        .route("/api/recommendations", post(handlers::recommend))
        .route("/api/recommendations/feedback", post(handlers::submit_feedback))
        .route("/api/recommendations/filters", get(handlers::list_filters))
        // Auth
        .route("/api/auth/signin", get(handlers::sign_in))
        .route("/api/auth/callback", get(handlers::auth_callback))
        .route("/api/auth/session", get(handlers::get_session))
        .route(
            "/api/auth/signout",
            get(handlers::sign_out).post(handlers::sign_out),
        )
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
