use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(
            // Outermost first: the request id must exist before the trace span is built
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/recommendations", recommendation_routes())
        .route("/fairness/analyze", post(handlers::analyze_fairness))
}

fn recommendation_routes() -> Router<AppState> {
    Router::new()
        .route("/schedule", post(handlers::generate_schedule))
        .route("/cost", post(handlers::generate_cost_analysis))
        .route("/dispute", post(handlers::generate_dispute_analysis))
        .route("/analytics", post(handlers::generate_usage_analytics))
        .route("/:id/feedback", post(handlers::record_feedback))
}
