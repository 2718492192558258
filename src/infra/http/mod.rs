mod api;
mod middleware;
mod public;

pub use api::{ApiError, ApiErrorBody, SummaryBody};
pub use public::{PIXEL_GIF, pixel_response};

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::{summary::SummaryService, tracking::TrackingService};

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub tracking: Arc<TrackingService>,
    pub summary: Arc<SummaryService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/img", get(public::tracking_pixel))
        .route("/api/summarize", post(api::summarize))
        .route("/api/models", get(api::list_models))
        .route("/_health", get(public::health))
        .fallback(public::fallback)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
