pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use axum::{Router, middleware as axum_middleware};

/// Full application router with request tracking and response logging.
pub fn build_router(state: ApiState, max_request_bytes: usize) -> Router {
    build_api_router(state, max_request_bytes)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
