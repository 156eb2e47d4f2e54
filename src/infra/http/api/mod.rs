pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
};

pub fn build_api_router(state: ApiState, max_request_bytes: usize) -> Router {
    Router::new()
        .route(
            "/api/reports/new",
            post(handlers::create_report).layer(DefaultBodyLimit::max(max_request_bytes)),
        )
        .route("/api/reports/quad", post(handlers::reports_in_polygon))
        .route("/api/reports/all", get(handlers::list_reports))
        .route("/api/reports/filter", get(handlers::filter_reports))
        .route("/api/reports/radius", get(handlers::reports_in_radius))
        .route("/api/reports/statistic", get(handlers::report_statistics))
        .route("/api/reports/id/{id}", get(handlers::get_report_by_id))
        .route(
            "/api/reports/{num}",
            get(handlers::get_report).delete(handlers::delete_report),
        )
        .route("/api/reports", put(handlers::update_report))
        .route(
            "/api/reports/status/{num}",
            patch(handlers::change_report_status),
        )
        .route(
            "/api/reports/rejected",
            delete(handlers::delete_rejected_reports),
        )
        .route("/media/{*key}", get(handlers::serve_media))
        .route("/health", get(handlers::health))
        .with_state(state)
}
