use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// UI Routes - server-rendered pages
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new().route("/share/{shareable_id}", get(handlers::ui::share_page))
}

// API Routes - JSON endpoints used by the client
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Translation and execution
            .route("/translate", post(handlers::api::translate))
            .route("/execute", post(handlers::api::execute))
            .route("/explain", post(handlers::api::explain))
            .route("/optimize", post(handlers::api::optimize))
            // Query history
            .route(
                "/queries",
                get(handlers::api::list_queries).delete(handlers::api::clear_queries),
            )
            .route("/queries/saved", get(handlers::api::saved_queries))
            .route(
                "/queries/{id}",
                get(handlers::api::get_query)
                    .patch(handlers::api::update_query)
                    .delete(handlers::api::delete_query),
            )
            // Visualizations and sharing
            .route("/visualizations", post(handlers::api::create_visualization))
            .route(
                "/visualizations/{id}",
                get(handlers::api::get_visualization).delete(handlers::api::delete_visualization),
            )
            .route(
                "/visualizations/query/{query_id}",
                get(handlers::api::visualizations_for_query),
            )
            .route("/share/{shareable_id}", get(handlers::api::shared_visualization))
            // Database
            .route("/database/status", get(handlers::api::database_status))
            .route("/schema", get(handlers::api::get_schema))
            // Data export
            .route("/export/{format}", post(handlers::api::export_data)),
    )
}
