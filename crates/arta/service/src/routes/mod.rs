//! Route table.

mod chat;
mod community;
mod insights;
mod preferences;
mod system;
mod upload;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router: `/v1` is authoritative, `/api/v1`
/// mirrors it for older clients.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/healthz", get(system::healthz))
        .route("/chat", post(chat::chat))
        .route("/insights", get(insights::get_insight).post(insights::compute_insight))
        .route("/score", get(insights::get_score))
        .route("/simulate", post(insights::simulate))
        .route("/upload-csv", post(upload::upload_csv))
        .route("/benchmarks", get(community::benchmarks))
        .route("/leaderboard", get(community::leaderboard))
        .route(
            "/preferences",
            get(preferences::get_preferences).post(preferences::update_preferences),
        );

    Router::new()
        .nest("/v1", api.clone())
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
