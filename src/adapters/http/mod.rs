pub mod error;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use tower_http::trace::TraceLayer;
use crate::adapters::http::state::HttpState;

pub fn router(state: HttpState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/api/status", get(routes::status))
        .route("/api/config", get(routes::get_config))
        .route("/api/predict/json", post(routes::predict_json))
        .route("/api/predict/image", post(routes::predict_image))
        .route("/api/sessions", post(routes::create_session))
        .route("/api/sessions/:id", get(routes::get_session).delete(routes::close_session))
        .route("/api/sessions/:id/mode", post(routes::select_mode))
        .route("/api/sessions/:id/confidence", post(routes::set_confidence))
        .route("/api/sessions/:id/reset", post(routes::reset_session))
        .route("/api/sessions/:id/image", post(routes::process_image).get(routes::processed_image))
        .route("/api/sessions/:id/video", post(routes::process_video).get(routes::processed_video))
        .route("/api/faults/:id", get(routes::get_fault))
        .layer(upload_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
