use std::sync::Arc;

use axum::{Router, routing::{get, post}};

use shared_config::AppConfig;

use crate::handlers;

pub fn training_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{session_id}", get(handlers::get_session))
        .route("/sessions/{session_id}/transcripts", post(handlers::import_transcripts))
        .route("/sessions/{session_id}/recordings", post(handlers::upload_recording))
        .route("/sessions/{session_id}/process", post(handlers::process_session))
        .route("/sessions/{session_id}/generate-prompt", post(handlers::generate_prompt))
        .route("/sessions/{session_id}/apply-prompt", post(handlers::apply_prompt))
        .with_state(state)
}
