use std::sync::Arc;

use axum::{Router, routing::{get, post}};

use shared_config::AppConfig;

use crate::handlers;

pub fn webhook_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/vapi", post(handlers::vapi_webhook))
        .route("/vapi/health", get(handlers::vapi_webhook_health))
        .with_state(state)
}
