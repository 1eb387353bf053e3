use std::sync::Arc;

use axum::{Router, routing::get};

use shared_config::AppConfig;

use crate::handlers;

pub fn waitlist_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/stats", get(handlers::waitlist_stats))
        .with_state(state)
}
