use std::sync::Arc;

use axum::{Router, routing::post};

use shared_config::AppConfig;

use crate::handlers;

pub fn reminder_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/sms-reply", post(handlers::twilio_sms_reply))
        .with_state(state)
}
