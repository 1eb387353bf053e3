use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use reminder_cell::router::reminder_routes;
use shared_config::AppConfig;
use training_cell::router::training_routes;
use voice_webhook_cell::router::webhook_routes;
use waitlist_cell::router::waitlist_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "AI Receptionist API is running!" }))
        .nest("/webhooks", webhook_routes(state.clone()))
        .nest("/reminders", reminder_routes(state.clone()))
        .nest("/waitlist", waitlist_routes(state.clone()))
        .nest("/training", training_routes(state.clone()))
}
