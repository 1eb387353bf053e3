use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::WaitlistStats;
use crate::services::waitlist::WaitlistService;

#[derive(Debug, Deserialize)]
pub struct PracticeScope {
    pub practice_id: Uuid,
}

/// Waitlist conversion metrics for the staff dashboard.
pub async fn waitlist_stats(
    State(state): State<Arc<AppConfig>>,
    Query(scope): Query<PracticeScope>,
) -> Result<Json<WaitlistStats>, AppError> {
    let service = WaitlistService::new(&state);
    let stats = service.waitlist_stats(scope.practice_id)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(stats))
}
