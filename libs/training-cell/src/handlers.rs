use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::TranscriptImport;
use crate::services::training::TrainingService;

#[derive(Debug, Deserialize)]
pub struct PracticeScope {
    pub practice_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub practice_id: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportTranscriptsRequest {
    pub practice_id: Uuid,
    pub transcripts: Vec<TranscriptImport>,
}

pub async fn create_session(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = TrainingService::new(&state);
    let session = service.create_session(request.practice_id, request.name.as_deref())
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({"session": session})))
}

pub async fn get_session(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    Query(scope): Query<PracticeScope>,
) -> Result<Json<Value>, AppError> {
    let service = TrainingService::new(&state);
    let session = service.get_session(scope.practice_id, session_id)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Training session not found".to_string()))?;

    let recordings = service.session_recordings(session_id)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({"session": session, "recordings": recordings})))
}

pub async fn import_transcripts(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ImportTranscriptsRequest>,
) -> Result<Json<Value>, AppError> {
    if request.transcripts.is_empty() {
        return Err(AppError::ValidationError("At least one transcript is required".to_string()));
    }

    let service = TrainingService::new(&state);
    let imported = service.import_transcripts(request.practice_id, session_id, request.transcripts)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({"imported": imported})))
}

pub async fn upload_recording(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    Query(scope): Query<PracticeScope>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let service = TrainingService::new(&state);
    let mut uploaded = Vec::new();

    while let Some(field) = multipart.next_field().await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart payload: {}", e)))?
    {
        let filename = field.file_name().unwrap_or("recording.mp3").to_string();
        let bytes = field.bytes().await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;

        match service.upload_and_transcribe(
            scope.practice_id, session_id, &filename, bytes.to_vec(),
        ).await {
            Ok(recording) => uploaded.push(json!({
                "recording_id": recording.id,
                "filename": filename,
                "status": recording.status,
            })),
            Err(e) => {
                error!("upload_recording: transcription failed for {}: {}", filename, e);
                uploaded.push(json!({
                    "filename": filename,
                    "status": "failed",
                }));
            }
        }
    }

    Ok(Json(json!({"uploaded": uploaded})))
}

pub async fn process_session(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    Query(scope): Query<PracticeScope>,
) -> Result<Json<Value>, AppError> {
    let service = TrainingService::new(&state);
    let session = service.process_session(scope.practice_id, session_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({"session": session})))
}

pub async fn generate_prompt(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    Query(scope): Query<PracticeScope>,
) -> Result<Json<Value>, AppError> {
    let service = TrainingService::new(&state);
    let prompt = service.generate_training_prompt(scope.practice_id, session_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    match prompt {
        Some(prompt) => Ok(Json(json!({"generated_prompt": prompt}))),
        None => Err(AppError::ValidationError(
            "Session has no aggregated insights to generate a prompt from".to_string(),
        )),
    }
}

pub async fn apply_prompt(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    Query(scope): Query<PracticeScope>,
) -> Result<Json<Value>, AppError> {
    let service = TrainingService::new(&state);
    let version = service.apply_training_prompt(scope.practice_id, session_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "applied_version": version.version,
        "is_active": version.is_active,
    })))
}
