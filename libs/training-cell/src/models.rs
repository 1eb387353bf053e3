use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One batch of historical call recordings being mined for prompt
/// improvements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub name: Option<String>,
    pub status: String,
    pub aggregated_insights: Option<Value>,
    pub generated_prompt: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRecording {
    pub id: Uuid,
    pub session_id: Uuid,
    pub practice_id: Uuid,
    pub original_filename: Option<String>,
    pub transcript: Option<String>,
    pub language_detected: Option<String>,
    pub duration_seconds: Option<f64>,
    pub analysis: Option<Value>,
    pub status: String,
    pub error_message: Option<String>,
}

/// Bulk import payload item: an already-transcribed call.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptImport {
    pub transcript: String,
    pub language: Option<String>,
}

/// Output of the speech-to-text API.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
    pub duration_seconds: Option<f64>,
}
