use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One voice call, keyed externally by the platform's call id. All mid-call
/// lookups go through `vapi_call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub vapi_call_id: String,
    pub direction: String,
    pub caller_phone: Option<String>,
    pub caller_name: Option<String>,
    pub patient_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub transcription: Option<String>,
    pub ai_summary: Option<String>,
    pub recording_url: Option<String>,
    pub cost: Option<f64>,
    /// The platform's ended reason, e.g. "customer-ended-call".
    pub outcome: Option<String>,
    pub structured_data: Option<Value>,
    pub caller_intent: Option<String>,
    pub caller_sentiment: Option<String>,
    pub success_evaluation: Option<String>,
    pub language: Option<String>,
    pub callback_needed: bool,
    pub callback_completed: bool,
    pub callback_notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Caller-left message captured by the assistant when the office is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voicemail {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub call_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub message: String,
    pub urgency: String,
    pub callback_requested: bool,
    pub preferred_callback_time: Option<String>,
    pub reason: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewVoicemail {
    pub call_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub message: String,
    pub urgency: String,
    pub callback_requested: bool,
    pub preferred_callback_time: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefillRequest {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub call_id: Option<Uuid>,
    pub medication_name: String,
    pub dosage: Option<String>,
    pub pharmacy_name: Option<String>,
    pub pharmacy_phone: Option<String>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub status: String,
    pub urgency: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewRefillRequest {
    pub patient_id: Option<Uuid>,
    pub call_id: Option<Uuid>,
    pub medication_name: String,
    pub dosage: Option<String>,
    pub pharmacy_name: Option<String>,
    pub pharmacy_phone: Option<String>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
}

/// Artefacts delivered with the end-of-call report.
#[derive(Debug, Clone, Default)]
pub struct EndOfCallReport {
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub summary: Option<String>,
    pub duration_seconds: Option<i64>,
    pub cost: Option<f64>,
    pub ended_reason: Option<String>,
}
