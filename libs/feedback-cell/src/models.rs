use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Quality assessment for one call. At most one row per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFeedback {
    pub id: Uuid,
    pub call_id: Uuid,
    pub practice_id: Uuid,
    pub overall_score: Option<f64>,
    pub resolution_score: Option<f64>,
    pub efficiency_score: Option<f64>,
    pub empathy_score: Option<f64>,
    pub accuracy_score: Option<f64>,
    pub was_successful: Option<bool>,
    pub failure_point: Option<String>,
    pub failure_reason: Option<String>,
    pub improvement_suggestion: Option<String>,
    pub call_complexity: Option<String>,
    pub language_detected: Option<String>,
    pub caller_dropped: bool,
    pub raw_analysis: Option<Value>,
    pub prompt_version: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A versioned system prompt. At most one active version per practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub version: i32,
    pub prompt_text: String,
    pub change_reason: Option<String>,
    pub change_diff: Option<String>,
    pub is_active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub total_calls: i32,
    pub successful_calls: i32,
    pub avg_score: Option<f64>,
    pub booking_rate: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A recurring issue detected across recent calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackInsight {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub insight_type: String,
    pub category: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub suggested_fix: Option<String>,
    pub affected_calls: i32,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Parsed model (or fallback) analysis of a single call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CallAnalysis {
    pub overall_score: Option<f64>,
    pub resolution_score: Option<f64>,
    pub efficiency_score: Option<f64>,
    pub empathy_score: Option<f64>,
    pub accuracy_score: Option<f64>,
    pub was_successful: Option<bool>,
    pub failure_point: Option<String>,
    pub failure_reason: Option<String>,
    pub improvement_suggestion: Option<String>,
    pub call_complexity: Option<String>,
    #[serde(default)]
    pub caller_dropped: bool,
    #[serde(default)]
    pub key_observations: Vec<String>,
}

/// Result of a prompt improvement generation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptImprovement {
    pub improved_prompt: String,
    #[serde(default)]
    pub changes_made: Vec<String>,
    pub expected_impact: Option<String>,
    #[serde(default)]
    pub current_version: i32,
    #[serde(default)]
    pub insight_ids: Vec<Uuid>,
}
