use anyhow::{Result, anyhow};
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use call_cell::models::Call;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::practice::PracticeConfig;
use shared_utils::timefmt::format_ts_utc;

use crate::models::{CallAnalysis, CallFeedback, FeedbackInsight, PromptImprovement, PromptVersion};
use crate::services::llm::LlmClient;

/// Calls shorter than this are wrong numbers or instant hangups.
const MIN_ANALYSIS_DURATION_SECONDS: i64 = 5;

/// Transcript text sent to the model is capped.
const MAX_TRANSCRIPT_CHARS: usize = 8000;

/// Pattern detection runs every N analysed calls, or immediately on a
/// score below the alarm threshold.
const PATTERN_DETECTION_EVERY: i64 = 10;
const ALARM_SCORE: f64 = 0.3;

const CALL_ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a quality analyst for an AI medical receptionist.
Analyze this call transcript and data to score quality and identify improvements.

Return JSON with these fields:
{
  "overall_score": 0.0-1.0,
  "resolution_score": 0.0-1.0 (did caller's need get resolved?),
  "efficiency_score": 0.0-1.0 (how quickly and smoothly?),
  "empathy_score": 0.0-1.0 (was the assistant warm, patient, caring?),
  "accuracy_score": 0.0-1.0 (were tool calls and info correct?),
  "was_successful": true/false,
  "failure_point": null or string (where did it go wrong? e.g. "dob_collection", "booking_confirmation", "language_switch", "greeting"),
  "failure_reason": null or string (why? be specific),
  "improvement_suggestion": null or string (concrete prompt change to fix this),
  "call_complexity": "simple"/"moderate"/"complex",
  "caller_dropped": true/false (did caller hang up frustrated?),
  "key_observations": ["observation 1", "observation 2"]
}

Scoring guide:
- 0.9-1.0: Excellent - resolved perfectly, warm, efficient
- 0.7-0.89: Good - resolved with minor issues
- 0.5-0.69: Needs improvement - resolved but awkwardly
- 0.3-0.49: Poor - partially resolved or caller frustrated
- 0.0-0.29: Failed - caller need unresolved or call dropped

Be honest and specific. Focus on actionable improvements."#;

const PATTERN_DETECTION_SYSTEM_PROMPT: &str = r#"You are a quality improvement analyst for an AI medical receptionist.
You're reviewing multiple call feedback records to detect patterns.

Identify recurring issues and opportunities for improvement.
Return JSON:
{
  "insights": [
    {
      "type": "failure_pattern" | "improvement_opportunity" | "language_issue" | "flow_optimization",
      "category": "booking" | "greeting" | "scheduling" | "transfer" | "spanish" | "data_collection" | "general",
      "severity": "low" | "medium" | "high" | "critical",
      "title": "Short descriptive title",
      "description": "Detailed description of the pattern",
      "suggested_fix": "Specific prompt change to address this",
      "affected_call_count": number
    }
  ]
}

Focus on patterns that appear in 3+ calls. Be specific about prompt changes."#;

const PROMPT_IMPROVEMENT_SYSTEM_PROMPT: &str = r#"You are a prompt engineer optimizing an AI medical receptionist.
Given the current system prompt and the insights from call analysis, generate an improved prompt.

Rules:
1. Keep the same overall structure and personality
2. Only modify sections relevant to the insights
3. Be specific about what changed and why
4. The prompt should be in the same language/format as the original
5. Don't remove any existing tool call instructions
6. Keep it natural and conversational

Return JSON:
{
  "improved_prompt": "The full improved system prompt text",
  "changes_made": ["Change 1 description", "Change 2 description"],
  "expected_impact": "What improvement to expect"
}"#;

pub struct FeedbackService {
    supabase: SupabaseClient,
    llm: LlmClient,
    config: AppConfig,
}

impl FeedbackService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            llm: LlmClient::new(config),
            config: config.clone(),
        }
    }

    // ==========================================================================
    // 1. PER-CALL QUALITY ANALYSIS
    // ==========================================================================

    /// Analyze one call and persist a CallFeedback row. Skips very short
    /// calls and calls that already have feedback. Falls back to the
    /// deterministic scorer when the model is unreachable.
    pub async fn analyze_call_quality(&self, call_id: Uuid) -> Result<Option<CallFeedback>> {
        let calls: Vec<Call> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/calls?id=eq.{}&limit=1", call_id),
            None,
        ).await?;
        let Some(call) = calls.into_iter().next() else {
            return Ok(None);
        };

        if call.duration_seconds.map(|d| d < MIN_ANALYSIS_DURATION_SECONDS).unwrap_or(false) {
            return Ok(None);
        }

        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/call_feedback?call_id=eq.{}&select=id&limit=1", call_id),
            None,
        ).await?;
        if !existing.is_empty() {
            return Ok(None);
        }

        let user_prompt = build_analysis_prompt(&call);
        let raw = self.llm.chat_json(CALL_ANALYSIS_SYSTEM_PROMPT, &user_prompt).await;

        let (analysis, raw_analysis) = match raw {
            Some(value) => {
                let parsed: CallAnalysis = serde_json::from_value(value.clone())
                    .unwrap_or_else(|_| basic_scoring(&call));
                (parsed, Some(value))
            }
            None => {
                let fallback = basic_scoring(&call);
                let raw = serde_json::to_value(&fallback).ok();
                (fallback, raw)
            }
        };

        let overall_score = analysis.overall_score.map(|s| s.clamp(0.0, 1.0));

        let current_version = self.active_prompt_version(call.practice_id).await?
            .map(|pv| pv.version);

        let language = call.language.clone()
            .or_else(|| {
                call.structured_data.as_ref()
                    .and_then(|d| d.get("language"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| "en".to_string());

        let feedback: CallFeedback = self.supabase.insert_returning(
            "call_feedback",
            json!({
                "call_id": call.id,
                "practice_id": call.practice_id,
                "overall_score": overall_score,
                "resolution_score": analysis.resolution_score,
                "efficiency_score": analysis.efficiency_score,
                "empathy_score": analysis.empathy_score,
                "accuracy_score": analysis.accuracy_score,
                "was_successful": analysis.was_successful,
                "failure_point": analysis.failure_point,
                "failure_reason": analysis.failure_reason,
                "improvement_suggestion": analysis.improvement_suggestion,
                "call_complexity": analysis.call_complexity,
                "language_detected": language,
                "caller_dropped": analysis.caller_dropped,
                "raw_analysis": raw_analysis,
                "prompt_version": current_version,
            }),
        ).await?;

        if let Some(version) = current_version {
            if let Err(e) = self.update_prompt_metrics(call.practice_id, version).await {
                warn!("analyze_call_quality: metric update failed: {}", e);
            }
        }

        info!(
            "feedback: analyzed call {} - score={:?} success={:?} failure={:?}",
            call.id, overall_score, analysis.was_successful, analysis.failure_point,
        );

        Ok(Some(feedback))
    }

    // ==========================================================================
    // 2. PATTERN DETECTION
    // ==========================================================================

    /// Aggregate the last 24 hours of feedback into new insights,
    /// de-duplicated against open insights with the same title.
    pub async fn detect_patterns(&self, practice_id: Uuid) -> Result<Vec<FeedbackInsight>> {
        let cutoff = Utc::now() - ChronoDuration::hours(24);

        let feedbacks: Vec<CallFeedback> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/call_feedback?practice_id=eq.{}&created_at=gte.{}&order=created_at.desc&limit=100",
                practice_id,
                format_ts_utc(cutoff),
            ),
            None,
        ).await?;

        if feedbacks.len() < 3 {
            info!(
                "feedback: not enough calls ({}) for pattern detection",
                feedbacks.len(),
            );
            return Ok(Vec::new());
        }

        let user_prompt = build_pattern_prompt(&feedbacks);
        let Some(analysis) = self.llm.chat_json(PATTERN_DETECTION_SYSTEM_PROMPT, &user_prompt).await else {
            return Ok(Vec::new());
        };

        let Some(insights) = analysis.get("insights").and_then(|v| v.as_array()) else {
            return Ok(Vec::new());
        };

        let mut created = Vec::new();
        for insight in insights {
            let Some(title) = insight.get("title").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(description) = insight.get("description").and_then(|v| v.as_str()) else {
                continue;
            };

            let duplicates: Vec<Value> = self.supabase.request(
                Method::GET,
                &format!(
                    "/rest/v1/feedback_insights?practice_id=eq.{}&title=eq.{}&status=eq.open&select=id&limit=1",
                    practice_id,
                    urlencoding::encode(title),
                ),
                None,
            ).await?;
            if !duplicates.is_empty() {
                continue;
            }

            let row: FeedbackInsight = self.supabase.insert_returning(
                "feedback_insights",
                json!({
                    "practice_id": practice_id,
                    "insight_type": insight.get("type").and_then(|v| v.as_str()).unwrap_or("improvement_opportunity"),
                    "category": insight.get("category").and_then(|v| v.as_str()).unwrap_or("general"),
                    "severity": insight.get("severity").and_then(|v| v.as_str()).unwrap_or("medium"),
                    "title": title,
                    "description": description,
                    "suggested_fix": insight.get("suggested_fix").and_then(|v| v.as_str()),
                    "affected_calls": insight.get("affected_call_count").and_then(|v| v.as_i64()).unwrap_or(0),
                    "status": "open",
                }),
            ).await?;
            created.push(row);
        }

        if !created.is_empty() {
            info!(
                "feedback: detected {} new insights for practice {}",
                created.len(), practice_id,
            );
        }

        Ok(created)
    }

    // ==========================================================================
    // 3. PROMPT IMPROVEMENT
    // ==========================================================================

    /// Generate an improved system prompt from open insights. Does NOT
    /// apply it; the suggestion goes to staff for review.
    pub async fn generate_prompt_improvement(
        &self,
        practice_id: Uuid,
    ) -> Result<Option<PromptImprovement>> {
        let current_version = self.active_prompt_version(practice_id).await?;

        let current_prompt = match &current_version {
            Some(pv) => pv.prompt_text.clone(),
            None => match self.fetch_current_vapi_prompt(practice_id).await {
                Some(prompt) => prompt,
                None => return Ok(None),
            },
        };

        let insights: Vec<FeedbackInsight> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/feedback_insights?practice_id=eq.{}&status=eq.open&order=created_at.desc&limit=10",
                practice_id,
            ),
            None,
        ).await?;

        if insights.is_empty() {
            return Ok(None);
        }

        let insights_text = insights.iter()
            .map(|i| format!(
                "- [{}] {}: {}\n  Suggested fix: {}",
                i.severity, i.title, i.description,
                i.suggested_fix.as_deref().unwrap_or("(none)"),
            ))
            .collect::<Vec<_>>()
            .join("\n");

        let truncated_prompt: String = current_prompt.chars().take(6000).collect();
        let user_prompt = format!(
            "Current system prompt:\n---\n{}\n---\n\nInsights from call analysis:\n{}\n\n\
             Generate an improved version of the system prompt that addresses these insights.",
            truncated_prompt, insights_text,
        );

        let Some(result) = self.llm.chat_json(PROMPT_IMPROVEMENT_SYSTEM_PROMPT, &user_prompt).await else {
            return Ok(None);
        };

        let mut improvement: PromptImprovement = serde_json::from_value(result)
            .map_err(|e| anyhow!("Prompt improvement response malformed: {}", e))?;
        improvement.current_version = current_version.map(|pv| pv.version).unwrap_or(0);
        improvement.insight_ids = insights.iter().map(|i| i.id).collect();

        Ok(Some(improvement))
    }

    /// Save a new prompt version atomically: deactivate the current active
    /// version, then insert version = max + 1 as active.
    pub async fn apply_prompt_improvement(
        &self,
        practice_id: Uuid,
        new_prompt: &str,
        change_reason: &str,
        change_diff: Option<&str>,
    ) -> Result<PromptVersion> {
        #[derive(serde::Deserialize)]
        struct VersionRow {
            version: i32,
        }

        let versions: Vec<VersionRow> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/prompt_versions?practice_id=eq.{}&select=version&order=version.desc&limit=1",
                practice_id,
            ),
            None,
        ).await?;
        let max_version = versions.first().map(|v| v.version).unwrap_or(0);

        let now = Utc::now();
        let _: Vec<Value> = self.supabase.update_returning(
            &format!(
                "/rest/v1/prompt_versions?practice_id=eq.{}&is_active=eq.true",
                practice_id,
            ),
            json!({"is_active": false, "deactivated_at": now}),
        ).await?;

        let new_version: PromptVersion = self.supabase.insert_returning(
            "prompt_versions",
            json!({
                "practice_id": practice_id,
                "version": max_version + 1,
                "prompt_text": new_prompt,
                "change_reason": change_reason,
                "change_diff": change_diff,
                "is_active": true,
                "activated_at": now,
                "total_calls": 0,
                "successful_calls": 0,
            }),
        ).await?;

        info!(
            "feedback: created prompt version {} for practice {}: {}",
            new_version.version, practice_id, change_reason,
        );

        Ok(new_version)
    }

    /// Push a prompt to the voice platform assistant. Best-effort.
    pub async fn push_prompt_to_vapi(&self, practice_id: Uuid, prompt_text: &str) -> bool {
        let Some(config) = self.practice_config(practice_id).await else {
            return false;
        };
        let Some(assistant_id) = config.vapi_assistant_id.as_deref() else {
            warn!("feedback: no voice assistant id for practice {}", practice_id);
            return false;
        };

        let api_key = config.vapi_api_key.clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| self.config.vapi_api_key.clone());
        if api_key.is_empty() {
            warn!("feedback: no voice platform API key for practice {}", practice_id);
            return false;
        }

        let client = reqwest::Client::new();
        let url = format!("{}/assistant/{}", self.config.vapi_api_base, assistant_id);
        let result = client
            .patch(&url)
            .bearer_auth(&api_key)
            .timeout(std::time::Duration::from_secs(15))
            .json(&json!({
                "model": {
                    "messages": [
                        {"role": "system", "content": prompt_text}
                    ]
                }
            }))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                info!("feedback: pushed prompt to assistant {}", assistant_id);
                true
            }
            Ok(resp) => {
                warn!("feedback: failed to push prompt, status {}", resp.status());
                false
            }
            Err(e) => {
                warn!("feedback: failed to push prompt: {}", e);
                false
            }
        }
    }

    async fn fetch_current_vapi_prompt(&self, practice_id: Uuid) -> Option<String> {
        let config = self.practice_config(practice_id).await?;
        let assistant_id = config.vapi_assistant_id.as_deref()?;

        let api_key = config.vapi_api_key.clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| self.config.vapi_api_key.clone());
        if api_key.is_empty() {
            return None;
        }

        let client = reqwest::Client::new();
        let url = format!("{}/assistant/{}", self.config.vapi_api_base, assistant_id);
        let response = client
            .get(&url)
            .bearer_auth(&api_key)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let data: Value = response.json().await.ok()?;
        data.pointer("/model/messages")?
            .as_array()?
            .iter()
            .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("system"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
    }

    // ==========================================================================
    // 4. PROMPT METRICS
    // ==========================================================================

    /// Recompute rolling metrics for one prompt version from its feedback.
    pub async fn update_prompt_metrics(&self, practice_id: Uuid, version: i32) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct MetricRow {
            call_id: Uuid,
            overall_score: Option<f64>,
            was_successful: Option<bool>,
        }

        let rows: Vec<MetricRow> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/call_feedback?practice_id=eq.{}&prompt_version=eq.{}&select=call_id,overall_score,was_successful",
                practice_id, version,
            ),
            None,
        ).await?;

        if rows.is_empty() {
            return Ok(());
        }

        let total_calls = rows.len() as i64;
        let successful_calls = rows.iter()
            .filter(|r| r.was_successful.unwrap_or(false))
            .count() as i64;
        let scored: Vec<f64> = rows.iter().filter_map(|r| r.overall_score).collect();
        let avg_score = if scored.is_empty() {
            None
        } else {
            Some(scored.iter().sum::<f64>() / scored.len() as f64)
        };

        // Booking rate over the calls that reached this version
        let call_ids = rows.iter()
            .map(|r| r.call_id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let booked: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/calls?id=in.({})&appointment_id=not.is.null&select=id",
                call_ids,
            ),
            None,
        ).await?;
        let booking_rate = booked.len() as f64 / total_calls as f64;

        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!(
                "/rest/v1/prompt_versions?practice_id=eq.{}&version=eq.{}",
                practice_id, version,
            ),
            Some(json!({
                "total_calls": total_calls,
                "successful_calls": successful_calls,
                "avg_score": avg_score,
                "booking_rate": booking_rate,
            })),
        ).await?;

        Ok(())
    }

    // ==========================================================================
    // 5. ENTRY POINT
    // ==========================================================================

    /// Analyze a completed call, then run pattern detection every tenth
    /// call or immediately after a bad one.
    pub async fn process_call_feedback(&self, call_id: Uuid, practice_id: Uuid) -> Result<()> {
        let Some(feedback) = self.analyze_call_quality(call_id).await? else {
            return Ok(());
        };

        let all: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/call_feedback?practice_id=eq.{}&select=id&limit=1000",
                practice_id,
            ),
            None,
        ).await?;
        let total_feedback = all.len() as i64;

        let bad_call = feedback.overall_score.map(|s| s < ALARM_SCORE).unwrap_or(false);
        if total_feedback % PATTERN_DETECTION_EVERY == 0 || bad_call {
            self.detect_patterns(practice_id).await?;
        }

        Ok(())
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    pub async fn active_prompt_version(&self, practice_id: Uuid) -> Result<Option<PromptVersion>> {
        let rows: Vec<PromptVersion> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/prompt_versions?practice_id=eq.{}&is_active=eq.true&limit=1",
                practice_id,
            ),
            None,
        ).await?;
        Ok(rows.into_iter().next())
    }

    async fn practice_config(&self, practice_id: Uuid) -> Option<PracticeConfig> {
        let rows: Vec<PracticeConfig> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practice_configs?practice_id=eq.{}&limit=1", practice_id),
            None,
        ).await.ok()?;
        rows.into_iter().next()
    }
}

fn build_analysis_prompt(call: &Call) -> String {
    let transcript = call.transcription.as_deref().unwrap_or("(no transcript available)");
    let truncated: String = transcript.chars().take(MAX_TRANSCRIPT_CHARS).collect();
    let structured = call.structured_data.as_ref()
        .map(|d| serde_json::to_string_pretty(d).unwrap_or_default())
        .unwrap_or_else(|| "(none)".to_string());

    format!(
        "Call ID: {}\nDuration: {} seconds\nEnd reason: {}\nLanguage: {}\nCaller: {}\n\
         Platform success evaluation: {}\n\nStructured data extracted by the platform:\n{}\n\n\
         AI Summary: {}\n\nTranscript:\n{}",
        call.id,
        call.duration_seconds.map(|d| d.to_string()).unwrap_or_else(|| "unknown".to_string()),
        call.outcome.as_deref().unwrap_or("unknown"),
        call.language.as_deref().unwrap_or("en"),
        call.caller_name.as_deref().unwrap_or("unknown"),
        call.success_evaluation.as_deref().unwrap_or("unknown"),
        structured,
        call.ai_summary.as_deref().unwrap_or("(none)"),
        truncated,
    )
}

fn build_pattern_prompt(feedbacks: &[CallFeedback]) -> String {
    let summaries: Vec<Value> = feedbacks.iter()
        .map(|fb| json!({
            "call_id": fb.call_id,
            "score": fb.overall_score,
            "was_successful": fb.was_successful,
            "failure_point": fb.failure_point,
            "failure_reason": fb.failure_reason,
            "improvement_suggestion": fb.improvement_suggestion,
            "language": fb.language_detected,
            "complexity": fb.call_complexity,
            "caller_dropped": fb.caller_dropped,
        }))
        .collect();

    let successful = feedbacks.iter()
        .filter(|f| f.was_successful.unwrap_or(false))
        .count();
    let avg_score = feedbacks.iter()
        .filter_map(|f| f.overall_score)
        .sum::<f64>() / feedbacks.len() as f64;
    let dropouts = feedbacks.iter().filter(|f| f.caller_dropped).count();
    let spanish = feedbacks.iter()
        .filter(|f| f.language_detected.as_deref() == Some("es"))
        .count();

    format!(
        "Analyzing {} recent calls for practice.\n\nCall feedback data:\n{}\n\n\
         Aggregate stats:\n- Total calls: {}\n- Successful: {}\n- Failed: {}\n\
         - Average score: {:.2}\n- Caller dropouts: {}\n- Spanish calls: {}",
        feedbacks.len(),
        serde_json::to_string_pretty(&summaries).unwrap_or_default(),
        feedbacks.len(),
        successful,
        feedbacks.len() - successful,
        avg_score,
        dropouts,
        spanish,
    )
}

/// Deterministic fallback scoring from platform data when the model is
/// unavailable.
pub fn basic_scoring(call: &Call) -> CallAnalysis {
    const GOOD_ENDINGS: [&str; 2] = ["assistant-ended-call", "customer-ended-call"];
    const BAD_ENDINGS: [&str; 4] = [
        "customer-did-not-answer",
        "customer-busy",
        "assistant-error",
        "phone-call-provider-closed-websocket",
    ];

    let mut score: f64 = 0.5;
    let outcome = call.outcome.as_deref().unwrap_or("");

    if GOOD_ENDINGS.contains(&outcome) {
        score += 0.2;
    } else if BAD_ENDINGS.contains(&outcome) {
        score -= 0.3;
    }

    if let Some(duration) = call.duration_seconds {
        if duration > 30 {
            score += 0.1;
        }
        if duration < 15 {
            score -= 0.2;
        }
    }

    match call.success_evaluation.as_deref() {
        Some("true") => score += 0.2,
        Some("false") => score -= 0.2,
        _ => {}
    }

    if let Some(structured) = &call.structured_data {
        if structured.get("appointment_booked").and_then(|v| v.as_bool()).unwrap_or(false) {
            score += 0.1;
        }
        match structured.get("caller_sentiment").and_then(|v| v.as_str()) {
            Some("frustrated") => score -= 0.2,
            Some("positive") => score += 0.1,
            _ => {}
        }
    }

    let score = (score.clamp(0.0, 1.0) * 100.0).round() / 100.0;
    let was_successful = score >= 0.5;

    let failure_point = if was_successful {
        None
    } else if BAD_ENDINGS.contains(&outcome) {
        Some("call_connection".to_string())
    } else if call.duration_seconds.map(|d| d < 15).unwrap_or(false) {
        Some("early_dropout".to_string())
    } else {
        Some("unknown".to_string())
    };

    CallAnalysis {
        overall_score: Some(score),
        resolution_score: Some(score),
        efficiency_score: Some(0.5),
        empathy_score: Some(0.5),
        accuracy_score: Some(0.5),
        was_successful: Some(was_successful),
        failure_point,
        failure_reason: None,
        improvement_suggestion: None,
        call_complexity: Some("simple".to_string()),
        caller_dropped: BAD_ENDINGS.contains(&outcome),
        key_observations: Vec::new(),
    }
}
