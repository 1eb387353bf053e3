use anyhow::{Result, anyhow};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use feedback_cell::models::PromptVersion;
use feedback_cell::services::analyzer::FeedbackService;
use feedback_cell::services::llm::LlmClient;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{TrainingRecording, TrainingSession, Transcription, TranscriptImport};

/// Long transcripts are truncated before analysis.
const MAX_ANALYSIS_CHARS: usize = 12_000;

/// Aggregation payload ceiling.
const MAX_AGGREGATION_CHARS: usize = 30_000;

const TRANSCRIPT_ANALYSIS_SYSTEM_PROMPT: &str = r#"You are analyzing a recorded call to a medical office front desk.
Extract structured patterns from the transcript. Return JSON:
{
  "caller_intent": "booking" | "cancellation" | "reschedule" | "billing" | "refill" | "insurance" | "other",
  "caller_sentiment": "positive" | "neutral" | "frustrated",
  "call_outcome": "resolved" | "partially_resolved" | "unresolved",
  "language": "en" | "es" | other,
  "key_phrases": ["phrase 1", "phrase 2"],
  "staff_techniques": ["technique the receptionist used that worked"],
  "friction_points": ["moment where the call stalled or the caller repeated themselves"]
}"#;

const AGGREGATION_SYSTEM_PROMPT: &str = r#"You are synthesizing analyses of many front-desk calls for a medical office.
Produce a comprehensive summary. Return JSON:
{
  "common_intents": [{"intent": "...", "count": number}],
  "sentiment_breakdown": {"positive": number, "neutral": number, "frustrated": number},
  "languages": {"en": number, "es": number},
  "effective_techniques": ["technique observed across calls"],
  "recurring_friction": ["friction pattern observed across calls"],
  "recommendations": ["concrete change for the AI receptionist prompt"]
}"#;

const TRAINING_PROMPT_SYSTEM_PROMPT: &str = r#"You are a prompt engineer for an AI medical receptionist.
Given the current system prompt and aggregated insights mined from real front-desk calls,
produce an improved system prompt that adopts the effective techniques and removes the
recurring friction. Keep the structure, personality, and every tool instruction intact.
Return JSON:
{
  "improved_prompt": "the full improved system prompt text",
  "changes_made": ["change 1", "change 2"]
}"#;

pub struct TrainingService {
    supabase: SupabaseClient,
    llm: LlmClient,
    feedback_service: FeedbackService,
    config: AppConfig,
}

impl TrainingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            llm: LlmClient::new(config),
            feedback_service: FeedbackService::new(config),
            config: config.clone(),
        }
    }

    // ==========================================================================
    // SESSIONS
    // ==========================================================================

    pub async fn create_session(&self, practice_id: Uuid, name: Option<&str>) -> Result<TrainingSession> {
        let session: TrainingSession = self.supabase.insert_returning(
            "training_sessions",
            json!({
                "practice_id": practice_id,
                "name": name,
                "status": "created",
            }),
        ).await?;

        info!("training: created session {} for practice {}", session.id, practice_id);
        Ok(session)
    }

    pub async fn get_session(&self, practice_id: Uuid, session_id: Uuid) -> Result<Option<TrainingSession>> {
        let rows: Vec<TrainingSession> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/training_sessions?id=eq.{}&practice_id=eq.{}&limit=1",
                session_id, practice_id,
            ),
            None,
        ).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn session_recordings(&self, session_id: Uuid) -> Result<Vec<TrainingRecording>> {
        let rows: Vec<TrainingRecording> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/training_recordings?session_id=eq.{}", session_id),
            None,
        ).await?;
        Ok(rows)
    }

    // ==========================================================================
    // INGESTION
    // ==========================================================================

    /// Bulk import of already-transcribed calls.
    pub async fn import_transcripts(
        &self,
        practice_id: Uuid,
        session_id: Uuid,
        items: Vec<TranscriptImport>,
    ) -> Result<usize> {
        let mut imported = 0;
        for item in items {
            if item.transcript.trim().is_empty() {
                continue;
            }
            let _: TrainingRecording = self.supabase.insert_returning(
                "training_recordings",
                json!({
                    "practice_id": practice_id,
                    "session_id": session_id,
                    "transcript": item.transcript,
                    "language_detected": item.language.unwrap_or_else(|| "en".to_string()),
                    "status": "transcribed",
                }),
            ).await?;
            imported += 1;
        }

        info!("training: imported {} transcripts into session {}", imported, session_id);
        Ok(imported)
    }

    /// Transcribe uploaded audio through the speech-to-text API and store
    /// the result on a new recording row.
    pub async fn upload_and_transcribe(
        &self,
        practice_id: Uuid,
        session_id: Uuid,
        filename: &str,
        file_bytes: Vec<u8>,
    ) -> Result<TrainingRecording> {
        let recording: TrainingRecording = self.supabase.insert_returning(
            "training_recordings",
            json!({
                "practice_id": practice_id,
                "session_id": session_id,
                "original_filename": filename,
                "status": "transcribing",
            }),
        ).await?;

        match self.transcribe_audio(filename, file_bytes).await {
            Ok(transcription) => {
                let updated: Vec<TrainingRecording> = self.supabase.update_returning(
                    &format!("/rest/v1/training_recordings?id=eq.{}", recording.id),
                    json!({
                        "transcript": transcription.text,
                        "language_detected": transcription.language,
                        "duration_seconds": transcription.duration_seconds,
                        "status": "transcribed",
                    }),
                ).await?;
                updated.into_iter().next()
                    .ok_or_else(|| anyhow!("Recording update returned no rows"))
            }
            Err(e) => {
                warn!("training: transcription failed for recording {}: {}", recording.id, e);
                let _: Value = self.supabase.request(
                    Method::PATCH,
                    &format!("/rest/v1/training_recordings?id=eq.{}", recording.id),
                    Some(json!({
                        "status": "failed",
                        "error_message": format!("Transcription failed: {}", e),
                    })),
                ).await?;
                Err(e)
            }
        }
    }

    async fn transcribe_audio(&self, filename: &str, file_bytes: Vec<u8>) -> Result<Transcription> {
        if self.config.openai_api_key.is_empty() {
            return Err(anyhow!("Speech-to-text API key not configured"));
        }

        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .text("response_format", "verbose_json")
            .part("file", part);

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/v1/audio/transcriptions", self.config.openai_api_base))
            .bearer_auth(&self.config.openai_api_key)
            .multipart(form)
            .timeout(std::time::Duration::from_secs(120))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Speech-to-text API returned {}", response.status()));
        }

        let data: Value = response.json().await?;
        let text = data.get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Speech-to-text response missing text"))?
            .to_string();

        Ok(Transcription {
            text,
            language: data.get("language").and_then(|v| v.as_str()).map(String::from),
            duration_seconds: data.get("duration").and_then(|v| v.as_f64()),
        })
    }

    // ==========================================================================
    // ANALYSIS
    // ==========================================================================

    /// Analyze one transcribed recording; stores the structured analysis
    /// and moves the row to completed or failed.
    pub async fn analyze_recording(&self, recording: &TrainingRecording) -> Result<bool> {
        let Some(transcript) = recording.transcript.as_deref().filter(|t| !t.trim().is_empty()) else {
            warn!("training: recording {} has no transcript, skipping analysis", recording.id);
            return Ok(false);
        };

        let mut truncated: String = transcript.chars().take(MAX_ANALYSIS_CHARS).collect();
        if transcript.chars().count() > MAX_ANALYSIS_CHARS {
            truncated.push_str("\n\n[... transcript truncated for analysis ...]");
        }

        let user_prompt = format!(
            "Detected language: {}\n\nCall transcript:\n{}",
            recording.language_detected.as_deref().unwrap_or("en"),
            truncated,
        );

        let analysis = self.llm.chat_json(TRANSCRIPT_ANALYSIS_SYSTEM_PROMPT, &user_prompt).await;

        match analysis {
            Some(analysis) => {
                let _: Value = self.supabase.request(
                    Method::PATCH,
                    &format!("/rest/v1/training_recordings?id=eq.{}", recording.id),
                    Some(json!({"analysis": analysis, "status": "completed"})),
                ).await?;
                Ok(true)
            }
            None => {
                let _: Value = self.supabase.request(
                    Method::PATCH,
                    &format!("/rest/v1/training_recordings?id=eq.{}", recording.id),
                    Some(json!({
                        "status": "failed",
                        "error_message": "Analysis returned no usable result",
                    })),
                ).await?;
                Ok(false)
            }
        }
    }

    /// Analyze every transcribed recording in a session, then aggregate.
    pub async fn process_session(&self, practice_id: Uuid, session_id: Uuid) -> Result<TrainingSession> {
        let session = self.get_session(practice_id, session_id).await?
            .ok_or_else(|| anyhow!("Training session not found"))?;

        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/training_sessions?id=eq.{}", session.id),
            Some(json!({"status": "processing"})),
        ).await?;

        let recordings = self.session_recordings(session_id).await?;
        let mut analyzed = 0;
        for recording in recordings.iter().filter(|r| r.status == "transcribed") {
            match self.analyze_recording(recording).await {
                Ok(true) => analyzed += 1,
                Ok(false) => {}
                Err(e) => warn!("training: analysis failed for recording {}: {}", recording.id, e),
            }
        }

        info!(
            "training: session {} analyzed {} of {} recordings",
            session_id, analyzed, recordings.len(),
        );

        self.aggregate_session_insights(session_id).await?;

        let updated: Vec<TrainingSession> = self.supabase.update_returning(
            &format!("/rest/v1/training_sessions?id=eq.{}", session_id),
            json!({"status": "completed"}),
        ).await?;

        updated.into_iter().next()
            .ok_or_else(|| anyhow!("Session update returned no rows"))
    }

    /// Synthesize all completed analyses in a session into one insight
    /// document stored on the session row.
    pub async fn aggregate_session_insights(&self, session_id: Uuid) -> Result<Option<Value>> {
        let recordings: Vec<TrainingRecording> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/training_recordings?session_id=eq.{}&status=eq.completed&analysis=not.is.null",
                session_id,
            ),
            None,
        ).await?;

        if recordings.is_empty() {
            warn!("training: no completed recordings in session {} for aggregation", session_id);
            return Ok(None);
        }

        let analyses: Vec<Value> = recordings.iter()
            .map(|rec| {
                let mut entry = rec.analysis.clone().unwrap_or(json!({}));
                if let Some(map) = entry.as_object_mut() {
                    map.insert("filename".to_string(), json!(rec.original_filename));
                    map.insert("language_detected".to_string(), json!(rec.language_detected));
                    map.insert("duration_seconds".to_string(), json!(rec.duration_seconds));
                }
                entry
            })
            .collect();

        let mut user_prompt = format!(
            "Total recordings analyzed: {}\n\nIndividual call analyses:\n{}",
            analyses.len(),
            serde_json::to_string_pretty(&analyses).unwrap_or_default(),
        );
        if user_prompt.chars().count() > MAX_AGGREGATION_CHARS {
            user_prompt = user_prompt.chars().take(MAX_AGGREGATION_CHARS).collect::<String>()
                + "\n\n[... truncated due to length ...]";
        }

        let Some(insights) = self.llm.chat_json(AGGREGATION_SYSTEM_PROMPT, &user_prompt).await else {
            warn!("training: aggregation for session {} returned no usable result", session_id);
            return Ok(None);
        };

        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/training_sessions?id=eq.{}", session_id),
            Some(json!({"aggregated_insights": insights})),
        ).await?;

        info!(
            "training: aggregated insights for session {} from {} recordings",
            session_id, recordings.len(),
        );

        Ok(Some(insights))
    }

    // ==========================================================================
    // PROMPT GENERATION / APPLY
    // ==========================================================================

    /// Build an improved system prompt from the session's aggregated
    /// insights and the currently active prompt version.
    pub async fn generate_training_prompt(
        &self,
        practice_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<String>> {
        let session = self.get_session(practice_id, session_id).await?
            .ok_or_else(|| anyhow!("Training session not found"))?;

        let Some(insights) = session.aggregated_insights else {
            warn!("training: session {} has no aggregated insights, cannot generate prompt", session_id);
            return Ok(None);
        };

        let current_prompt = self.feedback_service
            .active_prompt_version(practice_id)
            .await?
            .map(|pv| pv.prompt_text)
            .unwrap_or_else(|| {
                "You are a warm, efficient AI receptionist for a medical office. \
                 Help callers book, reschedule, or cancel appointments, take messages, \
                 and answer questions about office hours."
                    .to_string()
            });

        let truncated_prompt: String = current_prompt.chars().take(6000).collect();
        let user_prompt = format!(
            "Current system prompt:\n---\n{}\n---\n\nAggregated insights from this training session:\n{}",
            truncated_prompt,
            serde_json::to_string_pretty(&insights).unwrap_or_default(),
        );

        let Some(result) = self.llm.chat_json(TRAINING_PROMPT_SYSTEM_PROMPT, &user_prompt).await else {
            return Ok(None);
        };

        let Some(prompt_text) = result.get("improved_prompt").and_then(|v| v.as_str()) else {
            warn!("training: prompt generation response missing improved_prompt");
            return Ok(None);
        };

        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/training_sessions?id=eq.{}", session_id),
            Some(json!({"generated_prompt": prompt_text})),
        ).await?;

        Ok(Some(prompt_text.to_string()))
    }

    /// Publish the generated prompt as the new active version.
    pub async fn apply_training_prompt(
        &self,
        practice_id: Uuid,
        session_id: Uuid,
    ) -> Result<PromptVersion> {
        let session = self.get_session(practice_id, session_id).await?
            .ok_or_else(|| anyhow!("Training session not found"))?;

        let prompt_text = session.generated_prompt
            .ok_or_else(|| anyhow!("Session has no generated prompt to apply"))?;

        let version = self.feedback_service.apply_prompt_improvement(
            practice_id,
            &prompt_text,
            &format!("Applied from training session {}", session_id),
            None,
        ).await?;

        // Propagating to the voice platform is best-effort
        let pushed = self.feedback_service.push_prompt_to_vapi(practice_id, &prompt_text).await;
        if !pushed {
            warn!("training: prompt version {} saved but not pushed to the voice platform", version.version);
        }

        Ok(version)
    }
}
