use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use urlencoding::encode;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Call, EndOfCallReport, NewRefillRequest, NewVoicemail, RefillRequest, Voicemail};

#[derive(Debug, Deserialize)]
struct PracticeIdRow {
    practice_id: Uuid,
}

/// Idempotent recorder for call state. Every mutation is keyed by the
/// voice platform's call id so replayed webhooks never create duplicates.
pub struct CallService {
    supabase: SupabaseClient,
}

impl CallService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_call(&self, vapi_call_id: &str) -> Result<Option<Call>> {
        let rows: Vec<Call> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/calls?vapi_call_id=eq.{}&limit=1", encode(vapi_call_id)),
            None,
        ).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn practice_id_for_call(&self, vapi_call_id: &str) -> Result<Option<Uuid>> {
        let rows: Vec<PracticeIdRow> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/calls?vapi_call_id=eq.{}&select=practice_id&limit=1",
                encode(vapi_call_id),
            ),
            None,
        ).await?;
        Ok(rows.into_iter().next().map(|r| r.practice_id))
    }

    /// Find the practice whose voice phone number was dialed.
    pub async fn resolve_practice_from_phone(&self, phone_number: &str) -> Result<Option<Uuid>> {
        let rows: Vec<PracticeIdRow> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/practice_configs?vapi_phone_number=eq.{}&select=practice_id&limit=1",
                encode(phone_number),
            ),
            None,
        ).await?;
        Ok(rows.into_iter().next().map(|r| r.practice_id))
    }

    /// Insert the call if absent, otherwise update the provided fields.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_or_update_call(
        &self,
        practice_id: Uuid,
        vapi_call_id: &str,
        caller_phone: Option<&str>,
        status: &str,
        direction: &str,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Call> {
        if let Some(existing) = self.get_call(vapi_call_id).await? {
            let mut updates = Map::new();
            updates.insert("status".to_string(), json!(status));
            if let Some(phone) = caller_phone {
                updates.insert("caller_phone".to_string(), json!(phone));
            }
            if let Some(started) = started_at {
                updates.insert("started_at".to_string(), json!(started));
            }
            if let Some(ended) = ended_at {
                updates.insert("ended_at".to_string(), json!(ended));
            }

            let updated: Vec<Call> = self.supabase.update_returning(
                &format!("/rest/v1/calls?id=eq.{}", existing.id),
                Value::Object(updates),
            ).await?;

            return updated.into_iter().next()
                .ok_or_else(|| anyhow!("Call update returned no rows"));
        }

        let row = json!({
            "practice_id": practice_id,
            "vapi_call_id": vapi_call_id,
            "direction": direction,
            "caller_phone": caller_phone,
            "status": status,
            "started_at": started_at,
            "ended_at": ended_at,
            "callback_needed": false,
            "callback_completed": false,
        });

        let call: Call = self.supabase.insert_returning("calls", row).await?;
        info!("Created call record {} for platform call {}", call.id, vapi_call_id);
        Ok(call)
    }

    /// Update status on an existing record only. Returns None when the
    /// call has not been seen yet.
    pub async fn update_call_status(
        &self,
        vapi_call_id: &str,
        status: &str,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Call>> {
        let mut updates = Map::new();
        updates.insert("status".to_string(), json!(status));
        if let Some(ended) = ended_at {
            updates.insert("ended_at".to_string(), json!(ended));
        }

        let updated: Vec<Call> = self.supabase.update_returning(
            &format!("/rest/v1/calls?vapi_call_id=eq.{}", encode(vapi_call_id)),
            Value::Object(updates),
        ).await?;

        Ok(updated.into_iter().next())
    }

    pub async fn link_call_to_patient(&self, vapi_call_id: &str, patient_id: Uuid) -> Result<()> {
        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/calls?vapi_call_id=eq.{}", encode(vapi_call_id)),
            Some(json!({"patient_id": patient_id})),
        ).await?;
        debug!("Linked call {} to patient {}", vapi_call_id, patient_id);
        Ok(())
    }

    pub async fn link_call_to_appointment(&self, vapi_call_id: &str, appointment_id: Uuid) -> Result<()> {
        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/calls?vapi_call_id=eq.{}", encode(vapi_call_id)),
            Some(json!({"appointment_id": appointment_id})),
        ).await?;
        debug!("Linked call {} to appointment {}", vapi_call_id, appointment_id);
        Ok(())
    }

    /// Capture caller identity mid-call so a dropped call still has a name
    /// and number to call back.
    pub async fn save_caller_info(
        &self,
        vapi_call_id: &str,
        caller_name: Option<&str>,
        caller_phone: Option<&str>,
        patient_id: Option<Uuid>,
    ) -> Result<()> {
        let mut updates = Map::new();
        if let Some(name) = caller_name {
            updates.insert("caller_name".to_string(), json!(name));
        }
        if let Some(phone) = caller_phone {
            updates.insert("caller_phone".to_string(), json!(phone));
        }
        if let Some(patient) = patient_id {
            updates.insert("patient_id".to_string(), json!(patient));
        }
        if updates.is_empty() {
            return Ok(());
        }

        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/calls?vapi_call_id=eq.{}", encode(vapi_call_id)),
            Some(Value::Object(updates)),
        ).await?;
        Ok(())
    }

    /// Persist end-of-call artefacts. Fields that arrived empty are left
    /// untouched.
    pub async fn save_end_of_call_report(
        &self,
        vapi_call_id: &str,
        report: &EndOfCallReport,
    ) -> Result<Option<Call>> {
        let mut updates = Map::new();
        updates.insert("status".to_string(), json!("ended"));
        if let Some(transcript) = &report.transcript {
            updates.insert("transcription".to_string(), json!(transcript));
        }
        if let Some(url) = &report.recording_url {
            updates.insert("recording_url".to_string(), json!(url));
        }
        if let Some(summary) = &report.summary {
            updates.insert("ai_summary".to_string(), json!(summary));
        }
        if let Some(duration) = report.duration_seconds {
            updates.insert("duration_seconds".to_string(), json!(duration));
        }
        if let Some(cost) = report.cost {
            updates.insert("cost".to_string(), json!(cost));
        }
        if let Some(reason) = &report.ended_reason {
            updates.insert("outcome".to_string(), json!(reason));
        }

        let updated: Vec<Call> = self.supabase.update_returning(
            &format!("/rest/v1/calls?vapi_call_id=eq.{}", encode(vapi_call_id)),
            Value::Object(updates),
        ).await?;

        Ok(updated.into_iter().next())
    }

    /// Save the platform's structured analysis on the call record.
    pub async fn save_structured_analysis(
        &self,
        call_id: Uuid,
        structured_data: Option<&Value>,
        success_evaluation: Option<&str>,
    ) -> Result<()> {
        let mut updates = Map::new();

        if let Some(data) = structured_data {
            updates.insert("structured_data".to_string(), data.clone());
            if let Some(intent) = data.get("caller_intent").and_then(|v| v.as_str()) {
                updates.insert("caller_intent".to_string(), json!(intent));
            }
            if let Some(sentiment) = data.get("caller_sentiment").and_then(|v| v.as_str()) {
                updates.insert("caller_sentiment".to_string(), json!(sentiment));
            }
            if let Some(language) = data.get("language").and_then(|v| v.as_str()) {
                let code: String = match language {
                    "english" => "en".to_string(),
                    "spanish" => "es".to_string(),
                    other => other.chars().take(5).collect(),
                };
                updates.insert("language".to_string(), json!(code));
            }
        }
        if let Some(evaluation) = success_evaluation {
            updates.insert("success_evaluation".to_string(), json!(evaluation));
        }
        if updates.is_empty() {
            return Ok(());
        }

        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/calls?id=eq.{}", call_id),
            Some(Value::Object(updates)),
        ).await?;
        Ok(())
    }

    pub async fn flag_callback_needed(&self, call_id: Uuid) -> Result<()> {
        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/calls?id=eq.{}", call_id),
            Some(json!({"callback_needed": true})),
        ).await?;
        Ok(())
    }

    // ==========================================================================
    // CALL-ADJACENT ARTEFACTS
    // ==========================================================================

    pub async fn create_voicemail(&self, practice_id: Uuid, voicemail: NewVoicemail) -> Result<Voicemail> {
        let row = json!({
            "practice_id": practice_id,
            "call_id": voicemail.call_id,
            "patient_id": voicemail.patient_id,
            "caller_name": voicemail.caller_name,
            "caller_phone": voicemail.caller_phone,
            "message": voicemail.message,
            "urgency": voicemail.urgency,
            "callback_requested": voicemail.callback_requested,
            "preferred_callback_time": voicemail.preferred_callback_time,
            "reason": voicemail.reason,
            "status": "new",
        });

        let created: Voicemail = self.supabase.insert_returning("voicemails", row).await?;
        info!("Voicemail created: id={}, practice={}, urgency={}", created.id, practice_id, created.urgency);
        Ok(created)
    }

    pub async fn create_refill_request(&self, practice_id: Uuid, refill: NewRefillRequest) -> Result<RefillRequest> {
        let row = json!({
            "practice_id": practice_id,
            "patient_id": refill.patient_id,
            "call_id": refill.call_id,
            "medication_name": refill.medication_name,
            "dosage": refill.dosage,
            "pharmacy_name": refill.pharmacy_name,
            "pharmacy_phone": refill.pharmacy_phone,
            "caller_name": refill.caller_name,
            "caller_phone": refill.caller_phone,
            "status": "pending",
            "urgency": "normal",
        });

        let created: RefillRequest = self.supabase.insert_returning("refill_requests", row).await?;
        info!(
            "Refill request created: id={}, medication={}, practice={}",
            created.id, created.medication_name, practice_id,
        );
        Ok(created)
    }
}
