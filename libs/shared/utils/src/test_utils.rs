use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Config pointing at a wiremock server standing in for the database gateway.
    pub fn for_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            app_env: "development".to_string(),
            vapi_webhook_secret: String::new(),
            vapi_api_key: String::new(),
            openai_api_key: String::new(),
            twilio_account_sid: "ACtest".to_string(),
            twilio_auth_token: "test-token".to_string(),
            twilio_from_number: "+15550001111".to_string(),
            twilio_api_base: self.supabase_url.clone(),
            openai_api_base: self.supabase_url.clone(),
            vapi_api_base: self.supabase_url.clone(),
            eligibility_api_base: self.supabase_url.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Canned gateway row payloads shared by cell integration tests.
pub struct MockRows;

impl MockRows {
    pub fn practice(id: Uuid, name: &str, timezone: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "timezone": timezone,
            "phone": "+15551234567",
            "address": "123 Main St",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn practice_config(practice_id: Uuid) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "practice_id": practice_id,
            "slot_duration_minutes": 30,
            "booking_horizon_days": 90,
            "allow_overbooking": false,
            "max_overbooking_per_slot": 1,
            "transfer_number": "+15559876543",
            "sms_confirmation_enabled": true,
            "sms_confirmation_template": null,
            "vapi_assistant_id": null,
            "vapi_phone_number": "+15550002222",
            "vapi_api_key": null,
            "twilio_account_sid": null,
            "twilio_auth_token": null,
            "twilio_from_number": "+15550001111",
            "eligibility_enabled": false,
            "eligibility_api_key": null
        })
    }

    pub fn patient(id: Uuid, practice_id: Uuid, first_name: &str, last_name: &str, dob: &str) -> Value {
        json!({
            "id": id,
            "practice_id": practice_id,
            "first_name": first_name,
            "last_name": last_name,
            "dob": dob,
            "phone": "+15557654321",
            "address": null,
            "language_preference": "en",
            "insurance_carrier": null,
            "member_id": null,
            "group_number": null,
            "referring_physician": null,
            "is_new": false,
            "opted_out_recall": false,
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_type(id: Uuid, practice_id: Uuid, name: &str, duration_minutes: i32) -> Value {
        json!({
            "id": id,
            "practice_id": practice_id,
            "name": name,
            "duration_minutes": duration_minutes,
            "is_active": true,
            "sort_order": 0
        })
    }

    pub fn appointment(
        id: Uuid,
        practice_id: Uuid,
        patient_id: Uuid,
        appointment_type_id: Uuid,
        date: &str,
        time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "practice_id": practice_id,
            "patient_id": patient_id,
            "appointment_type_id": appointment_type_id,
            "date": date,
            "time": time,
            "duration_minutes": 30,
            "status": status,
            "notes": null,
            "booked_by": "ai",
            "call_id": null,
            "sms_confirmation_sent": false,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn schedule_template(
        practice_id: Uuid,
        day_of_week: i32,
        is_enabled: bool,
        start_time: &str,
        end_time: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "practice_id": practice_id,
            "day_of_week": day_of_week,
            "is_enabled": is_enabled,
            "start_time": start_time,
            "end_time": end_time
        })
    }

    pub fn reminder(
        id: Uuid,
        practice_id: Uuid,
        appointment_id: Uuid,
        patient_id: Uuid,
        scheduled_for: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "practice_id": practice_id,
            "appointment_id": appointment_id,
            "patient_id": patient_id,
            "reminder_type": "sms",
            "stage": "24h",
            "scheduled_for": scheduled_for,
            "status": status,
            "message_content": "Reminder body",
            "response": null,
            "attempts": 0,
            "sent_at": null,
            "message_sid": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn call(id: Uuid, practice_id: Uuid, vapi_call_id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "practice_id": practice_id,
            "vapi_call_id": vapi_call_id,
            "direction": "inbound",
            "caller_phone": "+15557654321",
            "caller_name": null,
            "patient_id": null,
            "appointment_id": null,
            "status": status,
            "started_at": null,
            "ended_at": null,
            "duration_seconds": null,
            "transcription": null,
            "ai_summary": null,
            "recording_url": null,
            "cost": null,
            "outcome": null,
            "structured_data": null,
            "caller_intent": null,
            "caller_sentiment": null,
            "success_evaluation": null,
            "language": null,
            "callback_needed": false,
            "callback_completed": false,
            "callback_notes": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }
}
