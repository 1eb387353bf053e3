use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant: one medical office. Owns every other tenant-scoped row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Practice {
    pub id: Uuid,
    pub name: String,
    pub timezone: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One-to-one configuration row for a practice.
///
/// Credential fields here override the global environment credentials for
/// the tenant when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeConfig {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub slot_duration_minutes: i32,
    pub booking_horizon_days: i32,
    pub allow_overbooking: bool,
    pub max_overbooking_per_slot: i32,
    pub transfer_number: Option<String>,
    pub sms_confirmation_enabled: bool,
    /// language code -> template string with {placeholder} variables
    pub sms_confirmation_template: Option<HashMap<String, String>>,
    pub vapi_assistant_id: Option<String>,
    pub vapi_phone_number: Option<String>,
    pub vapi_api_key: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
    pub eligibility_enabled: bool,
    pub eligibility_api_key: Option<String>,
}

impl PracticeConfig {
    /// Cap of non-cancelled appointments that may share one slot.
    pub fn slot_capacity(&self) -> i64 {
        if self.allow_overbooking {
            self.max_overbooking_per_slot.max(1) as i64
        } else {
            1
        }
    }
}
