use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub patient_name: String,
    pub patient_phone: String,
    pub appointment_type_id: Option<Uuid>,
    pub preferred_date_start: Option<NaiveDate>,
    pub preferred_date_end: Option<NaiveDate>,
    pub preferred_time_start: Option<NaiveTime>,
    pub preferred_time_end: Option<NaiveTime>,
    pub notes: Option<String>,
    /// 1 = highest, 5 = lowest.
    pub priority: i32,
    pub status: WaitlistStatus,
    pub notified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Waiting,
    Notified,
    Booked,
    Expired,
    Cancelled,
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitlistStatus::Waiting => write!(f, "waiting"),
            WaitlistStatus::Notified => write!(f, "notified"),
            WaitlistStatus::Booked => write!(f, "booked"),
            WaitlistStatus::Expired => write!(f, "expired"),
            WaitlistStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewWaitlistEntry {
    pub patient_id: Option<Uuid>,
    pub patient_name: String,
    pub patient_phone: String,
    pub appointment_type_id: Option<Uuid>,
    pub preferred_date_start: Option<NaiveDate>,
    pub preferred_date_end: Option<NaiveDate>,
    pub preferred_time_start: Option<NaiveTime>,
    pub preferred_time_end: Option<NaiveTime>,
    pub notes: Option<String>,
    pub priority: Option<i32>,
}

/// The slot freed by a cancellation, offered to matching entries.
#[derive(Debug, Clone, Copy)]
pub struct CancelledSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub appointment_type_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationResult {
    pub entry_id: Uuid,
    pub patient_name: String,
    pub patient_phone: String,
    pub sms_success: bool,
    pub message_sid: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct WaitlistStats {
    pub total_waiting: i64,
    pub total_notified: i64,
    pub total_booked: i64,
    pub total_expired: i64,
    pub total_cancelled: i64,
    pub avg_wait_hours: Option<f64>,
    pub conversion_rate: f64,
}
