use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentReminder {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub reminder_type: String,
    pub stage: ReminderStage,
    pub scheduled_for: DateTime<Utc>,
    pub status: ReminderStatus,
    pub message_content: Option<String>,
    pub response: Option<String>,
    pub attempts: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub message_sid: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderStatus::Pending => write!(f, "pending"),
            ReminderStatus::Sent => write!(f, "sent"),
            ReminderStatus::Failed => write!(f, "failed"),
            ReminderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Which point in the appointment lifecycle a reminder covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderStage {
    #[serde(rename = "confirmation")]
    Confirmation,
    #[serde(rename = "24h")]
    DayBefore,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "no_show")]
    NoShow,
}

impl fmt::Display for ReminderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderStage::Confirmation => write!(f, "confirmation"),
            ReminderStage::DayBefore => write!(f, "24h"),
            ReminderStage::TwoHours => write!(f, "2h"),
            ReminderStage::NoShow => write!(f, "no_show"),
        }
    }
}

/// Tally for one pass of the send loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// What an inbound reminder reply did.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyOutcome {
    pub action_taken: ReplyAction,
    pub appointment_id: Option<Uuid>,
    pub reply_message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyAction {
    Confirmed,
    Cancelled,
    RescheduleRequested,
    Unknown,
    NoMatch,
}

/// A reminder created by the scheduler, for the booking response.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledReminder {
    pub stage: ReminderStage,
    pub scheduled_for: DateTime<Utc>,
}
