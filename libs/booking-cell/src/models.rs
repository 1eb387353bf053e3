use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub booked_by: BookedBy,
    pub call_id: Option<Uuid>,
    pub sms_confirmation_sent: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl AppointmentStatus {
    /// Cancellation is terminal; every other state can still move.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "booked"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookedBy {
    Ai,
    Staff,
    Patient,
}

impl fmt::Display for BookedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookedBy::Ai => write!(f, "ai"),
            BookedBy::Staff => write!(f, "staff"),
            BookedBy::Patient => write!(f, "patient"),
        }
    }
}

/// Practice-defined visit kind with its own duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentType {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub sort_order: i32,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct BookAppointmentRequest {
    pub practice_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub booked_by: BookedBy,
    pub call_id: Option<Uuid>,
    pub notes: Option<String>,
    /// When set, an existing non-terminal appointment for the same
    /// (practice, patient, date, time) is returned instead of inserting a
    /// duplicate.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPatientFields {
    pub phone: Option<String>,
    pub address: Option<String>,
    pub insurance_carrier: Option<String>,
    pub member_id: Option<String>,
    pub group_number: Option<String>,
    pub referring_physician: Option<String>,
    pub language_preference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PatientSearchQuery {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub phone: Option<String>,
}

// ==============================================================================
// ERROR TAXONOMY
// ==============================================================================

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Time slot {time} is not a valid slot on {date}")]
    InvalidSlot { date: NaiveDate, time: NaiveTime },

    #[error("Time slot {time} on {date} is fully booked")]
    ConflictFull { date: NaiveDate, time: NaiveTime },

    #[error("Appointment type not found or does not belong to this practice")]
    TypeNotFound,

    #[error("Appointment type is not active")]
    TypeInactive,

    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Cannot reschedule a cancelled appointment")]
    CancelledSource,

    #[error("Cannot confirm appointment with status '{from}'. Only appointments with status 'booked' can be confirmed.")]
    BadTransition { from: AppointmentStatus },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// A free slot located by the forward search.
#[derive(Debug, Clone, Serialize)]
pub struct NextAvailableSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
}
