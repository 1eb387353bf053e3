use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Weekly recurring hours. Exactly one row per (practice, day_of_week),
/// Monday = 0 through Sunday = 6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTemplate {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub day_of_week: i32,
    pub is_enabled: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

/// Date-specific exception that takes precedence over the weekly template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOverride {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub date: NaiveDate,
    pub is_working: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
}

/// Global holiday. Closes every practice on that date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub id: Uuid,
    pub date: NaiveDate,
    pub name: Option<String>,
}

/// Resolved working hours for a single (practice, date).
#[derive(Debug, Clone, PartialEq)]
pub struct DaySchedule {
    pub is_working: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl DaySchedule {
    pub fn closed() -> Self {
        Self { is_working: false, start_time: None, end_time: None }
    }
}

/// One bookable slot with its current occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub time: NaiveTime,
    pub is_available: bool,
    pub current_bookings: i64,
}
