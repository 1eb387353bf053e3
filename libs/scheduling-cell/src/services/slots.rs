use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveTime, Duration as ChronoDuration};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::practice::PracticeConfig;

use crate::models::SlotAvailability;
use crate::services::schedule::ScheduleService;

#[derive(Debug, Deserialize)]
struct BookedTime {
    time: NaiveTime,
}

#[derive(Debug, Deserialize)]
struct TypeDuration {
    duration_minutes: i32,
}

pub struct SlotService {
    supabase: SupabaseClient,
    schedule_service: ScheduleService,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            schedule_service: ScheduleService::new(config),
        }
    }

    pub async fn practice_config(&self, practice_id: Uuid) -> Result<PracticeConfig> {
        let configs: Vec<PracticeConfig> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practice_configs?practice_id=eq.{}&limit=1", practice_id),
            None,
        ).await?;

        configs.into_iter().next()
            .ok_or_else(|| anyhow!("Practice config not found for practice {}", practice_id))
    }

    /// Ordered slot availability for a (practice, date).
    ///
    /// Slot duration comes from the appointment type when given and found,
    /// otherwise from the practice default. Occupancy counts every
    /// non-cancelled appointment at the same wall-clock time, capped by the
    /// practice overbooking policy.
    pub async fn get_available_slots(
        &self,
        practice_id: Uuid,
        date: NaiveDate,
        appointment_type_id: Option<Uuid>,
    ) -> Result<Vec<SlotAvailability>> {
        let schedule = self.schedule_service.resolve_schedule(practice_id, date).await?;

        let (start_time, end_time) = match (schedule.is_working, schedule.start_time, schedule.end_time) {
            (true, Some(start), Some(end)) => (start, end),
            _ => return Ok(Vec::new()),
        };

        let config = self.practice_config(practice_id).await?;

        let mut slot_duration = config.slot_duration_minutes;
        if let Some(type_id) = appointment_type_id {
            let types: Vec<TypeDuration> = self.supabase.request(
                Method::GET,
                &format!(
                    "/rest/v1/appointment_types?id=eq.{}&practice_id=eq.{}&select=duration_minutes&limit=1",
                    type_id, practice_id,
                ),
                None,
            ).await?;
            if let Some(t) = types.first() {
                slot_duration = t.duration_minutes;
            }
        }

        let time_slots = generate_time_slots(start_time, end_time, slot_duration);
        if time_slots.is_empty() {
            return Ok(Vec::new());
        }

        // Occupancy per wall-clock time, grouped in process
        let booked: Vec<BookedTime> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointments?practice_id=eq.{}&date=eq.{}&status=neq.cancelled&select=time",
                practice_id, date,
            ),
            None,
        ).await?;

        let mut bookings_map: HashMap<NaiveTime, i64> = HashMap::new();
        for b in booked {
            *bookings_map.entry(b.time).or_insert(0) += 1;
        }

        let max_per_slot = config.slot_capacity();

        let slots = time_slots.into_iter()
            .map(|t| {
                let current_bookings = bookings_map.get(&t).copied().unwrap_or(0);
                SlotAvailability {
                    time: t,
                    is_available: current_bookings < max_per_slot,
                    current_bookings,
                }
            })
            .collect();

        debug!(
            "get_available_slots: practice={} date={} duration={}min",
            practice_id, date, slot_duration,
        );

        Ok(slots)
    }
}

/// Slot start times from start_time, stepping by duration, while the whole
/// slot still fits before end_time.
pub fn generate_time_slots(
    start_time: NaiveTime,
    end_time: NaiveTime,
    slot_duration_minutes: i32,
) -> Vec<NaiveTime> {
    if slot_duration_minutes <= 0 {
        return Vec::new();
    }

    let anchor = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let step = ChronoDuration::minutes(slot_duration_minutes as i64);
    let end_dt = anchor.and_time(end_time);

    let mut slots = Vec::new();
    let mut current_dt = anchor.and_time(start_time);

    while current_dt + step <= end_dt {
        slots.push(current_dt.time());
        current_dt += step;
    }

    slots
}
