use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{DaySchedule, Holiday, ScheduleOverride, ScheduleTemplate};

pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Resolve whether a date is a working day and its open/close times.
    ///
    /// Precedence: global holiday, then date-specific override, then the
    /// weekly template for that weekday. A working day with missing
    /// start or end time is treated as closed.
    pub async fn resolve_schedule(
        &self,
        practice_id: Uuid,
        date: NaiveDate,
    ) -> Result<DaySchedule> {
        // Global holiday closes every practice
        let holidays: Vec<Holiday> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/holidays?date=eq.{}&limit=1", date),
            None,
        ).await?;

        if !holidays.is_empty() {
            debug!("resolve_schedule: {} is a holiday", date);
            return Ok(DaySchedule::closed());
        }

        // Date-specific override takes precedence over the template
        let overrides: Vec<ScheduleOverride> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/schedule_overrides?practice_id=eq.{}&date=eq.{}&limit=1",
                practice_id, date,
            ),
            None,
        ).await?;

        if let Some(ov) = overrides.into_iter().next() {
            if !ov.is_working || ov.start_time.is_none() || ov.end_time.is_none() {
                return Ok(DaySchedule::closed());
            }
            return Ok(DaySchedule {
                is_working: true,
                start_time: ov.start_time,
                end_time: ov.end_time,
            });
        }

        // Weekly template, Monday = 0 through Sunday = 6
        let day_of_week = date.weekday().num_days_from_monday() as i32;
        let templates: Vec<ScheduleTemplate> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/schedule_templates?practice_id=eq.{}&day_of_week=eq.{}&limit=1",
                practice_id, day_of_week,
            ),
            None,
        ).await?;

        match templates.into_iter().next() {
            Some(t) if t.is_enabled && t.start_time.is_some() && t.end_time.is_some() => {
                Ok(DaySchedule {
                    is_working: true,
                    start_time: t.start_time,
                    end_time: t.end_time,
                })
            }
            _ => Ok(DaySchedule::closed()),
        }
    }

    /// All enabled weekly template rows for a practice, ordered by weekday.
    pub async fn enabled_weekly_hours(&self, practice_id: Uuid) -> Result<Vec<ScheduleTemplate>> {
        let templates: Vec<ScheduleTemplate> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/schedule_templates?practice_id=eq.{}&is_enabled=eq.true&order=day_of_week.asc",
                practice_id,
            ),
            None,
        ).await?;

        Ok(templates)
    }
}
