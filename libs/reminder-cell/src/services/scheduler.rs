use anyhow::Result;
use chrono::{Duration as ChronoDuration, Timelike, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use booking_cell::models::Appointment;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::patient::Patient;
use shared_models::practice::Practice;
use shared_utils::timefmt::{format_appointment_datetime, format_ts_utc, local_to_utc};
use sms_cell::templates::truncate_body;

use crate::models::{ReminderStage, ScheduledReminder};
use crate::templates::render_stage;

pub struct ReminderScheduler {
    supabase: SupabaseClient,
}

impl ReminderScheduler {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Schedule the full reminder set when an appointment is booked:
    /// confirmation now, then 24 hours and 2 hours before the slot.
    /// Stages already in the past are skipped; duplicates are suppressed by
    /// (appointment, scheduled_for) uniqueness on non-terminal reminders.
    pub async fn schedule_appointment_reminders(
        &self,
        practice_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Vec<ScheduledReminder>> {
        let appointments: Vec<Appointment> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointments?id=eq.{}&practice_id=eq.{}&limit=1",
                appointment_id, practice_id,
            ),
            None,
        ).await?;

        let Some(appointment) = appointments.into_iter().next() else {
            warn!(
                "schedule_appointment_reminders: appointment {} not found for practice {}",
                appointment_id, practice_id,
            );
            return Ok(Vec::new());
        };

        let patients: Vec<Patient> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/patients?id=eq.{}&limit=1", appointment.patient_id),
            None,
        ).await?;
        let Some(patient) = patients.into_iter().next() else {
            warn!("schedule_appointment_reminders: no patient for appointment {}", appointment_id);
            return Ok(Vec::new());
        };

        if patient.phone.is_none() {
            info!(
                "schedule_appointment_reminders: patient {} has no phone, skipping",
                patient.id,
            );
            return Ok(Vec::new());
        }

        let practices: Vec<Practice> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practices?id=eq.{}&limit=1", practice_id),
            None,
        ).await?;
        let practice = practices.into_iter().next();

        let timezone = practice.as_ref()
            .map(|p| p.timezone.clone())
            .unwrap_or_else(|| "America/New_York".to_string());
        let appt_instant = local_to_utc(appointment.date, appointment.time, &timezone);
        let now = Utc::now();

        let language = patient.language().to_string();
        let (formatted_date, formatted_time) =
            format_appointment_datetime(appointment.date, appointment.time, &language);

        let practice_name = practice.as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "our office".to_string());
        let practice_phone = practice.as_ref()
            .and_then(|p| p.phone.clone())
            .unwrap_or_default();

        let variables = [
            ("practice_name", practice_name.as_str()),
            ("date", formatted_date.as_str()),
            ("time", formatted_time.as_str()),
            ("phone", practice_phone.as_str()),
        ];

        // Confirmation goes out immediately; the timed stages count back
        // from the appointment instant.
        let stages: [(ReminderStage, Option<ChronoDuration>); 3] = [
            (ReminderStage::Confirmation, None),
            (ReminderStage::DayBefore, Some(ChronoDuration::hours(24))),
            (ReminderStage::TwoHours, Some(ChronoDuration::hours(2))),
        ];

        let mut created = Vec::new();

        for (stage, offset) in stages {
            let scheduled_for = match offset {
                None => now,
                Some(offset) => appt_instant - offset,
            };
            // Second precision keeps the duplicate guard's equality filter exact
            let scheduled_for = scheduled_for.with_nanosecond(0).unwrap_or(scheduled_for);

            if offset.is_some() && scheduled_for <= now {
                info!(
                    "schedule_appointment_reminders: {} reminder for {} is in the past, skipping",
                    stage, appointment_id,
                );
                continue;
            }

            let duplicates: Vec<serde_json::Value> = self.supabase.request(
                Method::GET,
                &format!(
                    "/rest/v1/appointment_reminders?appointment_id=eq.{}&scheduled_for=eq.{}&status=in.(pending,sent)&select=id&limit=1",
                    appointment_id,
                    format_ts_utc(scheduled_for),
                ),
                None,
            ).await?;
            if !duplicates.is_empty() {
                info!(
                    "schedule_appointment_reminders: {} reminder already exists for {}",
                    stage, appointment_id,
                );
                continue;
            }

            let message_content = truncate_body(&render_stage(stage, &language, &variables));

            let _: serde_json::Value = self.supabase.request(
                Method::POST,
                "/rest/v1/appointment_reminders",
                Some(json!({
                    "practice_id": practice_id,
                    "appointment_id": appointment_id,
                    "patient_id": patient.id,
                    "reminder_type": "sms",
                    "stage": stage,
                    "scheduled_for": format_ts_utc(scheduled_for),
                    "status": "pending",
                    "message_content": message_content,
                    "attempts": 0,
                })),
            ).await?;

            created.push(ScheduledReminder { stage, scheduled_for });
        }

        if !created.is_empty() {
            info!(
                "schedule_appointment_reminders: scheduled {} reminders for appointment {}",
                created.len(), appointment_id,
            );
        }

        Ok(created)
    }

    /// Cancel every pending reminder for an appointment. Called when the
    /// appointment is cancelled or rescheduled.
    pub async fn cancel_reminders(&self, appointment_id: Uuid) -> Result<usize> {
        let cancelled: Vec<serde_json::Value> = self.supabase.update_returning(
            &format!(
                "/rest/v1/appointment_reminders?appointment_id=eq.{}&status=eq.pending",
                appointment_id,
            ),
            json!({"status": "cancelled"}),
        ).await?;

        if !cancelled.is_empty() {
            info!(
                "cancel_reminders: cancelled {} reminders for appointment {}",
                cancelled.len(), appointment_id,
            );
        }

        Ok(cancelled.len())
    }
}
