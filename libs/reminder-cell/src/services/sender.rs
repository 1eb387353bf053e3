use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use booking_cell::models::{Appointment, AppointmentStatus};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::patient::Patient;
use shared_models::practice::Practice;
use shared_utils::timefmt::{format_ts_utc, local_to_utc};
use sms_cell::services::sms::SmsService;
use sms_cell::templates::truncate_body;

use crate::models::{AppointmentReminder, ProcessSummary, ReminderStage};
use crate::templates::render_stage;

/// Attempts before a reminder is marked permanently failed.
pub const MAX_SEND_ATTEMPTS: i32 = 3;

/// Batch ceiling per tick so one pass never holds the loop for long.
const SEND_BATCH_SIZE: usize = 100;

/// How long past the slot a no-show must be before follow-up.
const NO_SHOW_GRACE_MINUTES: i64 = 30;

pub struct ReminderSender {
    supabase: SupabaseClient,
    sms_service: SmsService,
}

impl ReminderSender {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            sms_service: SmsService::new(config),
        }
    }

    // ==========================================================================
    // SEND LOOP
    // ==========================================================================

    /// Process due reminders. Called every 60 seconds by the background
    /// ticker. Each reminder commits individually so one failure never
    /// re-sends its batch-mates.
    pub async fn process_pending_reminders(&self) -> ProcessSummary {
        let now = Utc::now();
        let mut summary = ProcessSummary::default();

        let due: Vec<AppointmentReminder> = match self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointment_reminders?status=eq.pending&scheduled_for=lte.{}&attempts=lt.{}&order=scheduled_for.asc&limit={}",
                format_ts_utc(now), MAX_SEND_ATTEMPTS, SEND_BATCH_SIZE,
            ),
            None,
        ).await {
            Ok(due) => due,
            Err(e) => {
                error!("process_pending_reminders: batch query failed: {}", e);
                return summary;
            }
        };

        if due.is_empty() {
            return summary;
        }

        info!("process_pending_reminders: found {} due reminders", due.len());

        for reminder in due {
            match self.send_one(&reminder, now).await {
                Ok(SendOutcome::Sent) => summary.sent += 1,
                Ok(SendOutcome::Failed) => summary.failed += 1,
                Ok(SendOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    warn!(
                        "process_pending_reminders: error on reminder {}: {}",
                        reminder.id, e,
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            "process_pending_reminders: sent={} failed={} skipped={}",
            summary.sent, summary.failed, summary.skipped,
        );
        summary
    }

    async fn send_one(
        &self,
        reminder: &AppointmentReminder,
        now: chrono::DateTime<Utc>,
    ) -> Result<SendOutcome> {
        // The appointment may have moved on since this reminder was queued
        let appointments: Vec<Appointment> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/appointments?id=eq.{}&limit=1", reminder.appointment_id),
            None,
        ).await?;

        if let Some(appointment) = appointments.first() {
            if matches!(appointment.status, AppointmentStatus::Cancelled | AppointmentStatus::NoShow) {
                self.update_reminder(reminder.id, json!({"status": "cancelled"})).await?;
                info!(
                    "process_pending_reminders: cancelled reminder {} (appointment {} is {})",
                    reminder.id, appointment.id, appointment.status,
                );
                return Ok(SendOutcome::Skipped);
            }
        }

        // Exponential backoff between retries
        if reminder.attempts > 0 {
            if let Some(updated_at) = reminder.updated_at {
                let backoff = ChronoDuration::minutes(2i64.pow(reminder.attempts.min(10) as u32));
                if now < updated_at + backoff {
                    return Ok(SendOutcome::Skipped);
                }
            }
        }

        let patients: Vec<Patient> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/patients?id=eq.{}&limit=1", reminder.patient_id),
            None,
        ).await?;
        let phone = patients.first().and_then(|p| p.phone.clone());

        let Some(phone) = phone else {
            self.update_reminder(reminder.id, json!({
                "status": "failed",
                "attempts": reminder.attempts + 1,
            })).await?;
            return Ok(SendOutcome::Failed);
        };

        let credentials = match self.sms_service.twilio_credentials(reminder.practice_id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!(
                    "process_pending_reminders: SMS credentials error for practice {}: {}",
                    reminder.practice_id, e,
                );
                self.update_reminder(reminder.id, json!({
                    "status": "failed",
                    "attempts": reminder.attempts + 1,
                })).await?;
                return Ok(SendOutcome::Failed);
            }
        };

        let body = reminder.message_content.clone().unwrap_or_default();
        let result = self.sms_service.send_with_credentials(&credentials, &phone, &body).await;

        let attempts = reminder.attempts + 1;

        if result.success {
            self.update_reminder(reminder.id, json!({
                "status": "sent",
                "attempts": attempts,
                "sent_at": format_ts_utc(Utc::now()),
                "message_sid": result.message_sid,
            })).await?;
            Ok(SendOutcome::Sent)
        } else if result.permanent || attempts >= MAX_SEND_ATTEMPTS {
            self.update_reminder(reminder.id, json!({
                "status": "failed",
                "attempts": attempts,
            })).await?;
            Ok(SendOutcome::Failed)
        } else {
            // Stays pending; the backoff gate delays the next try
            self.update_reminder(reminder.id, json!({
                "attempts": attempts,
            })).await?;
            Ok(SendOutcome::Failed)
        }
    }

    async fn update_reminder(&self, reminder_id: Uuid, body: serde_json::Value) -> Result<()> {
        let _: serde_json::Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/appointment_reminders?id=eq.{}", reminder_id),
            Some(body),
        ).await?;
        Ok(())
    }

    // ==========================================================================
    // NO-SHOW FOLLOW-UP SWEEP
    // ==========================================================================

    /// Follow up with patients who missed their appointment: status is
    /// no_show, the slot is at least 30 minutes past, and no follow-up has
    /// gone out yet. The follow-up is created and sent in the same pass.
    pub async fn process_no_show_followups(&self) -> ProcessSummary {
        let now = Utc::now();
        let mut summary = ProcessSummary::default();

        let no_shows: Vec<Appointment> = match self.supabase.request(
            Method::GET,
            "/rest/v1/appointments?status=eq.no_show&limit=50",
            None,
        ).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("process_no_show_followups: query failed: {}", e);
                return summary;
            }
        };

        if no_shows.is_empty() {
            return summary;
        }

        info!(
            "process_no_show_followups: found {} no-show appointments to check",
            no_shows.len(),
        );

        for appointment in no_shows {
            match self.follow_up_one(&appointment, now).await {
                Ok(true) => summary.sent += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    warn!(
                        "process_no_show_followups: error for appointment {}: {}",
                        appointment.id, e,
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            "process_no_show_followups: sent={} failed={} skipped={}",
            summary.sent, summary.failed, summary.skipped,
        );
        summary
    }

    async fn follow_up_one(
        &self,
        appointment: &Appointment,
        now: chrono::DateTime<Utc>,
    ) -> Result<bool> {
        // One follow-up per appointment
        let existing: Vec<serde_json::Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointment_reminders?appointment_id=eq.{}&stage=eq.no_show&status=in.(pending,sent)&select=id&limit=1",
                appointment.id,
            ),
            None,
        ).await?;
        if !existing.is_empty() {
            return Ok(false);
        }

        let patients: Vec<Patient> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/patients?id=eq.{}&limit=1", appointment.patient_id),
            None,
        ).await?;
        let Some(patient) = patients.into_iter().next() else {
            return Ok(false);
        };
        let Some(phone) = patient.phone.clone() else {
            return Ok(false);
        };

        let practices: Vec<Practice> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practices?id=eq.{}&limit=1", appointment.practice_id),
            None,
        ).await?;
        let practice = practices.into_iter().next();

        let timezone = practice.as_ref()
            .map(|p| p.timezone.clone())
            .unwrap_or_else(|| "America/New_York".to_string());
        let appt_instant = local_to_utc(appointment.date, appointment.time, &timezone);

        if now < appt_instant + ChronoDuration::minutes(NO_SHOW_GRACE_MINUTES) {
            return Ok(false);
        }

        let practice_name = practice.as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "our office".to_string());
        let practice_phone = practice.as_ref()
            .and_then(|p| p.phone.clone())
            .unwrap_or_default();

        let message = truncate_body(&render_stage(ReminderStage::NoShow, patient.language(), &[
            ("practice_name", practice_name.as_str()),
            ("phone", practice_phone.as_str()),
        ]));

        let reminder: AppointmentReminder = self.supabase.insert_returning(
            "appointment_reminders",
            json!({
                "practice_id": appointment.practice_id,
                "appointment_id": appointment.id,
                "patient_id": appointment.patient_id,
                "reminder_type": "sms",
                "stage": ReminderStage::NoShow,
                "scheduled_for": format_ts_utc(now),
                "status": "pending",
                "message_content": message,
                "attempts": 0,
            }),
        ).await?;

        let credentials = match self.sms_service.twilio_credentials(appointment.practice_id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!(
                    "process_no_show_followups: SMS credentials error for practice {}: {}",
                    appointment.practice_id, e,
                );
                self.update_reminder(reminder.id, json!({"status": "failed", "attempts": 1})).await?;
                return Err(e);
            }
        };

        let result = self.sms_service.send_with_credentials(&credentials, &phone, &message).await;

        if result.success {
            self.update_reminder(reminder.id, json!({
                "status": "sent",
                "attempts": 1,
                "sent_at": format_ts_utc(Utc::now()),
                "message_sid": result.message_sid,
            })).await?;
            Ok(true)
        } else {
            self.update_reminder(reminder.id, json!({"status": "failed", "attempts": 1})).await?;
            Ok(false)
        }
    }
}

enum SendOutcome {
    Sent,
    Failed,
    Skipped,
}
