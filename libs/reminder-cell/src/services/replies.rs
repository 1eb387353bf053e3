use anyhow::Result;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use urlencoding::encode;
use uuid::Uuid;

use booking_cell::models::{Appointment, AppointmentStatus};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use waitlist_cell::models::CancelledSlot;
use waitlist_cell::services::waitlist::WaitlistService;

use crate::models::{AppointmentReminder, ReplyAction, ReplyOutcome};

const CONFIRM_KEYWORDS: [&str; 5] = ["CONFIRM", "CONFIRMAR", "YES", "SI", "Y"];
const CANCEL_KEYWORDS: [&str; 3] = ["CANCEL", "CANCELAR", "NO"];
const RESCHEDULE_KEYWORDS: [&str; 2] = ["RESCHEDULE", "REPROGRAMAR"];

#[derive(Debug, Deserialize)]
struct PatientIdRow {
    id: Uuid,
}

pub struct ReminderReplyHandler {
    supabase: SupabaseClient,
    waitlist_service: WaitlistService,
}

impl ReminderReplyHandler {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            waitlist_service: WaitlistService::new(config),
        }
    }

    /// Interpret an inbound SMS against the most recently sent reminder for
    /// the phone number. CONFIRM-style keywords confirm the appointment,
    /// CANCEL-style cancel it (cascading pending reminders and offering the
    /// slot to the waitlist), RESCHEDULE flags staff follow-up. The raw
    /// reply is always stored on the matched reminder.
    pub async fn handle_reminder_response(
        &self,
        phone: &str,
        response_text: &str,
    ) -> Result<ReplyOutcome> {
        let normalized = response_text.trim().to_uppercase();

        let Some(reminder) = self.latest_sent_reminder(phone).await? else {
            info!("handle_reminder_response: no sent reminder for phone");
            return Ok(ReplyOutcome {
                action_taken: ReplyAction::NoMatch,
                appointment_id: None,
                reply_message: "We could not find an active reminder for your number. \
                                Please call our office for assistance."
                    .to_string(),
            });
        };

        let _: serde_json::Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/appointment_reminders?id=eq.{}", reminder.id),
            Some(json!({"response": response_text.trim()})),
        ).await?;

        let appointment = self.fetch_appointment(reminder.appointment_id).await?;

        if CONFIRM_KEYWORDS.contains(&normalized.as_str()) {
            if let Some(appointment) = &appointment {
                if matches!(appointment.status, AppointmentStatus::Booked | AppointmentStatus::Confirmed) {
                    let _: serde_json::Value = self.supabase.request(
                        Method::PATCH,
                        &format!("/rest/v1/appointments?id=eq.{}", appointment.id),
                        Some(json!({"status": "confirmed"})),
                    ).await?;
                }
            }

            info!("handle_reminder_response: confirmed appointment {}", reminder.appointment_id);
            return Ok(ReplyOutcome {
                action_taken: ReplyAction::Confirmed,
                appointment_id: Some(reminder.appointment_id),
                reply_message: "Thank you! Your appointment has been confirmed. \
                                We look forward to seeing you."
                    .to_string(),
            });
        }

        if CANCEL_KEYWORDS.contains(&normalized.as_str()) {
            if let Some(appointment) = &appointment {
                if appointment.status != AppointmentStatus::Cancelled {
                    let notes = match &appointment.notes {
                        Some(existing) if !existing.is_empty() => {
                            format!("{}\nCancelled by patient via SMS reply.", existing)
                        }
                        _ => "Cancelled by patient via SMS reply.".to_string(),
                    };
                    let _: serde_json::Value = self.supabase.request(
                        Method::PATCH,
                        &format!("/rest/v1/appointments?id=eq.{}", appointment.id),
                        Some(json!({"status": "cancelled", "notes": notes})),
                    ).await?;
                }
            }

            let _: Vec<serde_json::Value> = self.supabase.update_returning(
                &format!(
                    "/rest/v1/appointment_reminders?appointment_id=eq.{}&status=eq.pending",
                    reminder.appointment_id,
                ),
                json!({"status": "cancelled"}),
            ).await?;

            // Offer the freed slot; a waitlist failure never blocks the reply
            if let Some(appointment) = &appointment {
                let slot = CancelledSlot {
                    date: appointment.date,
                    time: appointment.time,
                    appointment_type_id: appointment.appointment_type_id,
                };
                if let Err(e) = self.waitlist_service
                    .check_on_cancellation(appointment.practice_id, slot)
                    .await
                {
                    warn!("handle_reminder_response: waitlist check failed: {}", e);
                }
            }

            info!("handle_reminder_response: cancelled appointment {}", reminder.appointment_id);
            return Ok(ReplyOutcome {
                action_taken: ReplyAction::Cancelled,
                appointment_id: Some(reminder.appointment_id),
                reply_message: "Your appointment has been cancelled. \
                                Please call our office if you would like to reschedule."
                    .to_string(),
            });
        }

        if RESCHEDULE_KEYWORDS.contains(&normalized.as_str()) {
            if let Some(appointment) = &appointment {
                let notes = match &appointment.notes {
                    Some(existing) if !existing.is_empty() => {
                        format!("{}\nPatient requested reschedule via SMS reply.", existing)
                    }
                    _ => "Patient requested reschedule via SMS reply.".to_string(),
                };
                let _: serde_json::Value = self.supabase.request(
                    Method::PATCH,
                    &format!("/rest/v1/appointments?id=eq.{}", appointment.id),
                    Some(json!({"notes": notes})),
                ).await?;
            }

            info!(
                "handle_reminder_response: reschedule requested for appointment {}",
                reminder.appointment_id,
            );
            return Ok(ReplyOutcome {
                action_taken: ReplyAction::RescheduleRequested,
                appointment_id: Some(reminder.appointment_id),
                reply_message: "We have received your request to reschedule. \
                                A member of our team will call you to arrange a new time."
                    .to_string(),
            });
        }

        info!("handle_reminder_response: unrecognized reply for appointment {}", reminder.appointment_id);
        Ok(ReplyOutcome {
            action_taken: ReplyAction::Unknown,
            appointment_id: Some(reminder.appointment_id),
            reply_message: "Thank you for your reply. \
                            Please reply CONFIRM, CANCEL, or RESCHEDULE. \
                            Or call our office for assistance."
                .to_string(),
        })
    }

    async fn latest_sent_reminder(&self, phone: &str) -> Result<Option<AppointmentReminder>> {
        let patients: Vec<PatientIdRow> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/patients?phone=eq.{}&select=id", encode(phone)),
            None,
        ).await?;

        if patients.is_empty() {
            return Ok(None);
        }

        let ids = patients.iter()
            .map(|p| p.id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let reminders: Vec<AppointmentReminder> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointment_reminders?patient_id=in.({})&status=eq.sent&order=sent_at.desc&limit=1",
                ids,
            ),
            None,
        ).await?;

        Ok(reminders.into_iter().next())
    }

    async fn fetch_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>> {
        let rows: Vec<Appointment> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/appointments?id=eq.{}&limit=1", appointment_id),
            None,
        ).await?;
        Ok(rows.into_iter().next())
    }
}
