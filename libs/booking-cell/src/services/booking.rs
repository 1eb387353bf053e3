use anyhow::anyhow;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Timelike};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};
use urlencoding::encode;
use uuid::Uuid;

use scheduling_cell::services::slots::SlotService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::timefmt::today_in_timezone;

use crate::models::{
    Appointment, AppointmentStatus, AppointmentType, BookAppointmentRequest,
    BookingError, NextAvailableSlot,
};
use crate::services::locks::SlotLockRegistry;
use crate::services::patients::{esc_like, PatientService};

pub struct BookingService {
    supabase: SupabaseClient,
    slot_service: SlotService,
    patient_service: PatientService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            slot_service: SlotService::new(config),
            patient_service: PatientService::new(config),
        }
    }

    // ==========================================================================
    // LOOKUPS
    // ==========================================================================

    pub async fn get_appointment(
        &self,
        practice_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Option<Appointment>, BookingError> {
        let rows: Vec<Appointment> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointments?id=eq.{}&practice_id=eq.{}&limit=1",
                appointment_id, practice_id,
            ),
            None,
        ).await?;

        Ok(rows.into_iter().next())
    }

    pub async fn get_appointment_type(
        &self,
        practice_id: Uuid,
        appointment_type_id: Uuid,
    ) -> Result<Option<AppointmentType>, BookingError> {
        let rows: Vec<AppointmentType> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointment_types?id=eq.{}&practice_id=eq.{}&limit=1",
                appointment_type_id, practice_id,
            ),
            None,
        ).await?;

        Ok(rows.into_iter().next())
    }

    /// Active appointment type by partial name match, case-insensitive.
    pub async fn find_appointment_type_by_name(
        &self,
        practice_id: Uuid,
        name: &str,
    ) -> Result<Option<AppointmentType>, BookingError> {
        let rows: Vec<AppointmentType> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointment_types?practice_id=eq.{}&name=ilike.{}&is_active=eq.true&limit=1",
                practice_id,
                encode(&format!("*{}*", esc_like(name))),
            ),
            None,
        ).await?;

        Ok(rows.into_iter().next())
    }

    /// First active appointment type for the practice, by sort order.
    pub async fn first_active_appointment_type(
        &self,
        practice_id: Uuid,
    ) -> Result<Option<AppointmentType>, BookingError> {
        let rows: Vec<AppointmentType> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointment_types?practice_id=eq.{}&is_active=eq.true&order=sort_order.asc&limit=1",
                practice_id,
            ),
            None,
        ).await?;

        Ok(rows.into_iter().next())
    }

    async fn practice_timezone_name(&self, practice_id: Uuid) -> String {
        #[derive(serde::Deserialize)]
        struct TimezoneRow {
            timezone: String,
        }

        let rows: Result<Vec<TimezoneRow>, _> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practices?id=eq.{}&select=timezone&limit=1", practice_id),
            None,
        ).await;

        rows.ok()
            .and_then(|rows| rows.into_iter().next())
            .map(|r| r.timezone)
            .unwrap_or_else(|| "America/New_York".to_string())
    }

    /// A patient's upcoming non-cancelled appointment: on a specific date
    /// when given, otherwise the next one from today on the practice's
    /// wall clock.
    pub async fn find_upcoming_appointment(
        &self,
        practice_id: Uuid,
        patient_id: Uuid,
        on_date: Option<NaiveDate>,
        practice_timezone: &str,
    ) -> Result<Option<Appointment>, BookingError> {
        let date_filter = match on_date {
            Some(date) => format!("&date=eq.{}", date),
            None => format!("&date=gte.{}", today_in_timezone(practice_timezone)),
        };

        let rows: Vec<Appointment> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointments?practice_id=eq.{}&patient_id=eq.{}&status=neq.cancelled{}&order=date.asc,time.asc&limit=1",
                practice_id, patient_id, date_filter,
            ),
            None,
        ).await?;

        Ok(rows.into_iter().next())
    }

    // ==========================================================================
    // BOOK
    // ==========================================================================

    /// Book an appointment after validating the type, the booking window,
    /// and slot availability.
    ///
    /// The availability check and the insert run under the per-slot lock so
    /// concurrent bookings for the same slot serialise and exactly one wins
    /// when the cap is reached.
    pub async fn book(&self, request: BookAppointmentRequest) -> Result<Appointment, BookingError> {
        let appt_type = self
            .get_appointment_type(request.practice_id, request.appointment_type_id)
            .await?
            .ok_or(BookingError::TypeNotFound)?;

        if !appt_type.is_active {
            return Err(BookingError::TypeInactive);
        }

        // Past dates and dates beyond the booking horizon are invalid on
        // the practice's wall clock, not the server's
        let timezone = self.practice_timezone_name(request.practice_id).await;
        let today = today_in_timezone(&timezone);
        if request.date < today {
            return Err(BookingError::Validation(
                "Cannot book an appointment in the past".to_string(),
            ));
        }
        let config = self.slot_service.practice_config(request.practice_id).await
            .map_err(BookingError::Database)?;
        let horizon = config.booking_horizon_days.max(1);
        if request.date > today + ChronoDuration::days(horizon as i64) {
            return Err(BookingError::Validation(format!(
                "Cannot book more than {} days ahead", horizon,
            )));
        }

        let slot_lock = SlotLockRegistry::global()
            .lock_for(request.practice_id, request.date, request.time);
        let _guard = slot_lock.lock().await;

        // Voice retries replay the same tool call; hand back the existing
        // booking instead of inserting a duplicate.
        if request.idempotency_key.is_some() {
            if let Some(existing) = self.find_existing_booking(&request).await? {
                info!(
                    "book: idempotent replay for appointment {} ({} {})",
                    existing.id, existing.date, existing.time,
                );
                return Ok(existing);
            }
        }

        let slots = self.slot_service
            .get_available_slots(request.practice_id, request.date, Some(appt_type.id))
            .await
            .map_err(BookingError::Database)?;

        let matching = slots.iter().find(|s| s.time == request.time);
        match matching {
            None => {
                return Err(BookingError::InvalidSlot {
                    date: request.date,
                    time: request.time,
                });
            }
            Some(slot) if !slot.is_available => {
                return Err(BookingError::ConflictFull {
                    date: request.date,
                    time: request.time,
                });
            }
            Some(_) => {}
        }

        let row = json!({
            "practice_id": request.practice_id,
            "patient_id": request.patient_id,
            "appointment_type_id": request.appointment_type_id,
            "date": request.date,
            "time": request.time,
            "duration_minutes": appt_type.duration_minutes,
            "status": AppointmentStatus::Booked,
            "booked_by": request.booked_by,
            "call_id": request.call_id,
            "notes": request.notes,
            "sms_confirmation_sent": false,
        });

        let appointment: Appointment = self.supabase
            .insert_returning("appointments", row)
            .await?;

        if let Err(e) = self.patient_service.clear_is_new(request.patient_id).await {
            warn!("book: failed to clear is_new for patient {}: {}", request.patient_id, e);
        }

        info!(
            "Booked appointment {} for patient {} on {} at {}",
            appointment.id, request.patient_id, request.date, request.time,
        );

        Ok(appointment)
    }

    async fn find_existing_booking(
        &self,
        request: &BookAppointmentRequest,
    ) -> Result<Option<Appointment>, BookingError> {
        let mut path = format!(
            "/rest/v1/appointments?practice_id=eq.{}&patient_id=eq.{}&date=eq.{}&time=eq.{}&status=in.(booked,confirmed)",
            request.practice_id, request.patient_id, request.date, request.time,
        );
        if let Some(call_id) = request.call_id {
            path.push_str(&format!("&call_id=eq.{}", call_id));
        }
        path.push_str("&limit=1");

        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    // ==========================================================================
    // CANCEL
    // ==========================================================================

    /// Cancel an appointment. Cancellation is a state, never a delete.
    /// Reminder and waitlist cascades are composed by the caller and must
    /// not roll this back.
    pub async fn cancel(
        &self,
        practice_id: Uuid,
        appointment_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Appointment, BookingError> {
        let appointment = self
            .get_appointment(practice_id, appointment_id)
            .await?
            .ok_or(BookingError::NotFound)?;

        if appointment.status == AppointmentStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }

        let notes = match reason {
            Some(reason) => Some(append_note(appointment.notes.as_deref(), &format!("Cancelled: {}", reason))),
            None => appointment.notes.clone(),
        };

        let updated: Vec<Appointment> = self.supabase.update_returning(
            &format!("/rest/v1/appointments?id=eq.{}&practice_id=eq.{}", appointment_id, practice_id),
            json!({
                "status": AppointmentStatus::Cancelled,
                "notes": notes,
            }),
        ).await?;

        let cancelled = updated.into_iter().next()
            .ok_or_else(|| BookingError::Database(anyhow!("Cancel update returned no rows")))?;

        info!(
            "Cancelled appointment {} on {} at {}",
            cancelled.id, cancelled.date, cancelled.time,
        );

        Ok(cancelled)
    }

    // ==========================================================================
    // RESCHEDULE
    // ==========================================================================

    /// Move an appointment: cancel the old slot with a reschedule note and
    /// book the new slot carrying over patient, type, booked_by and call.
    /// The new slot is validated first so an unavailable target leaves the
    /// original untouched.
    pub async fn reschedule(
        &self,
        practice_id: Uuid,
        appointment_id: Uuid,
        new_date: NaiveDate,
        new_time: NaiveTime,
        notes: Option<&str>,
    ) -> Result<Appointment, BookingError> {
        let old = self
            .get_appointment(practice_id, appointment_id)
            .await?
            .ok_or(BookingError::NotFound)?;

        if old.status == AppointmentStatus::Cancelled {
            return Err(BookingError::CancelledSource);
        }

        let slot_lock = SlotLockRegistry::global().lock_for(practice_id, new_date, new_time);
        let _guard = slot_lock.lock().await;

        let slots = self.slot_service
            .get_available_slots(practice_id, new_date, Some(old.appointment_type_id))
            .await
            .map_err(BookingError::Database)?;

        let matching = slots.iter().find(|s| s.time == new_time);
        match matching {
            None => {
                return Err(BookingError::InvalidSlot { date: new_date, time: new_time });
            }
            Some(slot) if !slot.is_available => {
                return Err(BookingError::ConflictFull { date: new_date, time: new_time });
            }
            Some(_) => {}
        }

        let new_row = json!({
            "practice_id": practice_id,
            "patient_id": old.patient_id,
            "appointment_type_id": old.appointment_type_id,
            "date": new_date,
            "time": new_time,
            "duration_minutes": old.duration_minutes,
            "status": AppointmentStatus::Booked,
            "booked_by": old.booked_by,
            "call_id": old.call_id,
            "notes": notes,
            "sms_confirmation_sent": false,
        });

        let new_appointment: Appointment = self.supabase
            .insert_returning("appointments", new_row)
            .await?;

        let reschedule_note = format!(
            "Rescheduled to {} {:02}:{:02}",
            new_date, new_time.hour(), new_time.minute(),
        );
        let cancel_result: Result<Vec<Appointment>, _> = self.supabase.update_returning(
            &format!("/rest/v1/appointments?id=eq.{}&practice_id=eq.{}", appointment_id, practice_id),
            json!({
                "status": AppointmentStatus::Cancelled,
                "notes": append_note(old.notes.as_deref(), &reschedule_note),
            }),
        ).await;

        if let Err(e) = cancel_result {
            // Compensate so the patient is not double-booked
            warn!(
                "reschedule: failed to cancel old appointment {}, removing new booking: {}",
                appointment_id, e,
            );
            let _: serde_json::Value = self.supabase.request(
                Method::DELETE,
                &format!("/rest/v1/appointments?id=eq.{}", new_appointment.id),
                None,
            ).await.unwrap_or_default();
            return Err(BookingError::Database(e));
        }

        info!(
            "Rescheduled appointment {} to {} ({} {})",
            appointment_id, new_appointment.id, new_date, new_time,
        );

        Ok(new_appointment)
    }

    // ==========================================================================
    // CONFIRM / STATUS
    // ==========================================================================

    /// Only booked appointments can be confirmed.
    pub async fn confirm(
        &self,
        practice_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Appointment, BookingError> {
        let appointment = self
            .get_appointment(practice_id, appointment_id)
            .await?
            .ok_or(BookingError::NotFound)?;

        if appointment.status != AppointmentStatus::Booked {
            return Err(BookingError::BadTransition { from: appointment.status });
        }

        let updated: Vec<Appointment> = self.supabase.update_returning(
            &format!("/rest/v1/appointments?id=eq.{}&practice_id=eq.{}", appointment_id, practice_id),
            json!({"status": AppointmentStatus::Confirmed}),
        ).await?;

        updated.into_iter().next()
            .ok_or_else(|| BookingError::Database(anyhow!("Confirm update returned no rows")))
    }

    /// Staff-driven status change (no_show, completed). Cancellation is
    /// terminal and must go through cancel().
    pub async fn update_status(
        &self,
        practice_id: Uuid,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, BookingError> {
        let appointment = self
            .get_appointment(practice_id, appointment_id)
            .await?
            .ok_or(BookingError::NotFound)?;

        if appointment.status.is_terminal() {
            return Err(BookingError::BadTransition { from: appointment.status });
        }
        if new_status == AppointmentStatus::Cancelled {
            return Err(BookingError::Validation(
                "Use the cancel operation to cancel an appointment".to_string(),
            ));
        }

        let updated: Vec<Appointment> = self.supabase.update_returning(
            &format!("/rest/v1/appointments?id=eq.{}&practice_id=eq.{}", appointment_id, practice_id),
            json!({"status": new_status}),
        ).await?;

        updated.into_iter().next()
            .ok_or_else(|| BookingError::Database(anyhow!("Status update returned no rows")))
    }

    // ==========================================================================
    // NEXT AVAILABLE
    // ==========================================================================

    /// Search forward up to the booking horizon for the first day with
    /// availability. With a preferred time, return that day's closest slot
    /// by wall-clock distance; otherwise its first slot.
    pub async fn find_next_available(
        &self,
        practice_id: Uuid,
        appointment_type_id: Option<Uuid>,
        from_date: NaiveDate,
        preferred_time: Option<NaiveTime>,
    ) -> Result<Option<NextAvailableSlot>, BookingError> {
        let config = self.slot_service.practice_config(practice_id).await
            .map_err(BookingError::Database)?;
        let horizon = config.booking_horizon_days.max(1);

        for day_offset in 0..horizon {
            let check_date = from_date + ChronoDuration::days(day_offset as i64);
            let slots = self.slot_service
                .get_available_slots(practice_id, check_date, appointment_type_id)
                .await
                .map_err(BookingError::Database)?;

            let available: Vec<_> = slots.into_iter().filter(|s| s.is_available).collect();
            if available.is_empty() {
                continue;
            }

            let chosen = match preferred_time {
                Some(preferred) => available.into_iter().min_by_key(|s| {
                    (s.time.num_seconds_from_midnight() as i64
                        - preferred.num_seconds_from_midnight() as i64)
                        .abs()
                }),
                None => available.into_iter().next(),
            };

            if let Some(slot) = chosen {
                debug!(
                    "find_next_available: practice={} -> {} {}",
                    practice_id, check_date, slot.time,
                );
                return Ok(Some(NextAvailableSlot { date: check_date, time: slot.time }));
            }
        }

        Ok(None)
    }
}

fn append_note(existing: Option<&str>, note: &str) -> String {
    match existing {
        Some(current) if !current.is_empty() => format!("{}\n{}", current, note),
        _ => note.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::append_note;

    #[test]
    fn appends_to_existing_notes() {
        assert_eq!(append_note(Some("first"), "second"), "first\nsecond");
        assert_eq!(append_note(None, "only"), "only");
        assert_eq!(append_note(Some(""), "only"), "only");
    }
}
