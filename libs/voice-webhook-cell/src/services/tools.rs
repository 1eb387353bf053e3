use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use booking_cell::models::{
    BookAppointmentRequest, BookedBy, BookingError, NewPatientFields, PatientSearchQuery,
};
use booking_cell::services::booking::BookingService;
use booking_cell::services::patients::PatientService;
use call_cell::models::{NewRefillRequest, NewVoicemail};
use call_cell::services::calls::CallService;
use reminder_cell::services::scheduler::ReminderScheduler;
use scheduling_cell::services::schedule::ScheduleService;
use scheduling_cell::services::slots::SlotService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::practice::PracticeConfig;
use shared_utils::timefmt::{
    format_date_long, format_time_12h, practice_timezone, DAY_NAMES,
};
use sms_cell::services::sms::SmsService;
use waitlist_cell::models::{CancelledSlot, NewWaitlistEntry};
use waitlist_cell::services::waitlist::WaitlistService;

use crate::models::EligibilityResult;
use crate::services::eligibility::EligibilityClient;

/// The caller is waiting on a live voice call; a hung tool must not freeze
/// the conversation.
pub const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(15);

const MAX_VOICEMAIL_CHARS: usize = 10_000;
const MAX_VOICEMAIL_REASON_CHARS: usize = 500;

/// Everything a tool invocation may need, constructed per webhook request.
pub struct ToolRuntime {
    config: AppConfig,
    supabase: SupabaseClient,
    booking_service: BookingService,
    patient_service: PatientService,
    slot_service: SlotService,
    schedule_service: ScheduleService,
    call_service: CallService,
    waitlist_service: WaitlistService,
    reminder_scheduler: ReminderScheduler,
    sms_service: SmsService,
}

impl ToolRuntime {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            supabase: SupabaseClient::new(config),
            booking_service: BookingService::new(config),
            patient_service: PatientService::new(config),
            slot_service: SlotService::new(config),
            schedule_service: ScheduleService::new(config),
            call_service: CallService::new(config),
            waitlist_service: WaitlistService::new(config),
            reminder_scheduler: ReminderScheduler::new(config),
            sms_service: SmsService::new(config),
        }
    }

    /// Route a tool call by name, bounded by the per-invocation timeout.
    /// The AI replays results to the caller, so internal error text never
    /// leaves this function.
    pub async fn dispatch(
        &self,
        practice_id: Uuid,
        tool_name: &str,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let invocation = self.dispatch_inner(practice_id, tool_name, params, vapi_call_id);

        match timeout(TOOL_CALL_TIMEOUT, invocation).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Tool {} timed out after {:?} (call={:?})",
                    tool_name, TOOL_CALL_TIMEOUT, vapi_call_id,
                );
                json!({"error": format!("Tool {} timed out. Please try again.", tool_name)})
            }
        }
    }

    async fn dispatch_inner(
        &self,
        practice_id: Uuid,
        tool_name: &str,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        match tool_name {
            "save_caller_info" => self.save_caller_info(practice_id, params, vapi_call_id).await,
            "check_patient_exists" => self.check_patient_exists(practice_id, params, vapi_call_id).await,
            "get_patient_details" => self.get_patient_details(practice_id, params, vapi_call_id).await,
            "check_availability" => self.check_availability(practice_id, params).await,
            "book_appointment" => self.book_appointment(practice_id, params, vapi_call_id).await,
            "verify_insurance" => self.verify_insurance(practice_id, params).await,
            "cancel_appointment" => self.cancel_appointment(practice_id, params, vapi_call_id).await,
            "reschedule_appointment" => self.reschedule_appointment(practice_id, params, vapi_call_id).await,
            "request_refill" => self.request_refill(practice_id, params, vapi_call_id).await,
            "transfer_to_staff" => self.transfer_to_staff(practice_id, params).await,
            "check_office_hours" => self.check_office_hours(practice_id).await,
            "leave_voicemail" => self.leave_voicemail(practice_id, params, vapi_call_id).await,
            "add_to_waitlist" => self.add_to_waitlist(practice_id, params, vapi_call_id).await,
            _ => {
                warn!("dispatch_tool_call: unknown tool '{}'", tool_name);
                json!({"error": format!("Unknown tool: {}", tool_name)})
            }
        }
    }

    // ==========================================================================
    // SHARED LOOKUPS
    // ==========================================================================

    async fn practice_timezone_name(&self, practice_id: Uuid) -> String {
        #[derive(Deserialize)]
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

    async fn practice_config(&self, practice_id: Uuid) -> Option<PracticeConfig> {
        let rows: Vec<PracticeConfig> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practice_configs?practice_id=eq.{}&limit=1", practice_id),
            None,
        ).await.ok()?;
        rows.into_iter().next()
    }

    async fn call_uuid(&self, vapi_call_id: Option<&str>) -> Option<Uuid> {
        let vapi_call_id = vapi_call_id?;
        self.call_service.get_call(vapi_call_id).await.ok().flatten().map(|c| c.id)
    }

    // ==========================================================================
    // 1. SAVE CALLER INFO
    // ==========================================================================

    /// Persist caller identity as soon as the assistant learns it, so a
    /// dropped call still has a name and number for callbacks.
    async fn save_caller_info(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let first_name = str_param(params, "first_name").unwrap_or_default();
        let last_name = str_param(params, "last_name").unwrap_or_default();
        let phone = str_param(params, "phone");
        let dob = str_param(params, "dob").and_then(|d| parse_date_param(&d));
        let reason = str_param(params, "reason");

        if first_name.is_empty() && last_name.is_empty() {
            return json!({"saved": false, "error": "At least a first or last name is required"});
        }

        let caller_name = format!("{} {}", first_name, last_name).trim().to_string();

        // Link to an existing patient when name + DOB line up
        let mut patient_id = None;
        if !first_name.is_empty() && !last_name.is_empty() {
            if let Some(dob) = dob {
                match self.patient_service.search_patients(practice_id, PatientSearchQuery {
                    first_name: Some(first_name.clone()),
                    last_name: Some(last_name.clone()),
                    dob: Some(dob),
                    phone: None,
                }).await {
                    Ok(patients) => patient_id = patients.first().map(|p| p.id),
                    Err(e) => warn!("save_caller_info: patient lookup failed: {}", e),
                }
            }
        }

        if let Some(call_id) = vapi_call_id {
            if let Err(e) = self.call_service.save_caller_info(
                call_id,
                Some(&caller_name),
                phone.as_deref(),
                patient_id,
            ).await {
                error!("save_caller_info: failed to update call record: {}", e);
                return json!({"saved": false, "error": "Failed to save caller info. Please try again."});
            }
        }

        let mut result = json!({
            "saved": true,
            "caller_name": caller_name,
            "is_existing_patient": patient_id.is_some(),
        });
        if let Some(id) = patient_id {
            result["patient_id"] = json!(id.to_string());
            result["message"] = json!(format!("Welcome back, {}! I found your record.", first_name));
        } else {
            result["message"] = json!(format!("Thank you, {}. I've noted your information.", first_name));
        }
        if let Some(reason) = reason {
            result["reason"] = json!(reason);
        }

        result
    }

    // ==========================================================================
    // 2. CHECK PATIENT EXISTS
    // ==========================================================================

    async fn check_patient_exists(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let Some(first_name) = str_param(params, "first_name") else {
            return json!({"exists": false, "error": "Missing required parameter: first_name"});
        };
        let Some(last_name) = str_param(params, "last_name") else {
            return json!({"exists": false, "error": "Missing required parameter: last_name"});
        };
        let Some(dob) = str_param(params, "dob").and_then(|d| parse_date_param(&d)) else {
            return json!({"exists": false, "error": "Missing or invalid required parameter: dob"});
        };

        let patients = match self.patient_service.search_patients(practice_id, PatientSearchQuery {
            first_name: Some(first_name),
            last_name: Some(last_name),
            dob: Some(dob),
            phone: None,
        }).await {
            Ok(patients) => patients,
            Err(e) => {
                error!("check_patient_exists failed: {}", e);
                return json!({"exists": false, "error": "Failed to check patient. Please try again."});
            }
        };

        let Some(patient) = patients.into_iter().next() else {
            return json!({"exists": false, "message": "Patient not found"});
        };

        if let Some(call_id) = vapi_call_id {
            if let Err(e) = self.call_service.link_call_to_patient(call_id, patient.id).await {
                warn!("check_patient_exists: failed to link call: {}", e);
            }
        }

        json!({
            "exists": true,
            "patient_id": patient.id.to_string(),
            "name": patient.full_name(),
            "phone": patient.phone.clone().unwrap_or_default(),
            "insurance": patient.insurance_carrier.clone().unwrap_or_default(),
        })
    }

    // ==========================================================================
    // 3. GET PATIENT DETAILS
    // ==========================================================================

    async fn get_patient_details(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let Some(patient_id) = str_param(params, "patient_id").and_then(|s| Uuid::parse_str(&s).ok()) else {
            return json!({"error": "Missing or invalid required parameter: patient_id"});
        };

        let patient = match self.patient_service.get_patient(practice_id, patient_id).await {
            Ok(Some(patient)) => patient,
            Ok(None) => return json!({"error": "Patient not found"}),
            Err(e) => {
                error!("get_patient_details failed: {}", e);
                return json!({"error": "Failed to get patient details. Please try again."});
            }
        };

        if let Some(call_id) = vapi_call_id {
            if let Err(e) = self.call_service.link_call_to_patient(call_id, patient.id).await {
                warn!("get_patient_details: failed to link call: {}", e);
            }
        }

        json!({
            "patient_id": patient.id.to_string(),
            "name": patient.full_name(),
            "first_name": patient.first_name,
            "last_name": patient.last_name,
            "dob": patient.dob.to_string(),
            "phone": patient.phone.clone().unwrap_or_default(),
            "address": patient.address.clone().unwrap_or_default(),
            "insurance_carrier": patient.insurance_carrier.clone().unwrap_or_default(),
            "member_id": patient.member_id.clone().unwrap_or_default(),
            "group_number": patient.group_number.clone().unwrap_or_default(),
            "referring_physician": patient.referring_physician.clone().unwrap_or_default(),
            "is_new": patient.is_new,
        })
    }

    // ==========================================================================
    // 4. CHECK AVAILABILITY
    // ==========================================================================

    async fn check_availability(&self, practice_id: Uuid, params: &Value) -> Value {
        let Some(target_date) = str_param(params, "date").and_then(|d| parse_date_param(&d)) else {
            return json!({"error": "Missing or invalid required parameter: date"});
        };

        let timezone = self.practice_timezone_name(practice_id).await;
        let today = Utc::now().with_timezone(&practice_timezone(&timezone)).date_naive();

        let date_display = friendly_date_display(target_date, today);

        if target_date < today {
            return json!({
                "date": target_date.to_string(),
                "date_display": date_display,
                "available_slots": [],
                "total_available": 0,
                "message": format!("That date is in the past. Today is {}.", format_date_long(today)),
                "today": today.to_string(),
            });
        }

        let booking_horizon = self.practice_config(practice_id).await
            .map(|c| c.booking_horizon_days)
            .unwrap_or(90);
        let max_future = today + ChronoDuration::days(booking_horizon as i64);
        if target_date > max_future {
            return json!({
                "date": target_date.to_string(),
                "date_display": date_display,
                "available_slots": [],
                "total_available": 0,
                "message": format!(
                    "We can only check availability up to {} days ahead. The latest date is {}.",
                    booking_horizon, format_date_long(max_future),
                ),
                "today": today.to_string(),
            });
        }

        let mut appointment_type_id = None;
        if let Some(type_name) = str_param(params, "appointment_type") {
            match self.booking_service.find_appointment_type_by_name(practice_id, &type_name).await {
                Ok(Some(appt_type)) => appointment_type_id = Some(appt_type.id),
                Ok(None) => {}
                Err(e) => warn!("check_availability: type lookup failed: {}", e),
            }
        }

        let slots = match self.slot_service
            .get_available_slots(practice_id, target_date, appointment_type_id)
            .await
        {
            Ok(slots) => slots,
            Err(e) => {
                error!("check_availability failed: {}", e);
                return json!({"error": "Failed to check availability. Please try again."});
            }
        };

        // Machine and spoken forms, deduplicated
        let mut seen = std::collections::HashSet::new();
        let available_slots: Vec<Value> = slots.iter()
            .filter(|s| s.is_available)
            .filter_map(|s| {
                let time_str = format!("{:02}:{:02}", chrono::Timelike::hour(&s.time), chrono::Timelike::minute(&s.time));
                if seen.insert(time_str.clone()) {
                    Some(json!({
                        "time": time_str,
                        "display": format_time_12h(s.time),
                    }))
                } else {
                    None
                }
            })
            .collect();

        if available_slots.is_empty() {
            return json!({
                "date": target_date.to_string(),
                "date_display": date_display,
                "available_slots": [],
                "total_available": 0,
                "message": format!("No availability on {}. Please try another date.", date_display),
                "today": today.to_string(),
            });
        }

        json!({
            "date": target_date.to_string(),
            "date_display": date_display,
            "total_available": available_slots.len(),
            "available_slots": available_slots,
            "today": today.to_string(),
        })
    }

    // ==========================================================================
    // 5. BOOK APPOINTMENT
    // ==========================================================================

    async fn book_appointment(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        // Resolve or create the patient
        let patient = if let Some(id) = str_param(params, "patient_id").and_then(|s| Uuid::parse_str(&s).ok()) {
            match self.patient_service.get_patient(practice_id, id).await {
                Ok(Some(patient)) => patient,
                Ok(None) => return json!({"success": false, "error": "Patient not found"}),
                Err(e) => {
                    error!("book_appointment: patient lookup failed: {}", e);
                    return json!({"success": false, "error": "Failed to book appointment. Please try again."});
                }
            }
        } else {
            let Some(first_name) = str_param(params, "first_name") else {
                return json!({"success": false, "error": "Missing required parameter: first_name"});
            };
            let Some(last_name) = str_param(params, "last_name") else {
                return json!({"success": false, "error": "Missing required parameter: last_name"});
            };
            let Some(dob) = str_param(params, "dob").and_then(|d| parse_date_param(&d)) else {
                return json!({"success": false, "error": "Missing or invalid required parameter: dob"});
            };

            match self.patient_service.find_or_create_patient(
                practice_id,
                &first_name,
                &last_name,
                dob,
                NewPatientFields {
                    phone: str_param(params, "phone"),
                    address: str_param(params, "address"),
                    insurance_carrier: str_param(params, "insurance_carrier"),
                    member_id: str_param(params, "member_id"),
                    referring_physician: str_param(params, "referring_physician"),
                    ..Default::default()
                },
            ).await {
                Ok(patient) => patient,
                Err(e) => {
                    error!("book_appointment: find_or_create_patient failed: {}", e);
                    return json!({"success": false, "error": "Failed to book appointment. Please try again."});
                }
            }
        };

        // Resolve the appointment type: fuzzy name match, then first active
        let mut appt_type = None;
        if let Some(type_name) = str_param(params, "appointment_type") {
            appt_type = self.booking_service
                .find_appointment_type_by_name(practice_id, &type_name)
                .await
                .unwrap_or_default();
        }
        if appt_type.is_none() {
            appt_type = match self.booking_service.first_active_appointment_type(practice_id).await {
                Ok(appt_type) => appt_type,
                Err(e) => {
                    error!("book_appointment: type lookup failed: {}", e);
                    return json!({"success": false, "error": "Failed to book appointment. Please try again."});
                }
            };
        }
        let Some(appt_type) = appt_type else {
            return json!({"success": false, "error": "No appointment types configured for this practice"});
        };

        let Some(date) = str_param(params, "date").and_then(|d| parse_date_param(&d)) else {
            return json!({"success": false, "error": "Missing or invalid required parameter: date"});
        };
        let Some(time) = str_param(params, "time").and_then(|t| parse_time_param(&t)) else {
            return json!({"success": false, "error": "Missing or invalid required parameter: time"});
        };

        let call_uuid = self.call_uuid(vapi_call_id).await;

        let appointment = match self.booking_service.book(BookAppointmentRequest {
            practice_id,
            patient_id: patient.id,
            appointment_type_id: appt_type.id,
            date,
            time,
            booked_by: BookedBy::Ai,
            call_id: call_uuid,
            notes: None,
            idempotency_key: vapi_call_id.map(|id| id.to_string()),
        }).await {
            Ok(appointment) => appointment,
            Err(e @ (BookingError::InvalidSlot { .. }
                | BookingError::ConflictFull { .. }
                | BookingError::TypeNotFound
                | BookingError::TypeInactive
                | BookingError::Validation(_))) => {
                info!("book_appointment: validation error: {}", e);
                return json!({"success": false, "error": e.to_string()});
            }
            Err(e) => {
                error!("book_appointment failed: {}", e);
                return json!({"success": false, "error": "Failed to book appointment. Please try again."});
            }
        };

        if let Some(call_id) = vapi_call_id {
            if let Err(e) = self.call_service.link_call_to_patient(call_id, patient.id).await {
                warn!("book_appointment: failed to link patient: {}", e);
            }
            if let Err(e) = self.call_service.link_call_to_appointment(call_id, appointment.id).await {
                warn!("book_appointment: failed to link appointment: {}", e);
            }
        }

        // Confirmation SMS and reminder scheduling are best-effort; the
        // booking is already committed.
        let sms_result = self.sms_service
            .send_appointment_confirmation(practice_id, appointment.id)
            .await;
        if !sms_result.success {
            info!(
                "book_appointment: confirmation SMS not sent for {}: {:?}",
                appointment.id, sms_result.error,
            );
        }

        let reminders_scheduled = match self.reminder_scheduler
            .schedule_appointment_reminders(practice_id, appointment.id)
            .await
        {
            Ok(reminders) => reminders.len(),
            Err(e) => {
                warn!("book_appointment: reminder scheduling failed for {}: {}", appointment.id, e);
                0
            }
        };

        json!({
            "success": true,
            "appointment_id": appointment.id.to_string(),
            "patient_id": patient.id.to_string(),
            "date": appointment.date.to_string(),
            "time": format!("{:02}:{:02}", chrono::Timelike::hour(&appointment.time), chrono::Timelike::minute(&appointment.time)),
            "patient_name": patient.full_name(),
            "appointment_type": appt_type.name,
            "sms_sent": sms_result.success,
            "reminders_scheduled": reminders_scheduled,
        })
    }
}

// ==============================================================================
// PARAM HELPERS
// ==============================================================================

pub fn str_param(params: &Value, key: &str) -> Option<String> {
    params.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn parse_date_param(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn parse_time_param(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn friendly_date_display(date: NaiveDate, today: NaiveDate) -> String {
    let base = format_date_long(date);
    if date == today {
        format!("Today ({})", base)
    } else if date == today + ChronoDuration::days(1) {
        format!("Tomorrow ({})", base)
    } else {
        base
    }
}

fn weekday_name(date: NaiveDate) -> &'static str {
    DAY_NAMES[chrono::Datelike::weekday(&date).num_days_from_monday() as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_dates_and_times() {
        assert_eq!(
            parse_date_param("2025-03-15"),
            NaiveDate::from_ymd_opt(2025, 3, 15),
        );
        assert!(parse_date_param("03/15/2025").is_none());
        assert_eq!(parse_time_param("10:00"), NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(parse_time_param("10:00:30"), NaiveTime::from_hms_opt(10, 0, 30));
        assert!(parse_time_param("10 AM").is_none());
    }

    #[test]
    fn str_param_trims_and_drops_empty() {
        let params = json!({"a": "  hi  ", "b": "", "c": 4});
        assert_eq!(str_param(&params, "a"), Some("hi".to_string()));
        assert_eq!(str_param(&params, "b"), None);
        assert_eq!(str_param(&params, "c"), None);
        assert_eq!(str_param(&params, "missing"), None);
    }

    #[test]
    fn friendly_dates_label_today_and_tomorrow() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert!(friendly_date_display(today, today).starts_with("Today ("));
        assert!(friendly_date_display(today + ChronoDuration::days(1), today).starts_with("Tomorrow ("));
        assert_eq!(
            friendly_date_display(today + ChronoDuration::days(5), today),
            "Thursday, March 20, 2025",
        );
    }
}

// ==============================================================================
// TOOLS 6-13
// ==============================================================================

impl ToolRuntime {
    // ==========================================================================
    // 6. CANCEL APPOINTMENT
    // ==========================================================================

    async fn cancel_appointment(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let Some(patient_id) = str_param(params, "patient_id").and_then(|s| Uuid::parse_str(&s).ok()) else {
            return json!({"success": false, "error": "Missing or invalid required parameter: patient_id"});
        };
        let appointment_date = str_param(params, "appointment_date")
            .and_then(|d| parse_date_param(&d));

        let timezone = self.practice_timezone_name(practice_id).await;
        let appointment = match self.booking_service
            .find_upcoming_appointment(practice_id, patient_id, appointment_date, &timezone)
            .await
        {
            Ok(Some(appointment)) => appointment,
            Ok(None) => {
                return json!({"success": false, "error": "No upcoming appointment found for this patient"});
            }
            Err(e) => {
                error!("cancel_appointment: lookup failed: {}", e);
                return json!({"success": false, "error": "Failed to cancel appointment. Please try again."});
            }
        };

        let cancelled = match self.booking_service
            .cancel(practice_id, appointment.id, Some("Cancelled by patient via phone"))
            .await
        {
            Ok(cancelled) => cancelled,
            Err(e @ BookingError::AlreadyCancelled) => {
                info!("cancel_appointment: {}", e);
                return json!({"success": false, "error": e.to_string()});
            }
            Err(e) => {
                error!("cancel_appointment failed: {}", e);
                return json!({"success": false, "error": "Failed to cancel appointment. Please try again."});
            }
        };

        // Cascades are best-effort and never block the cancellation response
        if let Err(e) = self.reminder_scheduler.cancel_reminders(cancelled.id).await {
            warn!("cancel_appointment: failed to cancel reminders: {}", e);
        }

        if let Some(call_id) = vapi_call_id {
            if let Err(e) = self.call_service.link_call_to_patient(call_id, patient_id).await {
                warn!("cancel_appointment: failed to link call: {}", e);
            }
        }

        let mut waitlist_notified = 0;
        match self.waitlist_service.check_on_cancellation(practice_id, CancelledSlot {
            date: cancelled.date,
            time: cancelled.time,
            appointment_type_id: cancelled.appointment_type_id,
        }).await {
            Ok(notifications) => {
                waitlist_notified = notifications.iter().filter(|n| n.sms_success).count();
                if waitlist_notified > 0 {
                    info!(
                        "Waitlist: notified {} patient(s) about cancelled slot on {} at {}",
                        waitlist_notified, cancelled.date, cancelled.time,
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Waitlist check failed after cancellation of appointment {}: {}",
                    cancelled.id, e,
                );
            }
        }

        json!({
            "success": true,
            "cancelled_date": cancelled.date.to_string(),
            "cancelled_time": format!("{:02}:{:02}", chrono::Timelike::hour(&cancelled.time), chrono::Timelike::minute(&cancelled.time)),
            "waitlist_notified": waitlist_notified,
        })
    }

    // ==========================================================================
    // 7. RESCHEDULE APPOINTMENT
    // ==========================================================================

    async fn reschedule_appointment(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let Some(patient_id) = str_param(params, "patient_id").and_then(|s| Uuid::parse_str(&s).ok()) else {
            return json!({"success": false, "error": "Missing or invalid required parameter: patient_id"});
        };
        let Some(new_date) = str_param(params, "new_date").and_then(|d| parse_date_param(&d)) else {
            return json!({"success": false, "error": "Missing or invalid required parameter: new_date"});
        };
        let Some(new_time) = str_param(params, "new_time").and_then(|t| parse_time_param(&t)) else {
            return json!({"success": false, "error": "Missing or invalid required parameter: new_time"});
        };
        let old_date = str_param(params, "old_date").and_then(|d| parse_date_param(&d));

        let timezone = self.practice_timezone_name(practice_id).await;
        let appointment = match self.booking_service
            .find_upcoming_appointment(practice_id, patient_id, old_date, &timezone)
            .await
        {
            Ok(Some(appointment)) => appointment,
            Ok(None) => {
                return json!({"success": false, "error": "No upcoming appointment found for this patient"});
            }
            Err(e) => {
                error!("reschedule_appointment: lookup failed: {}", e);
                return json!({"success": false, "error": "Failed to reschedule appointment. Please try again."});
            }
        };

        let old_appt_date = appointment.date;
        let old_appt_time = appointment.time;

        let new_appointment = match self.booking_service
            .reschedule(practice_id, appointment.id, new_date, new_time, None)
            .await
        {
            Ok(new_appointment) => new_appointment,
            Err(e @ (BookingError::InvalidSlot { .. }
                | BookingError::ConflictFull { .. }
                | BookingError::CancelledSource)) => {
                info!("reschedule_appointment: validation error: {}", e);
                return json!({"success": false, "error": e.to_string()});
            }
            Err(e) => {
                error!("reschedule_appointment failed: {}", e);
                return json!({"success": false, "error": "Failed to reschedule appointment. Please try again."});
            }
        };

        // Move the reminder set to the new slot
        if let Err(e) = self.reminder_scheduler.cancel_reminders(appointment.id).await {
            warn!("reschedule_appointment: failed to cancel old reminders: {}", e);
        }
        if let Err(e) = self.reminder_scheduler
            .schedule_appointment_reminders(practice_id, new_appointment.id)
            .await
        {
            warn!("reschedule_appointment: failed to schedule new reminders: {}", e);
        }

        if let Some(call_id) = vapi_call_id {
            if let Err(e) = self.call_service.link_call_to_patient(call_id, patient_id).await {
                warn!("reschedule_appointment: failed to link patient: {}", e);
            }
            if let Err(e) = self.call_service.link_call_to_appointment(call_id, new_appointment.id).await {
                warn!("reschedule_appointment: failed to link appointment: {}", e);
            }
        }

        json!({
            "success": true,
            "old_date": old_appt_date.to_string(),
            "old_time": format!("{:02}:{:02}", chrono::Timelike::hour(&old_appt_time), chrono::Timelike::minute(&old_appt_time)),
            "new_date": new_appointment.date.to_string(),
            "new_time": format!("{:02}:{:02}", chrono::Timelike::hour(&new_appointment.time), chrono::Timelike::minute(&new_appointment.time)),
            "appointment_id": new_appointment.id.to_string(),
        })
    }

    // ==========================================================================
    // 8. VERIFY INSURANCE
    // ==========================================================================

    async fn verify_insurance(&self, practice_id: Uuid, params: &Value) -> Value {
        let carrier = str_param(params, "insurance_carrier").unwrap_or_default();
        let member_id = str_param(params, "member_id").unwrap_or_default();

        if carrier.is_empty() || member_id.is_empty() {
            return json!({
                "verified": false,
                "error": "Insurance carrier name and member ID are required",
            });
        }

        let recorded_ack = json!({
            "verified": true,
            "carrier": carrier,
            "member_id": member_id,
            "message": "Insurance information has been recorded. \
                        We'll verify coverage before your appointment.",
        });

        let Some(config) = self.practice_config(practice_id).await else {
            return recorded_ack;
        };
        if !config.eligibility_enabled {
            return recorded_ack;
        }
        let Some(api_key) = config.eligibility_api_key.filter(|k| !k.is_empty()) else {
            return recorded_ack;
        };

        let first_name = str_param(params, "first_name").unwrap_or_default();
        let last_name = str_param(params, "last_name").unwrap_or_default();
        let dob = str_param(params, "dob").and_then(|d| parse_date_param(&d));

        let eligibility = EligibilityClient::new(&self.config);
        let result = match eligibility
            .check_eligibility(&api_key, &carrier, &member_id, &first_name, &last_name, dob)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                // Raw provider errors never reach the caller
                error!("verify_insurance: eligibility check failed: {}", e);
                EligibilityResult {
                    error: Some("eligibility check failed".to_string()),
                    ..Default::default()
                }
            }
        };

        if result.error.is_some() {
            return json!({
                "verified": false,
                "carrier": carrier,
                "member_id": member_id,
                "message": "I wasn't able to verify insurance coverage right now. \
                            We'll verify it before your appointment.",
            });
        }

        if result.is_active {
            let mut parts = vec![format!(
                "Insurance with {} is active",
                result.carrier.as_deref().unwrap_or(&carrier),
            )];
            if let Some(copay) = result.copay {
                parts.push(format!("copay is ${}", copay));
            }
            if let Some(plan) = &result.plan_name {
                parts.push(format!("plan: {}", plan));
            }
            json!({
                "verified": true,
                "is_active": true,
                "carrier": result.carrier.as_deref().unwrap_or(&carrier),
                "member_id": member_id,
                "copay": result.copay.map(|c| c.to_string()),
                "plan_name": result.plan_name,
                "message": parts.join(". "),
            })
        } else {
            json!({
                "verified": true,
                "is_active": false,
                "carrier": result.carrier.as_deref().unwrap_or(&carrier),
                "member_id": member_id,
                "message": format!(
                    "Coverage with {} appears to be inactive. Please bring your \
                     insurance card to your appointment so we can verify.",
                    result.carrier.as_deref().unwrap_or(&carrier),
                ),
            })
        }
    }

    // ==========================================================================
    // 9. REQUEST REFILL
    // ==========================================================================

    async fn request_refill(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let Some(medication_name) = str_param(params, "medication_name") else {
            return json!({"success": false, "error": "Medication name is required"});
        };

        let mut patient_id = str_param(params, "patient_id")
            .and_then(|s| Uuid::parse_str(&s).ok());

        let mut call_id = None;
        let mut caller_phone = None;
        if let Some(vapi_id) = vapi_call_id {
            if let Ok(Some(call)) = self.call_service.get_call(vapi_id).await {
                call_id = Some(call.id);
                caller_phone = call.caller_phone.clone();
                if patient_id.is_none() {
                    patient_id = call.patient_id;
                }
            }
        }

        let refill = match self.call_service.create_refill_request(practice_id, NewRefillRequest {
            patient_id,
            call_id,
            medication_name: medication_name.clone(),
            dosage: str_param(params, "dosage"),
            pharmacy_name: str_param(params, "pharmacy_name"),
            pharmacy_phone: str_param(params, "pharmacy_phone"),
            caller_name: str_param(params, "caller_name"),
            caller_phone,
        }).await {
            Ok(refill) => refill,
            Err(e) => {
                error!("request_refill failed: {}", e);
                return json!({"success": false, "error": "Failed to submit refill request. Please try again."});
            }
        };

        json!({
            "success": true,
            "refill_id": refill.id.to_string(),
            "medication_name": medication_name,
            "message": format!(
                "Your prescription refill request for {} has been submitted. \
                 The doctor's office will review it and process it within 24 to 48 hours.",
                medication_name,
            ),
        })
    }

    // ==========================================================================
    // 10. TRANSFER TO STAFF
    // ==========================================================================

    async fn transfer_to_staff(&self, practice_id: Uuid, params: &Value) -> Value {
        let reason = str_param(params, "reason")
            .unwrap_or_else(|| "Caller requested staff transfer".to_string());

        let transfer_number = self.practice_config(practice_id).await
            .and_then(|c| c.transfer_number)
            .filter(|n| !n.is_empty());

        match transfer_number {
            Some(number) => json!({
                "transfer": true,
                "number": number,
                "reason": reason,
            }),
            None => json!({
                "transfer": false,
                "message": "No staff transfer number configured. \
                            Please call back during office hours.",
            }),
        }
    }

    // ==========================================================================
    // 11. CHECK OFFICE HOURS
    // ==========================================================================

    async fn check_office_hours(&self, practice_id: Uuid) -> Value {
        let timezone = self.practice_timezone_name(practice_id).await;
        let now = Utc::now().with_timezone(&practice_timezone(&timezone));
        let today = now.date_naive();
        let current_time = now.time();

        let today_schedule = match self.schedule_service.resolve_schedule(practice_id, today).await {
            Ok(schedule) => schedule,
            Err(e) => {
                error!("check_office_hours failed: {}", e);
                return json!({
                    "is_open": Value::Null,
                    "error": "Failed to check office hours. Please try again.",
                    "message": "I'm unable to verify our current hours right now. \
                                Please call back or check our website.",
                });
            }
        };

        let is_open = match (today_schedule.is_working, today_schedule.start_time, today_schedule.end_time) {
            (true, Some(start), Some(end)) => start <= current_time && current_time <= end,
            _ => false,
        };

        // Next opening: later today, or walk up to a week forward
        let mut next_open = None;
        if !is_open {
            if let (true, Some(start)) = (today_schedule.is_working, today_schedule.start_time) {
                if current_time < start {
                    next_open = Some(format!("{} at {}", weekday_name(today), format_time_12h(start)));
                }
            }
            if next_open.is_none() {
                for offset in 1..=7 {
                    let check_date = today + ChronoDuration::days(offset);
                    match self.schedule_service.resolve_schedule(practice_id, check_date).await {
                        Ok(schedule) if schedule.is_working => {
                            if let Some(start) = schedule.start_time {
                                next_open = Some(format!(
                                    "{} at {}",
                                    weekday_name(check_date),
                                    format_time_12h(start),
                                ));
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("check_office_hours: forward lookup failed: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        let regular_hours: Vec<String> = match self.schedule_service.enabled_weekly_hours(practice_id).await {
            Ok(templates) => templates.iter()
                .filter_map(|t| {
                    let start = t.start_time?;
                    let end = t.end_time?;
                    let day = DAY_NAMES.get(t.day_of_week.max(0) as usize)?;
                    Some(format!("{}: {} - {}", day, format_time_12h(start), format_time_12h(end)))
                })
                .collect(),
            Err(e) => {
                warn!("check_office_hours: weekly hours lookup failed: {}", e);
                Vec::new()
            }
        };

        let mut result = json!({
            "is_open": is_open,
            "current_day": weekday_name(today),
            "current_time": format!("{:02}:{:02}", chrono::Timelike::hour(&current_time), chrono::Timelike::minute(&current_time)),
            "regular_hours": regular_hours,
        });

        if let (Some(start), Some(end)) = (today_schedule.start_time, today_schedule.end_time) {
            result["today_hours"] = json!(format!(
                "{} - {}", format_time_12h(start), format_time_12h(end),
            ));
        }
        if let Some(next_open) = next_open {
            result["next_open"] = json!(next_open);
        }

        result
    }

    // ==========================================================================
    // 12. LEAVE VOICEMAIL
    // ==========================================================================

    async fn leave_voicemail(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let Some(message) = str_param(params, "message") else {
            return json!({"success": false, "error": "Message is required"});
        };

        let urgency = match str_param(params, "urgency").as_deref() {
            Some(value @ ("normal" | "urgent" | "emergency")) => value.to_string(),
            _ => "normal".to_string(),
        };

        let mut caller_name = str_param(params, "caller_name");
        let mut caller_phone = str_param(params, "caller_phone");
        let mut patient_id = str_param(params, "patient_id")
            .and_then(|s| Uuid::parse_str(&s).ok());

        let mut call_id = None;
        if let Some(vapi_id) = vapi_call_id {
            if let Ok(Some(call)) = self.call_service.get_call(vapi_id).await {
                call_id = Some(call.id);
                if caller_phone.is_none() {
                    caller_phone = call.caller_phone.clone();
                }
                if caller_name.is_none() {
                    caller_name = call.caller_name.clone();
                }
                if patient_id.is_none() {
                    patient_id = call.patient_id;
                }
            }
        }

        // AI-generated content is size-capped before storage
        let safe_message: String = message.chars().take(MAX_VOICEMAIL_CHARS).collect();
        let safe_reason = str_param(params, "reason")
            .map(|r| r.chars().take(MAX_VOICEMAIL_REASON_CHARS).collect::<String>());

        let voicemail = match self.call_service.create_voicemail(practice_id, NewVoicemail {
            call_id,
            patient_id,
            caller_name,
            caller_phone,
            message: safe_message,
            urgency,
            callback_requested: params.get("callback_requested")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
            preferred_callback_time: str_param(params, "preferred_callback_time"),
            reason: safe_reason,
        }).await {
            Ok(voicemail) => voicemail,
            Err(e) => {
                error!("leave_voicemail failed: {}", e);
                return json!({"success": false, "error": "Failed to save voicemail. Please try again."});
            }
        };

        json!({
            "success": true,
            "voicemail_id": voicemail.id.to_string(),
            "message": "Your message has been saved. \
                        Someone from our office will get back to you when we reopen.",
        })
    }

    // ==========================================================================
    // 13. ADD TO WAITLIST
    // ==========================================================================

    async fn add_to_waitlist(
        &self,
        practice_id: Uuid,
        params: &Value,
        vapi_call_id: Option<&str>,
    ) -> Value {
        let Some(patient_name) = str_param(params, "patient_name") else {
            return json!({"success": false, "error": "Patient name is required"});
        };
        let Some(patient_phone) = str_param(params, "patient_phone") else {
            return json!({"success": false, "error": "Patient phone number is required"});
        };

        let mut appointment_type_id = None;
        if let Some(type_name) = str_param(params, "appointment_type") {
            if let Ok(Some(appt_type)) = self.booking_service
                .find_appointment_type_by_name(practice_id, &type_name)
                .await
            {
                appointment_type_id = Some(appt_type.id);
            }
        }

        let mut patient_id = None;
        if let Some(vapi_id) = vapi_call_id {
            if let Ok(Some(call)) = self.call_service.get_call(vapi_id).await {
                patient_id = call.patient_id;
            }
        }

        let mut notes = str_param(params, "notes").unwrap_or_default();
        if let Some(preferred_dates) = str_param(params, "preferred_dates") {
            let pref_note = format!("Preferred dates: {}", preferred_dates);
            notes = if notes.is_empty() {
                pref_note
            } else {
                format!("{}\n{}", notes, pref_note)
            };
        }

        let entry = match self.waitlist_service.add_to_waitlist(practice_id, NewWaitlistEntry {
            patient_id,
            patient_name: patient_name.clone(),
            patient_phone,
            appointment_type_id,
            notes: if notes.is_empty() { None } else { Some(notes) },
            ..Default::default()
        }).await {
            Ok(entry) => entry,
            Err(e) => {
                error!("add_to_waitlist failed: {}", e);
                return json!({"success": false, "error": "Failed to add to waitlist. Please try again."});
            }
        };

        let first_name = patient_name.split_whitespace().next().unwrap_or("you");
        json!({
            "success": true,
            "waitlist_id": entry.id.to_string(),
            "patient_name": patient_name,
            "message": format!(
                "I've added {} to our waitlist. If a slot opens up, we'll send a \
                 text message to confirm. Is there anything else I can help you with?",
                first_name,
            ),
        })
    }
}
