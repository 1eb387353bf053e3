use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use urlencoding::encode;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::timefmt::{format_date_long, format_time_12h, today_in_timezone};
use sms_cell::services::sms::SmsService;

use crate::models::{
    CancelledSlot, NewWaitlistEntry, NotificationResult, WaitlistEntry, WaitlistStats,
    WaitlistStatus,
};

/// How long a notified patient has to claim the slot.
const OFFER_WINDOW_HOURS: i64 = 2;

/// How many matching patients get the offer per cancellation.
const MAX_NOTIFICATIONS_PER_SLOT: usize = 3;

#[derive(Debug, Deserialize)]
struct PracticeNameRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatusRow {
    status: WaitlistStatus,
}

#[derive(Debug, Deserialize)]
struct WaitingExpiryRow {
    id: Uuid,
    practice_id: Uuid,
    preferred_date_end: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct PracticeTimezoneRow {
    id: Uuid,
    timezone: String,
}

pub struct WaitlistService {
    supabase: SupabaseClient,
    sms_service: SmsService,
}

impl WaitlistService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            sms_service: SmsService::new(config),
        }
    }

    // ==========================================================================
    // ADD
    // ==========================================================================

    pub async fn add_to_waitlist(
        &self,
        practice_id: Uuid,
        entry: NewWaitlistEntry,
    ) -> Result<WaitlistEntry> {
        let priority = entry.priority.unwrap_or(3);
        if !(1..=5).contains(&priority) {
            return Err(anyhow!("Priority must be between 1 and 5"));
        }

        let row = json!({
            "practice_id": practice_id,
            "patient_id": entry.patient_id,
            "patient_name": entry.patient_name,
            "patient_phone": entry.patient_phone,
            "appointment_type_id": entry.appointment_type_id,
            "preferred_date_start": entry.preferred_date_start,
            "preferred_date_end": entry.preferred_date_end,
            "preferred_time_start": entry.preferred_time_start,
            "preferred_time_end": entry.preferred_time_end,
            "notes": entry.notes,
            "priority": priority,
            "status": WaitlistStatus::Waiting,
        });

        let created: WaitlistEntry = self.supabase.insert_returning("waitlist_entries", row).await?;
        info!(
            "Patient '{}' added to waitlist for practice {} (entry {})",
            created.patient_name, practice_id, created.id,
        );
        Ok(created)
    }

    // ==========================================================================
    // MATCH ON CANCELLATION
    // ==========================================================================

    /// Offer a freed slot to matching waiting entries: same appointment
    /// type when the entry filters on one, cancelled date/time inside the
    /// entry's preferred ranges. Highest priority first, then oldest.
    pub async fn check_on_cancellation(
        &self,
        practice_id: Uuid,
        slot: CancelledSlot,
    ) -> Result<Vec<NotificationResult>> {
        let candidates: Vec<WaitlistEntry> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/waitlist_entries?practice_id=eq.{}&status=eq.waiting&order=priority.asc,created_at.asc",
                practice_id,
            ),
            None,
        ).await?;

        // Range fields are optional; filtering in process keeps the query simple
        let matching = candidates.into_iter().filter(|entry| {
            if let Some(type_id) = entry.appointment_type_id {
                if type_id != slot.appointment_type_id {
                    return false;
                }
            }
            if let Some(start) = entry.preferred_date_start {
                if slot.date < start {
                    return false;
                }
            }
            if let Some(end) = entry.preferred_date_end {
                if slot.date > end {
                    return false;
                }
            }
            if let Some(start) = entry.preferred_time_start {
                if slot.time < start {
                    return false;
                }
            }
            if let Some(end) = entry.preferred_time_end {
                if slot.time > end {
                    return false;
                }
            }
            true
        });

        let mut notifications = Vec::new();
        for entry in matching.take(MAX_NOTIFICATIONS_PER_SLOT) {
            match self.notify_entry(&entry, slot).await {
                Ok(result) => notifications.push(result),
                Err(e) => {
                    error!("Failed to notify waitlist entry {}: {}", entry.id, e);
                    notifications.push(NotificationResult {
                        entry_id: entry.id,
                        patient_name: entry.patient_name.clone(),
                        patient_phone: entry.patient_phone.clone(),
                        sms_success: false,
                        message_sid: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(notifications)
    }

    async fn notify_entry(
        &self,
        entry: &WaitlistEntry,
        slot: CancelledSlot,
    ) -> Result<NotificationResult> {
        let practices: Vec<PracticeNameRow> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practices?id=eq.{}&select=name&limit=1", entry.practice_id),
            None,
        ).await?;
        let practice_name = practices.into_iter().next()
            .map(|p| p.name)
            .unwrap_or_else(|| "the doctor's office".to_string());

        let first_name = entry.patient_name
            .split_whitespace()
            .next()
            .unwrap_or("there");

        let body = format!(
            "Hi {}, a slot opened up at {} on {} at {}. \
             Reply YES to book or NO to pass. This offer expires in 2 hours.",
            first_name,
            practice_name,
            format_date_long(slot.date),
            format_time_12h(slot.time),
        );

        let sms_result = self.sms_service
            .send_custom_sms(entry.practice_id, &entry.patient_phone, &body)
            .await;

        let now = Utc::now();
        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/waitlist_entries?id=eq.{}", entry.id),
            Some(json!({
                "status": WaitlistStatus::Notified,
                "notified_at": now,
                "expires_at": now + ChronoDuration::hours(OFFER_WINDOW_HOURS),
            })),
        ).await?;

        info!(
            "Waitlist notification sent for entry {} (SMS success: {})",
            entry.id, sms_result.success,
        );

        Ok(NotificationResult {
            entry_id: entry.id,
            patient_name: entry.patient_name.clone(),
            patient_phone: entry.patient_phone.clone(),
            sms_success: sms_result.success,
            message_sid: sms_result.message_sid,
            error: sms_result.error,
        })
    }

    // ==========================================================================
    // REPLY
    // ==========================================================================

    /// Handle a YES/NO reply from a notified patient. YES marks the entry
    /// booked (the actual booking is staff-driven); NO releases the offer.
    pub async fn process_response(&self, patient_phone: &str, response: &str) -> Result<Option<(WaitlistEntry, &'static str)>> {
        let normalized = response.trim().to_uppercase();
        if normalized != "YES" && normalized != "NO" {
            return Ok(None);
        }

        let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let entries: Vec<WaitlistEntry> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/waitlist_entries?patient_phone=eq.{}&status=eq.notified&expires_at=gt.{}&order=notified_at.desc&limit=1",
                encode(patient_phone), now,
            ),
            None,
        ).await?;

        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };

        let (new_status, action) = if normalized == "YES" {
            (WaitlistStatus::Booked, "booked")
        } else {
            (WaitlistStatus::Cancelled, "declined")
        };

        let updated: Vec<WaitlistEntry> = self.supabase.update_returning(
            &format!("/rest/v1/waitlist_entries?id=eq.{}", entry.id),
            json!({"status": new_status}),
        ).await?;

        info!("Waitlist entry {} marked {} via SMS reply", entry.id, new_status);

        Ok(updated.into_iter().next().map(|e| (e, action)))
    }

    // ==========================================================================
    // EXPIRY SWEEP
    // ==========================================================================

    /// Expire notified entries past their offer window and waiting entries
    /// whose preferred date range has fully passed. Runs across tenants;
    /// the date comparison uses each practice's own wall clock.
    pub async fn expire_old_entries(&self) -> Result<usize> {
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let expired_notified: Vec<WaitlistEntry> = self.supabase.update_returning(
            &format!(
                "/rest/v1/waitlist_entries?status=eq.notified&expires_at=lte.{}",
                now,
            ),
            json!({"status": WaitlistStatus::Expired}),
        ).await?;

        let expired_waiting = self.expire_stale_waiting_entries().await?;

        let expired_count = expired_notified.len() + expired_waiting;
        if expired_count > 0 {
            info!("Expired {} waitlist entries", expired_count);
        }

        Ok(expired_count)
    }

    async fn expire_stale_waiting_entries(&self) -> Result<usize> {
        let candidates: Vec<WaitingExpiryRow> = self.supabase.request(
            Method::GET,
            "/rest/v1/waitlist_entries?status=eq.waiting&preferred_date_end=not.is.null&select=id,practice_id,preferred_date_end",
            None,
        ).await?;

        if candidates.is_empty() {
            return Ok(0);
        }

        let practice_ids = candidates.iter()
            .map(|c| c.practice_id.to_string())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(",");
        let practices: Vec<PracticeTimezoneRow> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practices?id=in.({})&select=id,timezone", practice_ids),
            None,
        ).await?;
        let timezones: HashMap<Uuid, String> = practices.into_iter()
            .map(|p| (p.id, p.timezone))
            .collect();

        let expired_ids: Vec<String> = candidates.iter()
            .filter(|c| {
                let timezone = timezones.get(&c.practice_id)
                    .map(String::as_str)
                    .unwrap_or("America/New_York");
                c.preferred_date_end < today_in_timezone(timezone)
            })
            .map(|c| c.id.to_string())
            .collect();

        if expired_ids.is_empty() {
            return Ok(0);
        }

        let expired: Vec<Value> = self.supabase.update_returning(
            &format!(
                "/rest/v1/waitlist_entries?id=in.({})&status=eq.waiting",
                expired_ids.join(","),
            ),
            json!({"status": WaitlistStatus::Expired}),
        ).await?;

        Ok(expired.len())
    }

    // ==========================================================================
    // STATS
    // ==========================================================================

    pub async fn waitlist_stats(&self, practice_id: Uuid) -> Result<WaitlistStats> {
        let rows: Vec<StatusRow> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/waitlist_entries?practice_id=eq.{}&select=status",
                practice_id,
            ),
            None,
        ).await?;

        let mut stats = WaitlistStats::default();
        for row in &rows {
            match row.status {
                WaitlistStatus::Waiting => stats.total_waiting += 1,
                WaitlistStatus::Notified => stats.total_notified += 1,
                WaitlistStatus::Booked => stats.total_booked += 1,
                WaitlistStatus::Expired => stats.total_expired += 1,
                WaitlistStatus::Cancelled => stats.total_cancelled += 1,
            }
        }

        let booked: Vec<WaitlistEntry> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/waitlist_entries?practice_id=eq.{}&status=eq.booked&notified_at=not.is.null",
                practice_id,
            ),
            None,
        ).await?;

        if !booked.is_empty() {
            let total_wait_seconds: i64 = booked.iter()
                .filter_map(|e| match (e.notified_at, e.created_at) {
                    (Some(notified), Some(created)) => Some((notified - created).num_seconds()),
                    _ => None,
                })
                .sum();
            stats.avg_wait_hours = Some(
                (total_wait_seconds as f64 / booked.len() as f64 / 3600.0 * 10.0).round() / 10.0,
            );
        }

        let resolved_total = stats.total_booked + stats.total_expired + stats.total_cancelled;
        if resolved_total > 0 {
            stats.conversion_rate =
                (stats.total_booked as f64 / resolved_total as f64 * 1000.0).round() / 10.0;
        }

        Ok(stats)
    }
}
