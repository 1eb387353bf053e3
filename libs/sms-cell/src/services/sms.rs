use anyhow::{Result, anyhow};
use reqwest::Method;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use booking_cell::models::Appointment;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::patient::Patient;
use shared_models::practice::{Practice, PracticeConfig};
use shared_utils::timefmt::format_appointment_datetime;

use crate::models::{SmsSendResult, TwilioCredentials};
use crate::templates::{default_confirmation_template, render_template, truncate_body};
use crate::services::twilio::send_sms;

pub struct SmsService {
    supabase: SupabaseClient,
    config: AppConfig,
}

impl SmsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            config: config.clone(),
        }
    }

    /// Resolve SMS provider credentials for a practice: tenant overrides
    /// first, then the global environment credentials.
    pub async fn twilio_credentials(&self, practice_id: Uuid) -> Result<TwilioCredentials> {
        let configs: Vec<PracticeConfig> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practice_configs?practice_id=eq.{}&limit=1", practice_id),
            None,
        ).await?;
        let practice_config = configs.into_iter().next();

        let account_sid = practice_config
            .as_ref()
            .and_then(|c| c.twilio_account_sid.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.twilio_account_sid.clone());

        let auth_token = practice_config
            .as_ref()
            .and_then(|c| c.twilio_auth_token.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.twilio_auth_token.clone());

        let from_number = practice_config
            .as_ref()
            .and_then(|c| c.twilio_from_number.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.twilio_from_number.clone());

        if account_sid.is_empty() {
            return Err(anyhow!(
                "Twilio Account SID not configured for practice {} and no global SID is set",
                practice_id,
            ));
        }
        if auth_token.is_empty() {
            return Err(anyhow!(
                "Twilio auth token not configured for practice {} and no global token is set",
                practice_id,
            ));
        }
        if from_number.is_empty() {
            return Err(anyhow!(
                "Twilio sender number not configured for practice {}",
                practice_id,
            ));
        }

        Ok(TwilioCredentials { account_sid, auth_token, from_number })
    }

    /// Send an arbitrary message to a number on behalf of a practice.
    pub async fn send_custom_sms(
        &self,
        practice_id: Uuid,
        to_number: &str,
        body: &str,
    ) -> SmsSendResult {
        let credentials = match self.twilio_credentials(practice_id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("send_custom_sms: credentials error for practice {}: {}", practice_id, e);
                return SmsSendResult::failed(format!("SMS credentials not configured: {}", e));
            }
        };

        send_sms(&self.config.twilio_api_base, &credentials, to_number, &truncate_body(body)).await
    }

    /// Send with already-resolved credentials (the reminder loop resolves
    /// once per reminder and needs the distinction for failure accounting).
    pub async fn send_with_credentials(
        &self,
        credentials: &TwilioCredentials,
        to_number: &str,
        body: &str,
    ) -> SmsSendResult {
        send_sms(&self.config.twilio_api_base, credentials, to_number, &truncate_body(body)).await
    }

    /// Send the booking confirmation SMS for an appointment and mark the
    /// appointment as confirmed-by-SMS on success. Best-effort: the caller
    /// must never roll back a booking because this failed.
    pub async fn send_appointment_confirmation(
        &self,
        practice_id: Uuid,
        appointment_id: Uuid,
    ) -> SmsSendResult {
        let appointment = match self.fetch_appointment(practice_id, appointment_id).await {
            Ok(Some(appointment)) => appointment,
            Ok(None) => {
                error!("send_appointment_confirmation: appointment {} not found", appointment_id);
                return SmsSendResult::failed("Appointment not found");
            }
            Err(e) => return SmsSendResult::failed(e.to_string()),
        };

        let patient = match self.fetch_patient(practice_id, appointment.patient_id).await {
            Ok(Some(patient)) => patient,
            _ => {
                error!("send_appointment_confirmation: patient not found for appointment {}", appointment_id);
                return SmsSendResult::failed("Patient not found for appointment");
            }
        };

        let Some(phone) = patient.phone.clone() else {
            warn!("send_appointment_confirmation: patient {} has no phone number", patient.id);
            return SmsSendResult::failed("Patient has no phone number");
        };

        let practice = match self.fetch_practice(practice_id).await {
            Ok(Some(practice)) => practice,
            _ => return SmsSendResult::failed("Practice not found"),
        };

        let practice_config = match self.fetch_practice_config(practice_id).await {
            Ok(config) => config,
            Err(e) => return SmsSendResult::failed(e.to_string()),
        };

        if !practice_config.as_ref().map(|c| c.sms_confirmation_enabled).unwrap_or(false) {
            info!("send_appointment_confirmation: disabled for practice {}, skipping", practice_id);
            return SmsSendResult::failed("SMS confirmation is disabled for this practice");
        }

        let language = patient.language().to_string();
        let (formatted_date, formatted_time) =
            format_appointment_datetime(appointment.date, appointment.time, &language);

        let template = practice_config
            .as_ref()
            .and_then(|c| c.sms_confirmation_template.as_ref())
            .and_then(|map| map.get(&language).or_else(|| map.get("en")))
            .cloned()
            .unwrap_or_else(|| default_confirmation_template(&language).to_string());

        let body = render_template(&template, &[
            ("doctor", practice.name.as_str()),
            ("date", formatted_date.as_str()),
            ("time", formatted_time.as_str()),
            ("address", practice.address.as_deref().unwrap_or("")),
            ("patient_name", &patient.full_name()),
            ("phone", practice.phone.as_deref().unwrap_or("")),
        ]);

        let result = self.send_custom_sms(practice_id, &phone, &body).await;

        if result.success {
            if let Err(e) = self.mark_confirmation_sent(appointment_id).await {
                warn!("send_appointment_confirmation: failed to flag appointment {}: {}", appointment_id, e);
            }
            info!(
                "SMS confirmation sent for appointment {} (SID: {:?})",
                appointment_id, result.message_sid,
            );
        } else {
            error!(
                "Failed to send SMS for appointment {}: {:?}",
                appointment_id, result.error,
            );
        }

        result
    }

    async fn fetch_appointment(&self, practice_id: Uuid, appointment_id: Uuid) -> Result<Option<Appointment>> {
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

    async fn fetch_patient(&self, practice_id: Uuid, patient_id: Uuid) -> Result<Option<Patient>> {
        let rows: Vec<Patient> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/patients?id=eq.{}&practice_id=eq.{}&limit=1",
                patient_id, practice_id,
            ),
            None,
        ).await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_practice(&self, practice_id: Uuid) -> Result<Option<Practice>> {
        let rows: Vec<Practice> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practices?id=eq.{}&limit=1", practice_id),
            None,
        ).await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_practice_config(&self, practice_id: Uuid) -> Result<Option<PracticeConfig>> {
        let rows: Vec<PracticeConfig> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/practice_configs?practice_id=eq.{}&limit=1", practice_id),
            None,
        ).await?;
        Ok(rows.into_iter().next())
    }

    async fn mark_confirmation_sent(&self, appointment_id: Uuid) -> Result<()> {
        let _: serde_json::Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
            Some(json!({"sms_confirmation_sent": true})),
        ).await?;
        Ok(())
    }
}
