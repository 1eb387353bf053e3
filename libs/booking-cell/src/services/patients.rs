use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use urlencoding::encode;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::patient::Patient;

use crate::models::{NewPatientFields, PatientSearchQuery};

/// Escape ILIKE wildcard characters in user-supplied input. PostgREST
/// treats `*` as the wildcard, so literal asterisks are dropped.
pub fn esc_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
        .replace('*', "")
}

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_patient(&self, practice_id: Uuid, patient_id: Uuid) -> Result<Option<Patient>> {
        let patients: Vec<Patient> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/patients?id=eq.{}&practice_id=eq.{}&limit=1",
                patient_id, practice_id,
            ),
            None,
        ).await?;

        Ok(patients.into_iter().next())
    }

    /// Search for an existing patient by case-insensitive name + exact DOB.
    /// If found, update any newly provided optional fields. If not, create
    /// a new patient with is_new = true.
    pub async fn find_or_create_patient(
        &self,
        practice_id: Uuid,
        first_name: &str,
        last_name: &str,
        dob: NaiveDate,
        fields: NewPatientFields,
    ) -> Result<Patient> {
        let path = format!(
            "/rest/v1/patients?practice_id=eq.{}&first_name=ilike.{}&last_name=ilike.{}&dob=eq.{}&limit=1",
            practice_id,
            encode(&esc_like(first_name)),
            encode(&esc_like(last_name)),
            dob,
        );
        let existing: Vec<Patient> = self.supabase.request(Method::GET, &path, None).await?;

        if let Some(patient) = existing.into_iter().next() {
            let mut updates = Map::new();
            let updatable: [(&str, &Option<String>, &Option<String>); 8] = [
                ("phone", &fields.phone, &patient.phone),
                ("address", &fields.address, &patient.address),
                ("insurance_carrier", &fields.insurance_carrier, &patient.insurance_carrier),
                ("member_id", &fields.member_id, &patient.member_id),
                ("group_number", &fields.group_number, &patient.group_number),
                ("referring_physician", &fields.referring_physician, &patient.referring_physician),
                ("language_preference", &fields.language_preference, &patient.language_preference),
                ("notes", &fields.notes, &patient.notes),
            ];
            for (column, provided, current) in updatable {
                if let Some(value) = provided {
                    if current.as_deref() != Some(value.as_str()) {
                        updates.insert(column.to_string(), json!(value));
                    }
                }
            }

            if updates.is_empty() {
                return Ok(patient);
            }

            let updated: Vec<Patient> = self.supabase.update_returning(
                &format!("/rest/v1/patients?id=eq.{}", patient.id),
                Value::Object(updates),
            ).await?;

            return updated.into_iter().next()
                .ok_or_else(|| anyhow!("Patient update returned no rows"));
        }

        let row = json!({
            "practice_id": practice_id,
            "first_name": first_name,
            "last_name": last_name,
            "dob": dob,
            "phone": fields.phone,
            "address": fields.address,
            "insurance_carrier": fields.insurance_carrier,
            "member_id": fields.member_id,
            "group_number": fields.group_number,
            "referring_physician": fields.referring_physician,
            "is_new": true,
            "opted_out_recall": false,
            "language_preference": fields.language_preference.unwrap_or_else(|| "en".to_string()),
            "notes": fields.notes,
        });

        let patient: Patient = self.supabase.insert_returning("patients", row).await?;
        info!("Created new patient {} for practice {}", patient.id, practice_id);
        Ok(patient)
    }

    /// Search patients by any combination of fields (at least one required).
    /// Name and phone fields match partially, case-insensitively. Limited
    /// to 20 results.
    pub async fn search_patients(
        &self,
        practice_id: Uuid,
        query: PatientSearchQuery,
    ) -> Result<Vec<Patient>> {
        if query.first_name.is_none()
            && query.last_name.is_none()
            && query.dob.is_none()
            && query.phone.is_none()
        {
            return Err(anyhow!("At least one search parameter is required"));
        }

        let mut path = format!("/rest/v1/patients?practice_id=eq.{}", practice_id);

        if let Some(first_name) = &query.first_name {
            path.push_str(&format!(
                "&first_name=ilike.{}",
                encode(&format!("*{}*", esc_like(first_name))),
            ));
        }
        if let Some(last_name) = &query.last_name {
            path.push_str(&format!(
                "&last_name=ilike.{}",
                encode(&format!("*{}*", esc_like(last_name))),
            ));
        }
        if let Some(dob) = &query.dob {
            path.push_str(&format!("&dob=eq.{}", dob));
        }
        if let Some(phone) = &query.phone {
            path.push_str(&format!(
                "&phone=ilike.{}",
                encode(&format!("*{}*", esc_like(phone))),
            ));
        }
        path.push_str("&limit=20");

        debug!("search_patients: practice={}", practice_id);
        let patients: Vec<Patient> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(patients)
    }

    /// First booking flips the new-patient flag.
    pub async fn clear_is_new(&self, patient_id: Uuid) -> Result<()> {
        let _: Value = self.supabase.request(
            Method::PATCH,
            &format!("/rest/v1/patients?id=eq.{}&is_new=eq.true", patient_id),
            Some(json!({"is_new": false})),
        ).await?;
        Ok(())
    }
}
