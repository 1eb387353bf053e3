use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use shared_config::AppConfig;

use crate::models::EligibilityResult;

const ELIGIBILITY_TIMEOUT: Duration = Duration::from_secs(15);

/// Thin client for the external 270/271 eligibility API. The wire format
/// belongs to the provider; this only shapes the request and pulls the
/// handful of fields the assistant can speak aloud.
pub struct EligibilityClient {
    http: Client,
    api_base: String,
}

impl EligibilityClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(ELIGIBILITY_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: config.eligibility_api_base.clone(),
        }
    }

    pub async fn check_eligibility(
        &self,
        api_key: &str,
        carrier_name: &str,
        member_id: &str,
        first_name: &str,
        last_name: &str,
        dob: Option<chrono::NaiveDate>,
    ) -> Result<EligibilityResult> {
        let response = self.http
            .post(format!("{}/change/medicalnetwork/eligibility/v3", self.api_base))
            .bearer_auth(api_key)
            .json(&json!({
                "tradingPartnerName": carrier_name,
                "subscriber": {
                    "memberId": member_id,
                    "firstName": first_name,
                    "lastName": last_name,
                    "dateOfBirth": dob.map(|d| d.to_string()),
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("eligibility: provider returned {}", status);
            return Ok(EligibilityResult {
                error: Some(format!("Eligibility provider returned {}", status)),
                ..Default::default()
            });
        }

        let data: serde_json::Value = response.json().await?;

        Ok(EligibilityResult {
            is_active: data.get("is_active").and_then(|v| v.as_bool()).unwrap_or(false),
            carrier: data.get("carrier").and_then(|v| v.as_str()).map(String::from),
            plan_name: data.get("plan_name").and_then(|v| v.as_str()).map(String::from),
            copay: data.get("copay").and_then(|v| v.as_f64()),
            error: None,
        })
    }
}
