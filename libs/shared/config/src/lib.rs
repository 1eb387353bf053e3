use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub app_env: String,
    pub vapi_webhook_secret: String,
    pub vapi_api_key: String,
    pub openai_api_key: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,
    pub twilio_api_base: String,
    pub openai_api_base: String,
    pub vapi_api_base: String,
    pub eligibility_api_base: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            app_env: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string()),
            vapi_webhook_secret: env::var("VAPI_WEBHOOK_SECRET")
                .unwrap_or_default(),
            vapi_api_key: env::var("VAPI_API_KEY")
                .unwrap_or_default(),
            openai_api_key: env::var("OPENAI_API_KEY")
                .unwrap_or_default(),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID")
                .unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN")
                .unwrap_or_default(),
            twilio_from_number: env::var("TWILIO_FROM_NUMBER")
                .unwrap_or_default(),
            twilio_api_base: env::var("TWILIO_API_BASE")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            openai_api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            vapi_api_base: env::var("VAPI_API_BASE")
                .unwrap_or_else(|_| "https://api.vapi.ai".to_string()),
            eligibility_api_base: env::var("ELIGIBILITY_API_BASE")
                .unwrap_or_else(|_| "https://healthcare.us.stedi.com".to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_key.is_empty()
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    pub fn is_sms_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_from_number.is_empty()
    }
}
