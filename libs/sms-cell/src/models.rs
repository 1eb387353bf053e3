use serde::{Deserialize, Serialize};

/// Outcome of one SMS delivery attempt chain.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmsSendResult {
    pub success: bool,
    pub message_sid: Option<String>,
    pub error: Option<String>,
    /// A provider rejection that retrying cannot fix (4xx other than 429).
    pub permanent: bool,
}

impl SmsSendResult {
    pub fn sent(message_sid: String) -> Self {
        Self { success: true, message_sid: Some(message_sid), error: None, permanent: false }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, message_sid: None, error: Some(error.into()), permanent: false }
    }

    pub fn failed_permanently(error: impl Into<String>) -> Self {
        Self { success: false, message_sid: None, error: Some(error.into()), permanent: true }
    }
}

/// Resolved provider credentials for one practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}
