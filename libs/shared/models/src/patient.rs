use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Patient identity is (practice, lower(first_name), lower(last_name), dob).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub language_preference: Option<String>,
    pub insurance_carrier: Option<String>,
    pub member_id: Option<String>,
    pub group_number: Option<String>,
    pub referring_physician: Option<String>,
    pub is_new: bool,
    #[serde(default)]
    pub opted_out_recall: bool,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn language(&self) -> &str {
        self.language_preference.as_deref().unwrap_or("en")
    }
}
