use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named group of resume artifacts the persona can speak from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub introduction: Option<String>,
    pub is_default: bool,
    /// Offered as the download when a visitor asks for the resume
    pub primary_resume_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/update body for profiles
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub introduction: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub primary_resume_id: Option<i64>,
}
