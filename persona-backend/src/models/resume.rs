use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uploaded resume artifact and its extracted text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    pub id: i64,
    /// Unique name on disk
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub content: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Resume {
    pub fn is_text(&self) -> bool {
        self.original_filename.to_lowercase().ends_with(".txt")
    }
}
