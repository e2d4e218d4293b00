use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHATBOT_NAME: &str = "AI Assistant";
pub const DEFAULT_CHATBOT_ICON: &str = "default-bot-icon.svg";

/// Persona settings stored in database (single row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSettings {
    pub id: i64,
    pub chatbot_name: String,
    /// Replaces the default conversational persona when non-empty
    pub personality_prompt: String,
    /// File name of a bundled icon or an `/uploads/icons/...` path
    pub chatbot_icon: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            id: 0,
            chatbot_name: DEFAULT_CHATBOT_NAME.to_string(),
            personality_prompt: String::new(),
            chatbot_icon: DEFAULT_CHATBOT_ICON.to_string(),
            updated_at: Utc::now(),
        }
    }
}
