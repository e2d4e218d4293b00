//! Persona settings (singleton row)

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::{parse_timestamp, Database};
use crate::models::{PersonaSettings, DEFAULT_CHATBOT_ICON, DEFAULT_CHATBOT_NAME};

impl Database {
    /// Get the settings row, creating it with defaults on first use
    pub fn get_settings(&self) -> SqliteResult<PersonaSettings> {
        let conn = self.conn();

        let existing = conn
            .query_row(
                "SELECT id, chatbot_name, personality_prompt, chatbot_icon, updated_at
                 FROM settings ORDER BY id LIMIT 1",
                [],
                |row| {
                    let updated_at: String = row.get(4)?;
                    Ok(PersonaSettings {
                        id: row.get(0)?,
                        chatbot_name: row.get(1)?,
                        personality_prompt: row.get(2)?,
                        chatbot_icon: row.get(3)?,
                        updated_at: parse_timestamp(&updated_at, 4)?,
                    })
                },
            )
            .optional()?;

        if let Some(settings) = existing {
            return Ok(settings);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO settings (chatbot_name, personality_prompt, chatbot_icon, updated_at)
             VALUES (?1, '', ?2, ?3)",
            rusqlite::params![DEFAULT_CHATBOT_NAME, DEFAULT_CHATBOT_ICON, now.to_rfc3339()],
        )?;

        Ok(PersonaSettings {
            id: conn.last_insert_rowid(),
            updated_at: now,
            ..Default::default()
        })
    }

    /// Update the persona; `chatbot_icon` is only replaced when provided
    pub fn update_settings(
        &self,
        chatbot_name: &str,
        personality_prompt: &str,
        chatbot_icon: Option<&str>,
    ) -> SqliteResult<PersonaSettings> {
        let current = self.get_settings()?;
        let icon = chatbot_icon.unwrap_or(&current.chatbot_icon).to_string();
        let now = Utc::now();

        let conn = self.conn();
        conn.execute(
            "UPDATE settings SET chatbot_name = ?1, personality_prompt = ?2, chatbot_icon = ?3, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![chatbot_name, personality_prompt, &icon, now.to_rfc3339(), current.id],
        )?;

        Ok(PersonaSettings {
            id: current.id,
            chatbot_name: chatbot_name.to_string(),
            personality_prompt: personality_prompt.to_string(),
            chatbot_icon: icon,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[test]
    fn test_settings_created_on_first_read() {
        let db = Database::new_in_memory().unwrap();
        let first = db.get_settings().unwrap();
        assert_eq!(first.chatbot_name, "AI Assistant");
        assert_eq!(first.chatbot_icon, "default-bot-icon.svg");
        assert!(first.personality_prompt.is_empty());

        let second = db.get_settings().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_update_keeps_icon_when_absent() {
        let db = Database::new_in_memory().unwrap();
        db.update_settings("Jane", "Be kind", Some("/uploads/icons/x.png")).unwrap();
        let updated = db.update_settings("Jane Doe", "Be brief", None).unwrap();
        assert_eq!(updated.chatbot_icon, "/uploads/icons/x.png");

        let stored = db.get_settings().unwrap();
        assert_eq!(stored.chatbot_name, "Jane Doe");
        assert_eq!(stored.personality_prompt, "Be brief");
    }
}
