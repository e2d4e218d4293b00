//! Visitor chat session and message database operations

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::{parse_timestamp, Database};
use crate::models::{ChatMessage, ChatSession, MessageRole, NewChatSession};

const SESSION_COLUMNS: &str = "id, session_id, ip_address, location, user_agent, user_identifier, title,
     started_at, last_activity, message_count";

impl Database {
    /// Look up a chat session by its public session id
    pub fn get_chat_session_by_key(&self, session_id: &str) -> SqliteResult<Option<ChatSession>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM chat_sessions WHERE session_id = ?1", SESSION_COLUMNS),
            [session_id],
            Self::row_to_chat_session,
        )
        .optional()
    }

    pub fn get_chat_session(&self, id: i64) -> SqliteResult<Option<ChatSession>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM chat_sessions WHERE id = ?1", SESSION_COLUMNS),
            [id],
            Self::row_to_chat_session,
        )
        .optional()
    }

    /// Create a chat session, or return the existing one with the same key
    pub fn create_chat_session(&self, new: &NewChatSession) -> SqliteResult<ChatSession> {
        if let Some(existing) = self.get_chat_session_by_key(&new.session_id)? {
            return Ok(existing);
        }

        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chat_sessions (session_id, ip_address, location, user_agent, user_identifier,
             started_at, last_activity, message_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 0)",
            rusqlite::params![
                &new.session_id,
                &new.ip_address,
                &new.location,
                &new.user_agent,
                &new.user_identifier,
                &now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_chat_session(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Store a message, bump the session's activity and message count
    pub fn add_chat_message(
        &self,
        session_id: i64,
        role: MessageRole,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> SqliteResult<ChatMessage> {
        let conn = self.conn();
        let ts = timestamp.to_rfc3339();

        conn.execute(
            "INSERT INTO chat_messages (session_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![session_id, role.as_ref(), content, &ts],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "UPDATE chat_sessions SET message_count = message_count + 1, last_activity = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), session_id],
        )?;

        Ok(ChatMessage {
            id,
            session_id,
            role,
            content: content.to_string(),
            timestamp,
        })
    }

    /// Every message of a session, oldest first
    pub fn get_chat_messages(&self, session_id: i64) -> SqliteResult<Vec<ChatMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, timestamp FROM chat_messages
             WHERE session_id = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let messages = stmt
            .query_map([session_id], Self::row_to_chat_message)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(messages)
    }

    /// The newest `limit` messages with an id up to `through_id`, in chronological order
    pub fn get_recent_chat_messages(
        &self,
        session_id: i64,
        through_id: i64,
        limit: usize,
    ) -> SqliteResult<Vec<ChatMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, timestamp FROM chat_messages
             WHERE session_id = ?1 AND id <= ?2 ORDER BY id DESC LIMIT ?3",
        )?;
        let mut messages = stmt
            .query_map(
                rusqlite::params![session_id, through_id, limit as i64],
                Self::row_to_chat_message,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Set the title unless one is already present
    pub fn set_chat_session_title_if_missing(&self, id: i64, title: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE chat_sessions SET title = ?1 WHERE id = ?2 AND (title IS NULL OR title = '')",
            rusqlite::params![title, id],
        )?;
        Ok(rows > 0)
    }

    /// Sessions of one visitor, most recently active first
    pub fn list_chat_sessions_for_identifier(
        &self,
        user_identifier: &str,
        limit: usize,
    ) -> SqliteResult<Vec<ChatSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chat_sessions WHERE user_identifier = ?1
             ORDER BY last_activity DESC, id DESC LIMIT ?2",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map(
                rusqlite::params![user_identifier, limit as i64],
                Self::row_to_chat_session,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Sessions by start time, newest first; `None` means all of them
    pub fn list_chat_sessions(&self, limit: Option<usize>) -> SqliteResult<Vec<ChatSession>> {
        let conn = self.conn();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chat_sessions ORDER BY started_at DESC, id DESC LIMIT ?1",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map([limit], Self::row_to_chat_session)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(sessions)
    }

    pub fn count_chat_sessions(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM chat_sessions", [], |row| row.get(0))
    }

    pub fn count_chat_messages(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))
    }

    /// Delete a session and its messages
    pub fn delete_chat_session(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn();
        conn.execute("DELETE FROM chat_messages WHERE session_id = ?1", [id])?;
        let rows = conn.execute("DELETE FROM chat_sessions WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    fn row_to_chat_session(row: &rusqlite::Row) -> rusqlite::Result<ChatSession> {
        let started_at: String = row.get(7)?;
        let last_activity: String = row.get(8)?;
        Ok(ChatSession {
            id: row.get(0)?,
            session_id: row.get(1)?,
            ip_address: row.get(2)?,
            location: row.get(3)?,
            user_agent: row.get(4)?,
            user_identifier: row.get(5)?,
            title: row.get(6)?,
            started_at: parse_timestamp(&started_at, 7)?,
            last_activity: parse_timestamp(&last_activity, 8)?,
            message_count: row.get(9)?,
        })
    }

    fn row_to_chat_message(row: &rusqlite::Row) -> rusqlite::Result<ChatMessage> {
        let role: String = row.get(2)?;
        let timestamp: String = row.get(4)?;
        Ok(ChatMessage {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: role.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
            })?,
            content: row.get(3)?,
            timestamp: parse_timestamp(&timestamp, 4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::{MessageRole, NewChatSession};
    use chrono::Utc;

    fn new_session(key: &str, identifier: Option<&str>) -> NewChatSession {
        NewChatSession {
            session_id: key.to_string(),
            ip_address: Some("127.0.0.1".to_string()),
            location: Some("Local Development".to_string()),
            user_identifier: identifier.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_is_idempotent_per_key() {
        let db = Database::new_in_memory().unwrap();
        let a = db.create_chat_session(&new_session("abc", None)).unwrap();
        let b = db.create_chat_session(&new_session("abc", None)).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(db.count_chat_sessions().unwrap(), 1);
    }

    #[test]
    fn test_messages_update_count_and_history() {
        let db = Database::new_in_memory().unwrap();
        let session = db.create_chat_session(&new_session("abc", None)).unwrap();

        let mut last_id = 0;
        for i in 0..12 {
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            last_id = db
                .add_chat_message(session.id, role, &format!("msg {}", i), Utc::now())
                .unwrap()
                .id;
        }

        let reloaded = db.get_chat_session(session.id).unwrap().unwrap();
        assert_eq!(reloaded.message_count, 12);

        let recent = db.get_recent_chat_messages(session.id, last_id, 10).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "msg 2");
        assert_eq!(recent[9].content, "msg 11");
        assert_eq!(db.get_chat_messages(session.id).unwrap().len(), 12);
    }

    #[test]
    fn test_title_only_set_once() {
        let db = Database::new_in_memory().unwrap();
        let session = db.create_chat_session(&new_session("abc", None)).unwrap();
        assert!(db.set_chat_session_title_if_missing(session.id, "First").unwrap());
        assert!(!db.set_chat_session_title_if_missing(session.id, "Second").unwrap());
        let reloaded = db.get_chat_session(session.id).unwrap().unwrap();
        assert_eq!(reloaded.title.as_deref(), Some("First"));
    }

    #[test]
    fn test_list_by_identifier() {
        let db = Database::new_in_memory().unwrap();
        db.create_chat_session(&new_session("a", Some("visitor-1"))).unwrap();
        db.create_chat_session(&new_session("b", Some("visitor-1"))).unwrap();
        db.create_chat_session(&new_session("c", Some("visitor-2"))).unwrap();

        let sessions = db.list_chat_sessions_for_identifier("visitor-1", 50).unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(db.list_chat_sessions_for_identifier("nobody", 50).unwrap().is_empty());
        assert_eq!(db.list_chat_sessions(Some(2)).unwrap().len(), 2);
        assert_eq!(db.list_chat_sessions(None).unwrap().len(), 3);
    }

    #[test]
    fn test_delete_removes_messages() {
        let db = Database::new_in_memory().unwrap();
        let session = db.create_chat_session(&new_session("abc", None)).unwrap();
        db.add_chat_message(session.id, MessageRole::User, "hi", Utc::now()).unwrap();

        assert!(db.delete_chat_session(session.id).unwrap());
        assert_eq!(db.count_chat_messages().unwrap(), 0);
        assert!(db.get_chat_session_by_key("abc").unwrap().is_none());
    }
}
