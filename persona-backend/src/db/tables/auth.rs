//! Admin auth session database operations

use chrono::{Duration, Utc};
use rand::RngCore;
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::{parse_timestamp, Database};
use crate::models::Session;

impl Database {
    fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Create a session for a user, valid for `lifetime_secs`
    pub fn create_session(&self, user_id: i64, lifetime_secs: i64) -> SqliteResult<Session> {
        let conn = self.conn();
        let token = Self::generate_token();
        let created_at = Utc::now();
        let expires_at = created_at + Duration::seconds(lifetime_secs);

        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![&token, user_id, created_at.to_rfc3339(), expires_at.to_rfc3339()],
        )?;

        Ok(Session {
            id: conn.last_insert_rowid(),
            token,
            user_id,
            created_at,
            expires_at,
        })
    }

    /// Return the session if the token exists and has not expired
    pub fn validate_session(&self, token: &str) -> SqliteResult<Option<Session>> {
        let conn = self.conn();

        let session = conn
            .query_row(
                "SELECT id, token, user_id, created_at, expires_at FROM auth_sessions WHERE token = ?1",
                [token],
                |row| {
                    let created_at: String = row.get(3)?;
                    let expires_at: String = row.get(4)?;
                    Ok(Session {
                        id: row.get(0)?,
                        token: row.get(1)?,
                        user_id: row.get(2)?,
                        created_at: parse_timestamp(&created_at, 3)?,
                        expires_at: parse_timestamp(&expires_at, 4)?,
                    })
                },
            )
            .optional()?;

        match session {
            Some(s) if s.expires_at > Utc::now() => Ok(Some(s)),
            Some(s) => {
                conn.execute("DELETE FROM auth_sessions WHERE id = ?1", [s.id])?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn delete_session(&self, token: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM auth_sessions WHERE token = ?1", [token])?;
        Ok(rows > 0)
    }

    /// Revoke every session of a user (deactivation)
    pub fn delete_sessions_for_user(&self, user_id: i64) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM auth_sessions WHERE user_id = ?1", [user_id])
    }

    pub fn delete_expired_sessions(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM auth_sessions WHERE expires_at <= ?1",
            [Utc::now().to_rfc3339()],
        )
    }
}
