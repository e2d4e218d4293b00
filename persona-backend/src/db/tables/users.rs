//! Admin user database operations

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::{parse_optional_timestamp, parse_timestamp, Database};
use crate::models::{User, LOCKOUT_MINUTES, MAX_FAILED_LOGINS};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, failed_login_attempts,
     locked_until, password_changed_at, must_change_password, last_login_at, last_login_ip, is_active";

impl Database {
    pub fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        must_change_password: bool,
    ) -> SqliteResult<User> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at, failed_login_attempts,
             password_changed_at, must_change_password, is_active)
             VALUES (?1, ?2, ?3, ?4, 0, ?4, ?5, 1)",
            rusqlite::params![username, email, password_hash, &now, must_change_password],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_user(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_user(&self, id: i64) -> SqliteResult<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [id],
            Self::row_to_user,
        )
        .optional()
    }

    pub fn get_user_by_username(&self, username: &str) -> SqliteResult<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            [username],
            Self::row_to_user,
        )
        .optional()
    }

    /// Whether another user (not `exclude_id`) already uses this email
    pub fn email_in_use(&self, email: &str, exclude_id: Option<i64>) -> SqliteResult<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1 AND id != ?2",
            rusqlite::params![email, exclude_id.unwrap_or(-1)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All users, newest first
    pub fn list_users(&self) -> SqliteResult<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(users)
    }

    /// Persist every mutable field of a user
    pub fn save_user(&self, user: &User) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET username = ?1, email = ?2, password_hash = ?3, failed_login_attempts = ?4,
             locked_until = ?5, password_changed_at = ?6, must_change_password = ?7, last_login_at = ?8,
             last_login_ip = ?9, is_active = ?10 WHERE id = ?11",
            rusqlite::params![
                &user.username,
                &user.email,
                &user.password_hash,
                user.failed_login_attempts,
                user.locked_until.map(|t| t.to_rfc3339()),
                user.password_changed_at.map(|t| t.to_rfc3339()),
                user.must_change_password,
                user.last_login_at.map(|t| t.to_rfc3339()),
                &user.last_login_ip,
                user.is_active,
                user.id,
            ],
        )?;
        Ok(())
    }

    /// Count a wrong password in one statement, locking the account when the
    /// count reaches the limit. Returns the counters as written.
    pub fn record_failed_login(&self, id: i64, now: DateTime<Utc>) -> SqliteResult<(i32, Option<DateTime<Utc>>)> {
        let lock_until = (now + Duration::minutes(LOCKOUT_MINUTES)).to_rfc3339();
        let conn = self.conn();
        let (attempts, locked_until): (i32, Option<String>) = conn.query_row(
            "UPDATE users SET
                 failed_login_attempts = COALESCE(failed_login_attempts, 0) + 1,
                 locked_until = CASE WHEN COALESCE(failed_login_attempts, 0) + 1 >= ?2
                                     THEN ?3 ELSE locked_until END
             WHERE id = ?1
             RETURNING failed_login_attempts, locked_until",
            rusqlite::params![id, MAX_FAILED_LOGINS, lock_until],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((attempts, parse_optional_timestamp(locked_until, 1)?))
    }

    /// Clear the failure counters and stamp the login without touching other fields
    pub fn record_successful_login(&self, id: i64, now: DateTime<Utc>, ip: &str) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL,
             last_login_at = ?2, last_login_ip = ?3 WHERE id = ?1",
            rusqlite::params![id, now.to_rfc3339(), ip],
        )?;
        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at: String = row.get(4)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: parse_timestamp(&created_at, 4)?,
            failed_login_attempts: row.get::<_, Option<i32>>(5)?.unwrap_or(0),
            locked_until: parse_optional_timestamp(row.get(6)?, 6)?,
            password_changed_at: parse_optional_timestamp(row.get(7)?, 7)?,
            must_change_password: row.get::<_, Option<bool>>(8)?.unwrap_or(false),
            last_login_at: parse_optional_timestamp(row.get(9)?, 9)?,
            last_login_ip: row.get(10)?,
            is_active: row.get::<_, Option<bool>>(11)?.unwrap_or(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use chrono::{Duration, Utc};

    #[test]
    fn test_create_and_lookup() {
        let db = Database::new_in_memory().unwrap();
        let user = db.create_user("alice", Some("alice@example.com"), "hash", true).unwrap();
        assert!(user.is_active);
        assert!(user.must_change_password);
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.password_changed_at.is_some());

        let found = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn test_unique_username() {
        let db = Database::new_in_memory().unwrap();
        db.create_user("alice", None, "hash", false).unwrap();
        assert!(db.create_user("alice", None, "hash", false).is_err());
    }

    #[test]
    fn test_email_in_use() {
        let db = Database::new_in_memory().unwrap();
        let alice = db.create_user("alice", Some("a@example.com"), "hash", false).unwrap();
        assert!(db.email_in_use("a@example.com", None).unwrap());
        assert!(!db.email_in_use("a@example.com", Some(alice.id)).unwrap());
        assert!(!db.email_in_use("b@example.com", None).unwrap());
    }

    #[test]
    fn test_save_user_persists_security_fields() {
        let db = Database::new_in_memory().unwrap();
        let mut user = db.create_user("alice", None, "hash", false).unwrap();
        let now = Utc::now();
        user.lock(now, 30);
        user.failed_login_attempts = 5;
        user.is_active = false;
        db.save_user(&user).unwrap();

        let reloaded = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(reloaded.failed_login_attempts, 5);
        assert!(reloaded.is_locked(now));
        assert!(!reloaded.is_active);
    }

    #[test]
    fn test_failed_logins_count_in_place_and_lock() {
        let db = Database::new_in_memory().unwrap();
        let user = db.create_user("alice", None, "hash", false).unwrap();
        let now = Utc::now();

        for expected in 1..5 {
            let (attempts, locked_until) = db.record_failed_login(user.id, now).unwrap();
            assert_eq!(attempts, expected);
            assert!(locked_until.is_none());
        }

        let (attempts, locked_until) = db.record_failed_login(user.id, now).unwrap();
        assert_eq!(attempts, 5);
        let until = locked_until.unwrap();
        assert!(until > now + Duration::minutes(29));

        let reloaded = db.get_user(user.id).unwrap().unwrap();
        assert!(reloaded.is_locked(now));
        assert_eq!(reloaded.remaining_attempts(), 0);

        db.record_successful_login(user.id, now, "10.0.0.1").unwrap();
        let reloaded = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(reloaded.failed_login_attempts, 0);
        assert!(!reloaded.is_locked(now));
        assert_eq!(reloaded.last_login_ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_failed_login_keeps_concurrent_admin_edit() {
        let db = Database::new_in_memory().unwrap();
        let user = db.create_user("alice", None, "hash", false).unwrap();

        let mut edited = user.clone();
        edited.email = Some("alice@example.com".to_string());
        db.save_user(&edited).unwrap();

        db.record_failed_login(user.id, Utc::now()).unwrap();
        let reloaded = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(reloaded.email.as_deref(), Some("alice@example.com"));
        assert_eq!(reloaded.failed_login_attempts, 1);
    }

    #[test]
    fn test_list_users() {
        let db = Database::new_in_memory().unwrap();
        db.create_user("first", None, "hash", false).unwrap();
        db.create_user("second", None, "hash", false).unwrap();
        let users = db.list_users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "second");
    }
}
