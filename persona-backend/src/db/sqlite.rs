//! SQLite database - schema definitions and connection management
//!
//! This file contains:
//! - Database struct definition
//! - Connection management (new, in-memory, init)
//! - Schema creation and additive migrations
//!
//! All table operations are in the tables/ subdirectory.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Main database wrapper; one connection serialized behind a Mutex
pub struct Database {
    conn: Mutex<Connection>,
}

/// Columns added after the first release: (table, column, definition)
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("users", "email", "TEXT"),
    ("users", "failed_login_attempts", "INTEGER DEFAULT 0"),
    ("users", "locked_until", "TEXT"),
    ("users", "password_changed_at", "TEXT"),
    ("users", "must_change_password", "INTEGER DEFAULT 0"),
    ("users", "last_login_at", "TEXT"),
    ("users", "last_login_ip", "TEXT"),
    ("users", "is_active", "INTEGER DEFAULT 1"),
    ("profiles", "display_name", "TEXT"),
    ("profiles", "introduction", "TEXT"),
    ("profiles", "primary_resume_id", "INTEGER REFERENCES resumes(id)"),
    ("chat_sessions", "user_identifier", "TEXT"),
    ("chat_sessions", "title", "TEXT"),
];

impl Database {
    /// Create a new database connection and initialize schema
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    log::warn!("Could not create database directory {:?}: {}", parent, e);
                }
            }
        }

        Self::from_connection(Connection::open(database_url)?)
    }

    pub fn new_in_memory() -> SqliteResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SqliteResult<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Lock the connection; a panic in another holder does not wedge the database
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialize all database tables and run migrations
    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn();

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                failed_login_attempts INTEGER DEFAULT 0,
                locked_until TEXT,
                password_changed_at TEXT,
                must_change_password INTEGER DEFAULT 0,
                last_login_at TEXT,
                last_login_ip TEXT,
                is_active INTEGER DEFAULT 1
            )",
            [],
        )?;

        // Admin bearer-token sessions
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT UNIQUE NOT NULL,
                ip_address TEXT,
                location TEXT,
                user_agent TEXT,
                user_identifier TEXT,
                title TEXT,
                started_at TEXT NOT NULL,
                last_activity TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chatbot_name TEXT NOT NULL DEFAULT 'AI Assistant',
                personality_prompt TEXT NOT NULL DEFAULT '',
                chatbot_icon TEXT NOT NULL DEFAULT 'default-bot-icon.svg',
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS resumes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                file_path TEXT NOT NULL,
                content TEXT,
                uploaded_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                description TEXT,
                display_name TEXT,
                introduction TEXT,
                is_default INTEGER NOT NULL DEFAULT 0,
                primary_resume_id INTEGER REFERENCES resumes(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Many-to-many: profiles <-> resumes
        conn.execute(
            "CREATE TABLE IF NOT EXISTS profile_resumes (
                profile_id INTEGER NOT NULL,
                resume_id INTEGER NOT NULL,
                PRIMARY KEY (profile_id, resume_id),
                FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE,
                FOREIGN KEY (resume_id) REFERENCES resumes(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Migrations for databases created before these columns existed
        let mut added_user_columns = false;
        for (table, column, definition) in ADDED_COLUMNS {
            if !Self::column_exists(&conn, table, column)? {
                conn.execute(
                    &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition),
                    [],
                )?;
                log::info!("Migrated: added {}.{}", table, column);
                if *table == "users" {
                    added_user_columns = true;
                }
            }
        }

        if added_user_columns {
            conn.execute_batch(
                "UPDATE users SET failed_login_attempts = 0 WHERE failed_login_attempts IS NULL;
                 UPDATE users SET is_active = 1 WHERE is_active IS NULL;
                 UPDATE users SET must_change_password = 0 WHERE must_change_password IS NULL;
                 UPDATE users SET password_changed_at = created_at WHERE password_changed_at IS NULL;",
            )?;
        }

        conn.execute(
            "CREATE INDEX IF NOT EXISTS ix_chat_sessions_user_identifier ON chat_sessions(user_identifier)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_auth_sessions_token ON auth_sessions(token)",
            [],
        )?;

        Ok(())
    }

    fn column_exists(conn: &Connection, table: &str, column: &str) -> SqliteResult<bool> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(names.iter().any(|n| n == column))
    }
}

/// Naive UTC layout written by databases that predate RFC 3339 storage
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse a stored timestamp: RFC 3339, or the legacy `YYYY-MM-DD HH:MM:SS.ffffff` taken as UTC
pub(crate) fn parse_timestamp(value: &str, column: usize) -> SqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|e| {
            NaiveDateTime::parse_from_str(value, LEGACY_TIMESTAMP_FORMAT)
                .map(|naive| naive.and_utc())
                .map_err(|_| e)
        })
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
    column: usize,
) -> SqliteResult<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(&v, column)).transpose()
}
