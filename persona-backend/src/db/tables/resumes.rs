//! Resume artifact database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::{parse_timestamp, Database};
use crate::models::Resume;

const RESUME_COLUMNS: &str =
    "r.id, r.filename, r.original_filename, r.file_path, r.content, r.uploaded_at, r.is_active";

impl Database {
    pub fn create_resume(
        &self,
        filename: &str,
        original_filename: &str,
        file_path: &str,
        content: Option<&str>,
    ) -> SqliteResult<Resume> {
        let conn = self.conn();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO resumes (filename, original_filename, file_path, content, uploaded_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            rusqlite::params![filename, original_filename, file_path, content, now.to_rfc3339()],
        )?;

        Ok(Resume {
            id: conn.last_insert_rowid(),
            filename: filename.to_string(),
            original_filename: original_filename.to_string(),
            file_path: file_path.to_string(),
            content: content.map(String::from),
            uploaded_at: now,
            is_active: true,
        })
    }

    pub fn get_resume(&self, id: i64) -> SqliteResult<Option<Resume>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM resumes r WHERE r.id = ?1", RESUME_COLUMNS),
            [id],
            Self::row_to_resume,
        )
        .optional()
    }

    /// Every artifact (including soft-deleted ones), newest first
    pub fn list_resumes(&self) -> SqliteResult<Vec<Resume>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM resumes r ORDER BY r.uploaded_at DESC, r.id DESC",
            RESUME_COLUMNS
        ))?;
        let resumes = stmt
            .query_map([], Self::row_to_resume)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(resumes)
    }

    /// Active resumes assigned to a profile, newest first
    pub fn get_active_resumes(&self, profile_id: i64) -> SqliteResult<Vec<Resume>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM resumes r
             JOIN profile_resumes pr ON pr.resume_id = r.id
             WHERE pr.profile_id = ?1 AND r.is_active = 1
             ORDER BY r.uploaded_at DESC, r.id DESC",
            RESUME_COLUMNS
        ))?;
        let resumes = stmt
            .query_map([profile_id], Self::row_to_resume)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(resumes)
    }

    /// Replace the extracted text, and the display name when given
    pub fn update_resume_content(
        &self,
        id: i64,
        content: &str,
        original_filename: Option<&str>,
    ) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE resumes SET content = ?1, original_filename = COALESCE(?2, original_filename)
             WHERE id = ?3",
            rusqlite::params![content, original_filename, id],
        )?;
        Ok(rows > 0)
    }

    /// Replace the profiles a resume is assigned to; unknown profile ids are skipped
    pub fn set_resume_profiles(&self, resume_id: i64, profile_ids: &[i64]) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM profile_resumes WHERE resume_id = ?1", [resume_id])?;
        let mut assigned = 0;
        for profile_id in profile_ids {
            assigned += conn.execute(
                "INSERT OR IGNORE INTO profile_resumes (profile_id, resume_id)
                 SELECT id, ?2 FROM profiles WHERE id = ?1",
                rusqlite::params![profile_id, resume_id],
            )?;
        }
        Ok(assigned)
    }

    pub fn get_resume_profile_ids(&self, resume_id: i64) -> SqliteResult<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT profile_id FROM profile_resumes WHERE resume_id = ?1 ORDER BY profile_id",
        )?;
        let ids = stmt
            .query_map([resume_id], |row| row.get(0))?
            .collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Soft delete: the row and file stay, the persona stops using it
    pub fn deactivate_resume(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows = conn.execute("UPDATE resumes SET is_active = 0 WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    fn row_to_resume(row: &rusqlite::Row) -> rusqlite::Result<Resume> {
        let uploaded_at: String = row.get(5)?;
        Ok(Resume {
            id: row.get(0)?,
            filename: row.get(1)?,
            original_filename: row.get(2)?,
            file_path: row.get(3)?,
            content: row.get(4)?,
            uploaded_at: parse_timestamp(&uploaded_at, 5)?,
            is_active: row.get(6)?,
        })
    }
}
