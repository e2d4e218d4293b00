//! Profile database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::{parse_timestamp, Database};
use crate::models::{Profile, ProfileRequest};

pub const DEFAULT_PROFILE_NAME: &str = "Default Profile";
const DEFAULT_PROFILE_DESCRIPTION: &str = "Default resume profile";

const PROFILE_COLUMNS: &str = "id, name, description, display_name, introduction, is_default,
     primary_resume_id, created_at, updated_at";

/// Outcome of a profile update
#[derive(Debug)]
pub enum ProfileUpdate {
    Updated(Profile),
    /// Saved, but the request to unset the only default was ignored
    KeptDefault(Profile),
}

impl Database {
    /// All profiles, newest first
    pub fn list_profiles(&self) -> SqliteResult<Vec<Profile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles ORDER BY created_at DESC, id DESC",
            PROFILE_COLUMNS
        ))?;
        let profiles = stmt
            .query_map([], Self::row_to_profile)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(profiles)
    }

    pub fn get_profile(&self, id: i64) -> SqliteResult<Option<Profile>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
            [id],
            Self::row_to_profile,
        )
        .optional()
    }

    /// The default profile; created when none is flagged default
    pub fn get_or_create_default_profile(&self) -> SqliteResult<Profile> {
        let existing = {
            let conn = self.conn();
            conn.query_row(
                &format!(
                    "SELECT {} FROM profiles WHERE is_default = 1 ORDER BY id LIMIT 1",
                    PROFILE_COLUMNS
                ),
                [],
                Self::row_to_profile,
            )
            .optional()?
        };

        match existing {
            Some(profile) => Ok(profile),
            None => {
                log::info!("No default profile found, creating '{}'", DEFAULT_PROFILE_NAME);
                self.create_profile(DEFAULT_PROFILE_NAME, Some(DEFAULT_PROFILE_DESCRIPTION), true)
            }
        }
    }

    /// Create a profile; a new default clears every other default
    pub fn create_profile(
        &self,
        name: &str,
        description: Option<&str>,
        is_default: bool,
    ) -> SqliteResult<Profile> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        if is_default {
            conn.execute("UPDATE profiles SET is_default = 0 WHERE is_default = 1", [])?;
        }

        conn.execute(
            "INSERT INTO profiles (name, description, is_default, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![name, description, is_default, &now],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_profile(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Replace a profile's editable fields; a missing name keeps the current one.
    ///
    /// Setting `is_default` clears the flag on all other profiles. Clearing it on
    /// the current default is refused and reported as [`ProfileUpdate::KeptDefault`].
    pub fn update_profile(
        &self,
        id: i64,
        request: &ProfileRequest,
    ) -> SqliteResult<Option<ProfileUpdate>> {
        let Some(current) = self.get_profile(id)? else {
            return Ok(None);
        };

        let is_default = request.is_default;
        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(current.name.as_str());
        let kept_default = current.is_default && !is_default;
        let conn = self.conn();

        if is_default && !current.is_default {
            conn.execute("UPDATE profiles SET is_default = 0 WHERE is_default = 1", [])?;
        }

        conn.execute(
            "UPDATE profiles SET name = ?1, description = ?2, display_name = ?3, introduction = ?4,
             is_default = ?5, primary_resume_id = ?6, updated_at = ?7 WHERE id = ?8",
            rusqlite::params![
                name,
                &request.description,
                &request.display_name,
                &request.introduction,
                is_default || current.is_default,
                request.primary_resume_id,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        drop(conn);

        let profile = self.get_profile(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok(Some(if kept_default {
            ProfileUpdate::KeptDefault(profile)
        } else {
            ProfileUpdate::Updated(profile)
        }))
    }

    /// Delete a non-default profile. Returns false when it is the default.
    pub fn delete_profile(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn();
        conn.execute("DELETE FROM profile_resumes WHERE profile_id = ?1", [id])?;
        let rows = conn.execute("DELETE FROM profiles WHERE id = ?1 AND is_default = 0", [id])?;
        Ok(rows > 0)
    }

    /// Replace the set of resumes assigned to a profile; unknown ids are skipped
    pub fn set_profile_resumes(&self, profile_id: i64, resume_ids: &[i64]) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM profile_resumes WHERE profile_id = ?1", [profile_id])?;
        for resume_id in resume_ids {
            conn.execute(
                "INSERT OR IGNORE INTO profile_resumes (profile_id, resume_id)
                 SELECT ?1, id FROM resumes WHERE id = ?2",
                rusqlite::params![profile_id, resume_id],
            )?;
        }
        Ok(())
    }

    pub fn get_profile_resume_ids(&self, profile_id: i64) -> SqliteResult<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT resume_id FROM profile_resumes WHERE profile_id = ?1 ORDER BY resume_id",
        )?;
        let ids = stmt
            .query_map([profile_id], |row| row.get(0))?
            .collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;
        Ok(Profile {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            display_name: row.get(3)?,
            introduction: row.get(4)?,
            is_default: row.get(5)?,
            primary_resume_id: row.get(6)?,
            created_at: parse_timestamp(&created_at, 7)?,
            updated_at: parse_timestamp(&updated_at, 8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_created_once() {
        let db = Database::new_in_memory().unwrap();
        let first = db.get_or_create_default_profile().unwrap();
        assert_eq!(first.name, DEFAULT_PROFILE_NAME);
        assert!(first.is_default);
        let second = db.get_or_create_default_profile().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_new_default_clears_others() {
        let db = Database::new_in_memory().unwrap();
        let old = db.get_or_create_default_profile().unwrap();
        let new = db.create_profile("Engineering", None, true).unwrap();

        assert!(!db.get_profile(old.id).unwrap().unwrap().is_default);
        assert_eq!(db.get_or_create_default_profile().unwrap().id, new.id);
    }

    #[test]
    fn test_cannot_unset_last_default() {
        let db = Database::new_in_memory().unwrap();
        let profile = db.get_or_create_default_profile().unwrap();
        let request = ProfileRequest {
            name: Some("Renamed".to_string()),
            display_name: Some("Jane".to_string()),
            ..Default::default()
        };
        let result = db.update_profile(profile.id, &request).unwrap().unwrap();

        match result {
            ProfileUpdate::KeptDefault(p) => {
                assert!(p.is_default);
                assert_eq!(p.name, "Renamed");
                assert_eq!(p.display_name.as_deref(), Some("Jane"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_update_missing_profile() {
        let db = Database::new_in_memory().unwrap();
        let request = ProfileRequest::default();
        assert!(db.update_profile(99, &request).unwrap().is_none());
    }

    #[test]
    fn test_default_profile_not_deleted() {
        let db = Database::new_in_memory().unwrap();
        let default = db.get_or_create_default_profile().unwrap();
        let other = db.create_profile("Other", None, false).unwrap();

        assert!(!db.delete_profile(default.id).unwrap());
        assert!(db.delete_profile(other.id).unwrap());
        assert_eq!(db.list_profiles().unwrap().len(), 1);
    }

    #[test]
    fn test_assign_resumes_skips_unknown() {
        let db = Database::new_in_memory().unwrap();
        let profile = db.get_or_create_default_profile().unwrap();
        let resume = db.create_resume("a.txt", "a.txt", "/tmp/a.txt", Some("text")).unwrap();

        db.set_profile_resumes(profile.id, &[resume.id, 404]).unwrap();
        assert_eq!(db.get_profile_resume_ids(profile.id).unwrap(), vec![resume.id]);

        db.set_profile_resumes(profile.id, &[]).unwrap();
        assert!(db.get_profile_resume_ids(profile.id).unwrap().is_empty());
    }
}
