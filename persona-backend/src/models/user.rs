use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Wrong passwords allowed before the account locks
pub const MAX_FAILED_LOGINS: i32 = 5;
/// How long a lock lasts
pub const LOCKOUT_MINUTES: i64 = 30;

/// Admin panel user
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub must_change_password: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub is_active: bool,
}

impl User {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    pub fn lock(&mut self, now: DateTime<Utc>, minutes: i64) {
        self.locked_until = Some(now + Duration::minutes(minutes));
    }

    pub fn unlock(&mut self) {
        self.locked_until = None;
        self.failed_login_attempts = 0;
    }

    pub fn remaining_attempts(&self) -> i32 {
        (MAX_FAILED_LOGINS - self.failed_login_attempts).max(0)
    }
}

/// User as returned by the admin API (never includes the hash)
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub failed_login_attempts: i32,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub must_change_password: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub is_active: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            is_locked: user.is_locked(Utc::now()),
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            failed_login_attempts: user.failed_login_attempts,
            locked_until: user.locked_until,
            password_changed_at: user.password_changed_at,
            must_change_password: user.must_change_password,
            last_login_at: user.last_login_at,
            last_login_ip: user.last_login_ip,
            is_active: user.is_active,
        }
    }
}
