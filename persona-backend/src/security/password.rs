//! Password policy, strength scoring, and bcrypt hashing

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Passwords rejected regardless of complexity
static COMMON_PASSWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password", "password123", "12345678", "qwerty", "abc123", "monkey", "1234567890",
        "letmein", "trustno1", "dragon", "baseball", "iloveyou", "master", "sunshine", "ashley",
        "bailey", "passw0rd", "shadow", "123123", "654321", "superman", "qazwsx", "michael",
        "football", "admin", "changeme", "changeme123", "admin123",
    ]
    .into_iter()
    .collect()
});

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};:'\",.<>?/\\|`~";

fn is_special(c: char) -> bool {
    SPECIAL_CHARS.contains(c)
}

/// Configurable complexity rules
#[derive(Debug, Clone)]
pub struct PasswordValidator {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digits: bool,
    pub require_special: bool,
}

impl Default for PasswordValidator {
    fn default() -> Self {
        Self {
            min_length: 12,
            require_uppercase: true,
            require_lowercase: true,
            require_digits: true,
            require_special: true,
        }
    }
}

impl PasswordValidator {
    /// Check every rule; all violations are returned
    pub fn validate(&self, password: &str, username: Option<&str>) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if password.chars().count() < self.min_length {
            errors.push(format!(
                "Password must be at least {} characters long",
                self.min_length
            ));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push("Password must contain at least one uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push("Password must contain at least one lowercase letter".to_string());
        }
        if self.require_digits && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least one number".to_string());
        }
        if self.require_special && !password.chars().any(is_special) {
            errors.push(
                "Password must contain at least one special character (!@#$%^&* etc.)".to_string(),
            );
        }
        if is_common(password) {
            errors.push("Password is too common. Please choose a more unique password".to_string());
        }
        if let Some(username) = username {
            if username.chars().count() >= 3
                && password.to_lowercase().contains(&username.to_lowercase())
            {
                errors.push("Password must not contain your username".to_string());
            }
        }
        if has_sequential_chars(password, 3) {
            errors.push(
                "Password should not contain sequential characters (e.g., '123', 'abc')".to_string(),
            );
        }
        if has_repeated_chars(password, 3) {
            errors.push("Password should not contain excessive repeated characters".to_string());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Score from 0 to 100
    pub fn strength_score(&self, password: &str) -> u32 {
        let len = password.chars().count();
        if len == 0 {
            return 0;
        }

        let mut score: i32 = 0;
        for threshold in [8, 12, 16] {
            if len >= threshold {
                score += 10;
            }
        }

        let classes = [
            password.chars().any(|c| c.is_ascii_lowercase()),
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(is_special),
        ];
        let class_count = classes.iter().filter(|present| **present).count();
        score += 10 * class_count as i32;
        if class_count >= 3 {
            score += 10;
        }
        if class_count == 4 {
            score += 10;
        }

        let unique: HashSet<char> = password.chars().collect();
        if unique.len() as f64 / len as f64 > 0.7 {
            score += 10;
        }

        if is_common(password) {
            score = (score - 50).max(0);
        }
        if has_sequential_chars(password, 3) {
            score = (score - 20).max(0);
        }
        if has_repeated_chars(password, 3) {
            score = (score - 20).max(0);
        }

        score.clamp(0, 100) as u32
    }
}

pub fn strength_label(score: u32) -> &'static str {
    match score {
        0..=19 => "Very Weak",
        20..=39 => "Weak",
        40..=59 => "Fair",
        60..=79 => "Strong",
        _ => "Very Strong",
    }
}

/// Validate with the default policy
pub fn validate_password(password: &str, username: Option<&str>) -> Result<(), Vec<String>> {
    PasswordValidator::default().validate(password, username)
}

/// Score and label with the default policy
pub fn password_strength(password: &str) -> (u32, &'static str) {
    let score = PasswordValidator::default().strength_score(password);
    (score, strength_label(score))
}

fn is_common(password: &str) -> bool {
    COMMON_PASSWORDS.contains(password.to_lowercase().as_str())
}

/// Ascending or descending runs of digits or letters, e.g. "123", "cba"
fn has_sequential_chars(password: &str, run: usize) -> bool {
    let chars: Vec<char> = password.chars().collect();
    if chars.len() < run {
        return false;
    }

    chars.windows(run).any(|w| {
        let all_digits = w.iter().all(|c| c.is_ascii_digit());
        let all_alpha = w.iter().all(|c| c.is_ascii_alphabetic());
        if !all_digits && !all_alpha {
            return false;
        }
        let codes: Vec<i32> = w.iter().map(|c| c.to_ascii_lowercase() as i32).collect();
        let ascending = codes.windows(2).all(|p| p[0] + 1 == p[1]);
        let descending = codes.windows(2).all(|p| p[0] - 1 == p[1]);
        ascending || descending
    })
}

/// The same character `max_repeats` times in a row
fn has_repeated_chars(password: &str, max_repeats: usize) -> bool {
    let chars: Vec<char> = password.chars().collect();
    if chars.len() < max_repeats {
        return false;
    }
    chars.windows(max_repeats).any(|w| w.iter().all(|c| *c == w[0]))
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, String> {
    bcrypt::hash(password, cost).map_err(|e| format!("Failed to hash password: {}", e))
}

/// Malformed hashes verify as false
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(valid) => valid,
        Err(e) => {
            log::warn!("Password hash verification error: {}", e);
            false
        }
    }
}
