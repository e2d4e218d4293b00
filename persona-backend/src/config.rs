use std::env;
use std::path::PathBuf;

use crate::security::rate_limit::{RateLimit, RateLimitKind};

/// Secret shipped in development builds; refused when `IS_PRODUCTION` is set
pub const DEFAULT_SECRET_KEY: &str = "dev-secret-key-change-in-production";

pub const ALLOWED_RESUME_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt"];
pub const ALLOWED_ICON_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "webp"];

#[derive(Clone)]
pub struct Config {
    pub secret_key: String,
    pub is_production: bool,
    pub port: u16,
    pub database_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_api_model: String,
    pub gemini_api_endpoint: String,
    pub max_content_length: usize,
    pub upload_folder: PathBuf,
    pub admin_username: String,
    pub admin_password: String,
    pub session_lifetime_secs: i64,
    pub session_cookie_secure: bool,
    pub cors_allowed_origins: Vec<String>,
    pub public_base_url: Option<String>,
    pub bcrypt_cost: u32,
    pub geoip_endpoint: String,
    pub rate_limits: RateLimits,
}

/// Named request limits, overridable with `RATE_LIMIT_<NAME>="5 per 15 minutes"`
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub login: RateLimit,
    pub api: RateLimit,
    pub chat: RateLimit,
    pub upload: RateLimit,
    pub admin_action: RateLimit,
}

impl RateLimits {
    pub fn get(&self, kind: RateLimitKind) -> RateLimit {
        match kind {
            RateLimitKind::Login => self.login,
            RateLimitKind::Api => self.api,
            RateLimitKind::Chat => self.chat,
            RateLimitKind::Upload => self.upload,
            RateLimitKind::AdminAction => self.admin_action,
        }
    }

    fn from_env() -> Self {
        let load = |kind: RateLimitKind| {
            let var = format!("RATE_LIMIT_{}", kind.as_ref().to_uppercase());
            match env::var(&var) {
                Ok(raw) => RateLimit::parse(&raw).unwrap_or_else(|e| {
                    log::warn!("Ignoring {}: {}", var, e);
                    kind.default_limit()
                }),
                Err(_) => kind.default_limit(),
            }
        };

        Self {
            login: load(RateLimitKind::Login),
            api: load(RateLimitKind::Api),
            chat: load(RateLimitKind::Chat),
            upload: load(RateLimitKind::Upload),
            admin_action: load(RateLimitKind::AdminAction),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            login: RateLimitKind::Login.default_limit(),
            api: RateLimitKind::Api.default_limit(),
            chat: RateLimitKind::Chat.default_limit(),
            upload: RateLimitKind::Upload.default_limit(),
            admin_action: RateLimitKind::AdminAction.default_limit(),
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8080,http://127.0.0.1:8080".to_string())
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Self {
            secret_key: env::var("SECRET_KEY").unwrap_or_else(|_| DEFAULT_SECRET_KEY.to_string()),
            is_production: env_flag("IS_PRODUCTION"),
            port: env_parse("PORT", 8080),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "./.db/persona.db".to_string()),
            gemini_api_key,
            gemini_api_model: env::var("GEMINI_API_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            gemini_api_endpoint: env::var("GEMINI_API_ENDPOINT")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            max_content_length: env_parse("MAX_CONTENT_LENGTH", 16 * 1024 * 1024),
            upload_folder: PathBuf::from(
                env::var("UPLOAD_FOLDER").unwrap_or_else(|_| "./uploads".to_string()),
            ),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string()),
            session_lifetime_secs: env_parse("SESSION_LIFETIME_SECS", 3600),
            session_cookie_secure: env_flag("SESSION_COOKIE_SECURE"),
            cors_allowed_origins,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .ok()
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            bcrypt_cost: env_parse("BCRYPT_COST", 14),
            geoip_endpoint: env::var("GEOIP_ENDPOINT")
                .unwrap_or_else(|_| "https://ipapi.co".to_string()),
            rate_limits: RateLimits::from_env(),
        }
    }

    /// Configuration used by tests: in-memory database, temp uploads, cheap hashing
    #[cfg(test)]
    pub fn for_tests(upload_folder: &std::path::Path) -> Self {
        Self {
            secret_key: "test-secret".to_string(),
            is_production: false,
            port: 0,
            database_url: ":memory:".to_string(),
            gemini_api_key: None,
            gemini_api_model: "gemini-test".to_string(),
            gemini_api_endpoint: "http://127.0.0.1:9".to_string(),
            max_content_length: 1024 * 1024,
            upload_folder: upload_folder.to_path_buf(),
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            session_lifetime_secs: 3600,
            session_cookie_secure: false,
            cors_allowed_origins: vec!["http://localhost:8080".to_string()],
            public_base_url: None,
            bcrypt_cost: 4,
            geoip_endpoint: "http://127.0.0.1:9".to_string(),
            rate_limits: RateLimits::default(),
        }
    }

    pub fn resume_folder(&self) -> PathBuf {
        self.upload_folder.join("resumes")
    }

    pub fn icons_folder(&self) -> PathBuf {
        self.upload_folder.join("icons")
    }

    /// The default secret must never reach a production deployment
    pub fn uses_default_secret_in_production(&self) -> bool {
        self.is_production && self.secret_key == DEFAULT_SECRET_KEY
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.cors_allowed_origins.iter().any(|o| o == origin)
    }
}

/// Create the upload directory tree
pub fn initialize_upload_dirs(config: &Config) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.upload_folder)?;
    std::fs::create_dir_all(config.resume_folder())?;
    std::fs::create_dir_all(config.icons_folder())?;
    Ok(())
}
