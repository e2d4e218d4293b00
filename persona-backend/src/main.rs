use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod ai;
mod chat;
mod cli;
mod config;
mod controllers;
mod db;
mod documents;
mod gateway;
mod geo;
mod middleware;
mod models;
mod persona;
mod security;

use ai::{GeminiClient, TextGenerator};
use chat::ChatService;
use config::Config;
use db::Database;
use gateway::ChatRooms;
use geo::GeoLocator;
use persona::Persona;
use security::RateLimiter;

/// How often expired rate-limit windows and admin sessions are swept
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub rate_limiter: Arc<RateLimiter>,
    pub rooms: Arc<ChatRooms>,
    pub chat: Arc<ChatService>,
}

#[cfg(test)]
impl AppState {
    /// In-memory database, uploads below `upload_folder`, no AI key
    pub fn for_tests(upload_folder: &Path) -> AppState {
        let config = Config::for_tests(upload_folder);
        let db = Arc::new(Database::new_in_memory().unwrap());
        let persona = Arc::new(Persona::new(db.clone(), None));
        let geo = GeoLocator::new(&config.geoip_endpoint).unwrap();

        AppState {
            chat: Arc::new(ChatService::new(db.clone(), persona, geo)),
            db,
            config,
            rate_limiter: Arc::new(RateLimiter::new()),
            rooms: Arc::new(ChatRooms::new()),
        }
    }
}

/// Create the configured admin, the settings row and a default profile when missing
fn bootstrap(db: &Database, config: &Config) -> Result<(), String> {
    if db
        .get_user_by_username(&config.admin_username)
        .map_err(|e| e.to_string())?
        .is_none()
    {
        // A weak bootstrap password still works once, then must be replaced
        let must_change =
            security::validate_password(&config.admin_password, Some(&config.admin_username)).is_err();
        let hash = security::hash_password(&config.admin_password, config.bcrypt_cost)?;
        db.create_user(&config.admin_username, None, &hash, must_change)
            .map_err(|e| e.to_string())?;
        log::info!(
            "Created admin user '{}'{}",
            config.admin_username,
            if must_change { " (password change required)" } else { "" }
        );
    }

    db.get_settings().map_err(|e| e.to_string())?;
    let profile = db.get_or_create_default_profile().map_err(|e| e.to_string())?;
    log::info!("Default profile: {}", profile.name);
    Ok(())
}

fn build_generator(config: &Config) -> Option<Arc<dyn TextGenerator>> {
    let Some(key) = &config.gemini_api_key else {
        log::warn!("GEMINI_API_KEY not set; chat replies will explain that AI is unavailable");
        return None;
    };
    match GeminiClient::new(key, &config.gemini_api_endpoint, &config.gemini_api_model) {
        Ok(client) => {
            log::info!("Using Gemini model {}", config.gemini_api_model);
            Some(Arc::new(client))
        }
        Err(e) => {
            log::error!("Failed to create Gemini client: {}", e);
            None
        }
    }
}

/// Static SPA directory, or None when serving is disabled or the build is missing
fn frontend_dist() -> Option<PathBuf> {
    let disabled = std::env::var("DISABLE_FRONTEND")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if disabled {
        log::info!("Frontend serving disabled via DISABLE_FRONTEND env var");
        return None;
    }

    let dist = PathBuf::from(std::env::var("FRONTEND_DIST").unwrap_or_else(|_| "./web/dist".to_string()));
    if dist.join("index.html").exists() {
        Some(dist)
    } else {
        log::warn!("Frontend dist not found at {} - static file serving disabled", dist.display());
        None
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let cli = cli::Cli::parse();
    let config = Config::from_env();

    if config.uses_default_secret_in_production() {
        log::error!("SECRET_KEY must be changed before running with IS_PRODUCTION set");
        std::process::exit(1);
    }

    if let Err(e) = config::initialize_upload_dirs(&config) {
        log::error!("Failed to create upload directories under {}: {}", config.upload_folder.display(), e);
        return Err(e);
    }

    if let Some(parent) = Path::new(&config.database_url).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    log::info!("Initializing database at {}", config.database_url);
    let db = match Database::new(&config.database_url) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            log::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(cli::Command::Admin { action }) = &cli.command {
        match cli::run_admin(&db, config.bcrypt_cost, action) {
            Ok(message) => {
                println!("{}", message);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = bootstrap(&db, &config) {
        log::error!("Startup bootstrap failed: {}", e);
        std::process::exit(1);
    }

    let geo = match GeoLocator::new(&config.geoip_endpoint) {
        Ok(geo) => geo,
        Err(e) => {
            log::error!("Failed to create location lookup client: {}", e);
            std::process::exit(1);
        }
    };
    let persona = Arc::new(Persona::new(db.clone(), build_generator(&config)));
    let chat = Arc::new(ChatService::new(db.clone(), persona, geo));
    let rate_limiter = Arc::new(RateLimiter::new());
    let rooms = Arc::new(ChatRooms::new());

    // Background sweep of rate-limit windows and expired admin sessions
    let sweep_limiter = rate_limiter.clone();
    let sweep_db = db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            interval.tick().await;
            let windows = sweep_limiter.purge_expired();
            match sweep_db.delete_expired_sessions() {
                Ok(sessions) if windows + sessions > 0 => {
                    log::debug!("Purged {} rate-limit windows, {} expired sessions", windows, sessions)
                }
                Ok(_) => {}
                Err(e) => log::warn!("Failed to purge expired sessions: {}", e),
            }
        }
    });

    let frontend_dist = frontend_dist();
    let port = config.port;

    log::info!("Starting persona chat server on port {}", port);
    log::info!("WebSocket chat available at /ws");
    if let Some(dist) = &frontend_dist {
        log::info!("Serving frontend from: {}", dist.display());
    }

    let state = web::Data::new(AppState {
        db,
        config: config.clone(),
        rate_limiter,
        rooms,
        chat,
    });

    HttpServer::new(move || {
        let cors = config
            .cors_allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allow_any_header()
            .max_age(3600);

        let mut app = App::new()
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(config.max_content_length))
            .app_data(web::PayloadConfig::new(config.max_content_length))
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(security::security_headers(config.session_cookie_secure))
            .configure(controllers::health::config)
            .configure(controllers::auth::config)
            .configure(controllers::users::config)
            .configure(controllers::dashboard::config)
            .configure(controllers::settings::config)
            .configure(controllers::artifacts::config)
            .configure(controllers::profiles::config)
            .configure(controllers::history::config)
            .configure(controllers::uploads::config)
            .configure(controllers::chat::config)
            // Chat channel shares the HTTP port
            .route("/ws", web::get().to(gateway::ws::ws_handler));

        if let Some(dist) = &frontend_dist {
            let index = dist.join("index.html");
            app = app.service(
                Files::new("/", dist.clone())
                    .index_file("index.html")
                    .default_handler(web::to(move || {
                        let index = index.clone();
                        async move { NamedFile::open_async(index).await }
                    })),
            );
        }

        app
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_tests(dir.path());
        let db = Database::new_in_memory().unwrap();

        bootstrap(&db, &config).unwrap();
        bootstrap(&db, &config).unwrap();

        let users = db.list_users().unwrap();
        assert_eq!(users.len(), 1);
        // "admin" fails the password policy
        assert!(users[0].must_change_password);
        assert!(db.list_profiles().unwrap().iter().any(|p| p.is_default));
    }

    #[test]
    fn test_bootstrap_strong_password_needs_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests(dir.path());
        config.admin_username = "owner".to_string();
        config.admin_password = "Kq7#vRm2!pLx9w".to_string();
        let db = Database::new_in_memory().unwrap();

        bootstrap(&db, &config).unwrap();
        let user = db.get_user_by_username("owner").unwrap().unwrap();
        assert!(!user.must_change_password);
    }
}
