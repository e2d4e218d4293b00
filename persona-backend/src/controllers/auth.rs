use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{error_response, internal_error};
use crate::middleware::rate_limit::enforce;
use crate::middleware::session_auth::{extract_token, require_admin};
use crate::models::LOCKOUT_MINUTES;
use crate::security::{
    audit, hash_password, password_strength, validate_password, verify_password, RateLimitKind,
};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    success: bool,
    token: String,
    expires_at: i64,
    username: String,
    must_change_password: bool,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
    #[serde(default)]
    confirm_password: String,
}

#[derive(Deserialize)]
pub struct StrengthRequest {
    #[serde(default)]
    password: String,
    username: Option<String>,
}

#[derive(Serialize)]
pub struct StrengthResponse {
    score: u32,
    label: &'static str,
    valid: bool,
    errors: Vec<String>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    must_change_password: Option<bool>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/change-password", web::post().to(change_password))
            .route("/password-strength", web::post().to(check_strength))
            .route("/validate", web::get().to(validate)),
    );
}

/// bcrypt is deliberately slow; keep it off the async workers
pub(crate) async fn hash_off_thread(password: String, cost: u32) -> Result<String, String> {
    web::block(move || hash_password(&password, cost))
        .await
        .map_err(|e| e.to_string())?
}

async fn verify_off_thread(password: String, hash: String) -> bool {
    web::block(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

fn password_errors(errors: Vec<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": "Password does not meet requirements",
        "errors": errors
    }))
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<LoginRequest>,
) -> impl Responder {
    if let Err(resp) = enforce(&state, &req, RateLimitKind::Login) {
        return resp;
    }

    let ip = audit::client_ip(&req);
    let agent = audit::user_agent(&req);
    let username = body.username.trim();

    if username.is_empty() || body.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Please provide both username and password");
    }

    let mut user = match state.db.get_user_by_username(username) {
        Ok(Some(user)) => user,
        Ok(None) => {
            audit::failed_login(username, "User not found", &ip, &agent);
            return error_response(StatusCode::UNAUTHORIZED, "Invalid username or password");
        }
        Err(e) => return internal_error("Failed to load user", e),
    };

    let now = Utc::now();
    if user.is_locked(now) {
        audit::failed_login(username, "Account locked", &ip, &agent);
        return error_response(
            StatusCode::FORBIDDEN,
            "Account is temporarily locked due to too many failed login attempts. Please try again later.",
        );
    }

    if !user.is_active {
        audit::failed_login(username, "Account deactivated", &ip, &agent);
        return error_response(
            StatusCode::FORBIDDEN,
            "This account has been deactivated. Please contact an administrator.",
        );
    }

    if !verify_off_thread(body.password.clone(), user.password_hash.clone()).await {
        match state.db.record_failed_login(user.id, now) {
            Ok((attempts, locked_until)) => {
                user.failed_login_attempts = attempts;
                user.locked_until = locked_until;
            }
            Err(e) => return internal_error("Failed to record failed login", e),
        }

        return if user.is_locked(now) {
            audit::account_locked(username, &ip);
            error_response(
                StatusCode::UNAUTHORIZED,
                format!(
                    "Too many failed login attempts. Account has been locked for {} minutes.",
                    LOCKOUT_MINUTES
                ),
            )
        } else {
            audit::failed_login(username, "Invalid password", &ip, &agent);
            error_response(
                StatusCode::UNAUTHORIZED,
                format!(
                    "Invalid username or password. {} attempts remaining.",
                    user.remaining_attempts()
                ),
            )
        };
    }

    if let Err(e) = state.db.record_successful_login(user.id, now, &ip) {
        return internal_error("Failed to record login", e);
    }

    match state.db.create_session(user.id, state.config.session_lifetime_secs) {
        Ok(session) => {
            audit::successful_login(&user.username, &ip, &agent);
            HttpResponse::Ok().json(LoginResponse {
                success: true,
                token: session.token,
                expires_at: session.expires_at.timestamp(),
                username: user.username,
                must_change_password: user.must_change_password,
            })
        }
        Err(e) => internal_error("Failed to create session", e),
    }
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let admin = match require_admin(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    match state.db.delete_session(&admin.token) {
        Ok(_) => {
            audit::admin_action("Logout", &admin.user.username, &audit::client_ip(&req), None);
            HttpResponse::Ok().json(serde_json::json!({ "success": true }))
        }
        Err(e) => internal_error("Failed to delete session", e),
    }
}

async fn change_password(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ChangePasswordRequest>,
) -> impl Responder {
    let admin = match require_admin(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let mut user = admin.user;

    if !verify_off_thread(body.current_password.clone(), user.password_hash.clone()).await {
        return error_response(StatusCode::BAD_REQUEST, "Current password is incorrect");
    }

    if body.new_password != body.confirm_password {
        return error_response(StatusCode::BAD_REQUEST, "New passwords do not match");
    }

    if let Err(errors) = validate_password(&body.new_password, Some(&user.username)) {
        return password_errors(errors);
    }

    user.password_hash = match hash_off_thread(body.new_password.clone(), state.config.bcrypt_cost).await {
        Ok(hash) => hash,
        Err(e) => return internal_error("Failed to hash password", e),
    };
    user.password_changed_at = Some(Utc::now());
    user.must_change_password = false;

    match state.db.save_user(&user) {
        Ok(()) => {
            audit::password_change(&user.username, None, &audit::client_ip(&req));
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": "Password changed successfully!"
            }))
        }
        Err(e) => internal_error("Failed to save password", e),
    }
}

async fn check_strength(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<StrengthRequest>,
) -> impl Responder {
    if let Err(resp) = enforce(&state, &req, RateLimitKind::Api) {
        return resp;
    }

    let (score, label) = password_strength(&body.password);
    let errors = validate_password(&body.password, body.username.as_deref())
        .err()
        .unwrap_or_default();

    HttpResponse::Ok().json(StrengthResponse {
        score,
        label,
        valid: errors.is_empty(),
        errors,
    })
}

async fn validate(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let invalid = ValidateResponse {
        valid: false,
        username: None,
        must_change_password: None,
    };

    let token = match extract_token(&req) {
        Some(t) => t,
        None => return HttpResponse::Ok().json(invalid),
    };

    let session = match state.db.validate_session(&token) {
        Ok(Some(session)) => session,
        Ok(None) => return HttpResponse::Ok().json(invalid),
        Err(e) => {
            log::error!("Failed to validate session: {}", e);
            return HttpResponse::Ok().json(invalid);
        }
    };

    match state.db.get_user(session.user_id) {
        Ok(Some(user)) if user.is_active => HttpResponse::Ok().json(ValidateResponse {
            valid: true,
            username: Some(user.username),
            must_change_password: Some(user.must_change_password),
        }),
        Ok(_) => HttpResponse::Ok().json(invalid),
        Err(e) => {
            log::error!("Failed to load session user: {}", e);
            HttpResponse::Ok().json(invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::bearer;
    use crate::security::RateLimit;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::time::Duration;

    const GOOD_PASSWORD: &str = "Quartz-Lantern-92!";

    fn state_with_user(dir: &std::path::Path) -> web::Data<AppState> {
        let mut state = AppState::for_tests(dir);
        state.config.rate_limits.login = RateLimit::new(100, Duration::from_secs(60));
        let hash = hash_password(GOOD_PASSWORD, 4).unwrap();
        state.db.create_user("curator", None, &hash, true).unwrap();
        web::Data::new(state)
    }

    fn login_req(username: &str, password: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "username": username, "password": password }))
    }

    #[actix_web::test]
    async fn test_login_success_returns_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_user(dir.path());
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let resp = test::call_service(&app, login_req("curator", GOOD_PASSWORD).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["must_change_password"], true);

        let token = body["token"].as_str().unwrap().to_string();
        let req = test::TestRequest::get()
            .uri("/api/auth/validate")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["username"], "curator");

        let user = state.db.get_user_by_username("curator").unwrap().unwrap();
        assert!(user.last_login_at.is_some());
    }

    #[actix_web::test]
    async fn test_missing_fields_and_unknown_user() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_user(dir.path());
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let resp = test::call_service(&app, login_req("curator", "").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, login_req("ghost", GOOD_PASSWORD).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_fifth_wrong_password_locks_account() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_user(dir.path());
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let resp = test::call_service(&app, login_req("curator", "wrong").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("4 attempts remaining"));

        for _ in 0..4 {
            test::call_service(&app, login_req("curator", "wrong").to_request()).await;
        }
        let user = state.db.get_user_by_username("curator").unwrap().unwrap();
        assert!(user.is_locked(Utc::now()));

        // even the right password is refused while locked
        let resp = test::call_service(&app, login_req("curator", GOOD_PASSWORD).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_change_password_flow() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_user(dir.path());
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let body: Value =
            test::call_and_read_body_json(&app, login_req("curator", GOOD_PASSWORD).to_request()).await;
        let token = body["token"].as_str().unwrap().to_string();

        let change = |current: &str, new: &str, confirm: &str| {
            test::TestRequest::post()
                .uri("/api/auth/change-password")
                .insert_header(bearer(&token))
                .set_json(json!({
                    "current_password": current,
                    "new_password": new,
                    "confirm_password": confirm
                }))
                .to_request()
        };

        let resp = test::call_service(&app, change("nope", "Velvet-Harbor-37!", "Velvet-Harbor-37!")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, change(GOOD_PASSWORD, "Velvet-Harbor-37!", "different")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, change(GOOD_PASSWORD, "short", "short")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["errors"].as_array().unwrap().len() > 1);

        let resp = test::call_service(&app, change(GOOD_PASSWORD, "Velvet-Harbor-37!", "Velvet-Harbor-37!")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let user = state.db.get_user_by_username("curator").unwrap().unwrap();
        assert!(!user.must_change_password);
        assert!(verify_password("Velvet-Harbor-37!", &user.password_hash));
    }

    #[actix_web::test]
    async fn test_logout_revokes_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_user(dir.path());
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let body: Value =
            test::call_and_read_body_json(&app, login_req("curator", GOOD_PASSWORD).to_request()).await;
        let token = body["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(state.db.validate_session(&token).unwrap().is_none());
    }

    #[actix_web::test]
    async fn test_password_strength_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/password-strength")
            .set_json(json!({ "password": "password" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], false);
        assert_eq!(body["label"], "Very Weak");
    }
}
