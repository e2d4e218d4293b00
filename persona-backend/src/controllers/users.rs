use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;

use super::auth::hash_off_thread;
use super::{error_response, internal_error};
use crate::middleware::rate_limit::enforce;
use crate::middleware::session_auth::{require_admin, AdminUser};
use crate::models::UserResponse;
use crate::security::{audit, validate_password, RateLimitKind};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    username: String,
    email: Option<String>,
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm_password: String,
    #[serde(default)]
    must_change_password: bool,
}

/// Absent fields are left unchanged; an empty `email` clears it
#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    username: Option<String>,
    email: Option<String>,
    is_active: Option<bool>,
    new_password: Option<String>,
    #[serde(default)]
    must_change_password: bool,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin/users")
            .route("", web::get().to(list_users))
            .route("", web::post().to(create_user))
            .route("/{id}", web::put().to(update_user))
            .route("/{id}", web::delete().to(delete_user))
            .route("/{id}/unlock", web::post().to(unlock_user)),
    );
}

/// Admin check plus the `admin_action` limit shared by every mutation here
fn authorize_mutation(state: &AppState, req: &HttpRequest) -> Result<AdminUser, HttpResponse> {
    let admin = require_admin(state, req)?;
    enforce(state, req, RateLimitKind::AdminAction)?;
    Ok(admin)
}

fn password_errors(errors: Vec<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": "Password does not meet requirements",
        "errors": errors
    }))
}

async fn list_users(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    match state.db.list_users() {
        Ok(users) => {
            let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
            HttpResponse::Ok().json(serde_json::json!({ "users": users }))
        }
        Err(e) => internal_error("Failed to list users", e),
    }
}

async fn create_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateUserRequest>,
) -> impl Responder {
    let admin = match authorize_mutation(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let username = body.username.trim();
    let email = body.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

    if username.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Username is required");
    }
    if body.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Password is required");
    }

    match state.db.get_user_by_username(username) {
        Ok(Some(_)) => return error_response(StatusCode::CONFLICT, "Username already exists"),
        Ok(None) => {}
        Err(e) => return internal_error("Failed to check username", e),
    }
    if let Some(email) = email {
        match state.db.email_in_use(email, None) {
            Ok(true) => return error_response(StatusCode::CONFLICT, "Email already exists"),
            Ok(false) => {}
            Err(e) => return internal_error("Failed to check email", e),
        }
    }

    if body.password != body.confirm_password {
        return error_response(StatusCode::BAD_REQUEST, "Passwords do not match");
    }
    if let Err(errors) = validate_password(&body.password, Some(username)) {
        return password_errors(errors);
    }

    let hash = match hash_off_thread(body.password.clone(), state.config.bcrypt_cost).await {
        Ok(hash) => hash,
        Err(e) => return internal_error("Failed to hash password", e),
    };

    match state
        .db
        .create_user(username, email, &hash, body.must_change_password)
    {
        Ok(user) => {
            audit::user_created(&user.username, &admin.user.username, &audit::client_ip(&req));
            HttpResponse::Created().json(UserResponse::from(user))
        }
        Err(e) => internal_error("Failed to create user", e),
    }
}

async fn update_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateUserRequest>,
) -> impl Responder {
    let admin = match authorize_mutation(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let mut user = match state.db.get_user(path.into_inner()) {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => return internal_error("Failed to load user", e),
    };

    let mut fields_changed: Vec<&str> = Vec::new();

    if let Some(new_username) = body.username.as_deref().map(str::trim) {
        if !new_username.is_empty() && new_username != user.username {
            match state.db.get_user_by_username(new_username) {
                Ok(Some(_)) => return error_response(StatusCode::CONFLICT, "Username already exists"),
                Ok(None) => {}
                Err(e) => return internal_error("Failed to check username", e),
            }
            user.username = new_username.to_string();
            fields_changed.push("username");
        }
    }

    if let Some(new_email) = body.email.as_deref().map(str::trim) {
        if new_email != user.email.as_deref().unwrap_or("") {
            if !new_email.is_empty() {
                match state.db.email_in_use(new_email, Some(user.id)) {
                    Ok(true) => return error_response(StatusCode::CONFLICT, "Email already exists"),
                    Ok(false) => {}
                    Err(e) => return internal_error("Failed to check email", e),
                }
            }
            user.email = Some(new_email.to_string()).filter(|e| !e.is_empty());
            fields_changed.push("email");
        }
    }

    if let Some(is_active) = body.is_active {
        if is_active != user.is_active {
            user.is_active = is_active;
            fields_changed.push("is_active");
            if !is_active {
                user.unlock();
            }
        }
    }

    if let Some(new_password) = body.new_password.as_deref().filter(|p| !p.is_empty()) {
        if let Err(errors) = validate_password(new_password, Some(&user.username)) {
            return password_errors(errors);
        }
        user.password_hash =
            match hash_off_thread(new_password.to_string(), state.config.bcrypt_cost).await {
                Ok(hash) => hash,
                Err(e) => return internal_error("Failed to hash password", e),
            };
        user.password_changed_at = Some(Utc::now());
        user.must_change_password = body.must_change_password;
        fields_changed.push("password");
    }

    if let Err(e) = state.db.save_user(&user) {
        return internal_error("Failed to save user", e);
    }
    if !user.is_active {
        let _ = state.db.delete_sessions_for_user(user.id);
    }

    if !fields_changed.is_empty() {
        audit::user_updated(
            &user.username,
            &admin.user.username,
            &fields_changed,
            &audit::client_ip(&req),
        );
    }

    HttpResponse::Ok().json(UserResponse::from(user))
}

async fn delete_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let admin = match authorize_mutation(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let mut user = match state.db.get_user(path.into_inner()) {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => return internal_error("Failed to load user", e),
    };

    if user.id == admin.user.id {
        return error_response(StatusCode::BAD_REQUEST, "You cannot delete your own account");
    }

    // Deactivated rather than removed so the audit trail keeps its subject
    user.is_active = false;
    if let Err(e) = state.db.save_user(&user) {
        return internal_error("Failed to deactivate user", e);
    }
    let _ = state.db.delete_sessions_for_user(user.id);

    audit::user_deleted(&user.username, &admin.user.username, &audit::client_ip(&req));
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": format!("User {} has been deactivated", user.username)
    }))
}

async fn unlock_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let admin = match authorize_mutation(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let mut user = match state.db.get_user(path.into_inner()) {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => return internal_error("Failed to load user", e),
    };

    user.unlock();
    if let Err(e) = state.db.save_user(&user) {
        return internal_error("Failed to unlock user", e);
    }

    audit::admin_action(
        "Unlock account",
        &admin.user.username,
        &audit::client_ip(&req),
        Some(&format!("Unlocked user: {}", user.username)),
    );
    HttpResponse::Ok().json(UserResponse::from(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::{admin_token, bearer};
    use actix_web::{test, App};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_create_and_list_users() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let token = admin_token(&state, "root");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let create = |username: &str, email: &str, password: &str, confirm: &str| {
            test::TestRequest::post()
                .uri("/api/admin/users")
                .insert_header(bearer(&token))
                .set_json(json!({
                    "username": username,
                    "email": email,
                    "password": password,
                    "confirm_password": confirm,
                    "must_change_password": true
                }))
                .to_request()
        };

        let resp = test::call_service(&app, create("editor", "ed@example.com", "Maple-Orbit-58!", "Maple-Orbit-58!")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["must_change_password"], true);
        assert!(body.get("password_hash").is_none());

        let resp = test::call_service(&app, create("editor", "", "Maple-Orbit-58!", "Maple-Orbit-58!")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = test::call_service(&app, create("other", "ed@example.com", "Maple-Orbit-58!", "Maple-Orbit-58!")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = test::call_service(&app, create("other", "", "Maple-Orbit-58!", "nope")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/admin/users")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let names: Vec<&str> = body["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["editor", "root"]);
    }

    #[actix_web::test]
    async fn test_requires_admin() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/admin/users").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_update_deactivate_and_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let token = admin_token(&state, "root");
        let target = state.db.create_user("writer", Some("w@example.com"), "hash", false).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::put()
            .uri(&format!("/api/admin/users/{}", target.id))
            .insert_header(bearer(&token))
            .set_json(json!({ "email": "", "username": "author" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["username"], "author");
        assert!(body["email"].is_null());

        for _ in 0..5 {
            state.db.record_failed_login(target.id, Utc::now()).unwrap();
        }

        let req = test::TestRequest::post()
            .uri(&format!("/api/admin/users/{}/unlock", target.id))
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["is_locked"], false);
        assert_eq!(body["failed_login_attempts"], 0);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/admin/users/{}", target.id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(!state.db.get_user(target.id).unwrap().unwrap().is_active);
    }

    #[actix_web::test]
    async fn test_cannot_delete_self() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let token = admin_token(&state, "root");
        let me = state.db.get_user_by_username("root").unwrap().unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/admin/users/{}", me.id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert!(state.db.get_user(me.id).unwrap().unwrap().is_active);
    }
}
