use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use super::{error_response, internal_error};
use crate::db::ProfileUpdate;
use crate::middleware::rate_limit::enforce;
use crate::middleware::session_auth::{require_admin, AdminUser};
use crate::models::{Profile, ProfileRequest};
use crate::security::{audit, RateLimitKind};
use crate::AppState;

/// Profile as offered to visitors
#[derive(Serialize)]
pub struct PublicProfile {
    id: i64,
    name: String,
    description: Option<String>,
    display_name: Option<String>,
    introduction: Option<String>,
    is_default: bool,
}

impl From<Profile> for PublicProfile {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            display_name: p.display_name,
            introduction: p.introduction,
            is_default: p.is_default,
        }
    }
}

#[derive(Deserialize)]
pub struct AssignResumesRequest {
    #[serde(default)]
    resume_ids: Vec<i64>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/profiles").route(web::get().to(list_public_profiles)));
    cfg.service(
        web::scope("/api/admin/profiles")
            .route("", web::get().to(list_profiles))
            .route("", web::post().to(create_profile))
            .route("/{id}", web::put().to(update_profile))
            .route("/{id}", web::delete().to(delete_profile))
            .route("/{id}/resumes", web::post().to(assign_resumes)),
    );
}

fn authorize_mutation(state: &AppState, req: &HttpRequest) -> Result<AdminUser, HttpResponse> {
    let admin = require_admin(state, req)?;
    enforce(state, req, RateLimitKind::AdminAction)?;
    Ok(admin)
}

/// Names are unique; `exclude` is the profile being renamed
fn name_taken(state: &AppState, name: &str, exclude: Option<i64>) -> rusqlite::Result<bool> {
    Ok(state
        .db
        .list_profiles()?
        .iter()
        .any(|p| p.name == name && Some(p.id) != exclude))
}

async fn list_public_profiles(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = enforce(&state, &req, RateLimitKind::Api) {
        return resp;
    }

    match state.db.list_profiles() {
        Ok(profiles) => {
            let profiles: Vec<PublicProfile> = profiles.into_iter().map(PublicProfile::from).collect();
            HttpResponse::Ok().json(profiles)
        }
        Err(e) => internal_error("Failed to list profiles", e),
    }
}

async fn list_profiles(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    match state.db.list_profiles() {
        Ok(profiles) => HttpResponse::Ok().json(serde_json::json!({ "profiles": profiles })),
        Err(e) => internal_error("Failed to list profiles", e),
    }
}

async fn create_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ProfileRequest>,
) -> impl Responder {
    let admin = match authorize_mutation(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let name = body.name.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Profile name is required");
    }
    match name_taken(&state, name, None) {
        Ok(true) => return error_response(StatusCode::CONFLICT, "Profile name already exists"),
        Ok(false) => {}
        Err(e) => return internal_error("Failed to check profile name", e),
    }

    let created = match state
        .db
        .create_profile(name, body.description.as_deref(), body.is_default)
    {
        Ok(profile) => profile,
        Err(e) => return internal_error("Failed to create profile", e),
    };

    // The remaining fields go through the regular update path
    let profile = match state.db.update_profile(created.id, &body) {
        Ok(Some(ProfileUpdate::Updated(p) | ProfileUpdate::KeptDefault(p))) => p,
        Ok(None) => created,
        Err(e) => return internal_error("Failed to save profile", e),
    };

    audit::admin_action(
        "Create profile",
        &admin.user.username,
        &audit::client_ip(&req),
        Some(&profile.name),
    );
    HttpResponse::Created().json(profile)
}

async fn update_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<ProfileRequest>,
) -> impl Responder {
    let admin = match authorize_mutation(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let id = path.into_inner();

    if let Some(name) = body.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        match name_taken(&state, name, Some(id)) {
            Ok(true) => return error_response(StatusCode::CONFLICT, "Profile name already exists"),
            Ok(false) => {}
            Err(e) => return internal_error("Failed to check profile name", e),
        }
    }

    let (profile, warning) = match state.db.update_profile(id, &body) {
        Ok(Some(ProfileUpdate::Updated(p))) => (p, None),
        Ok(Some(ProfileUpdate::KeptDefault(p))) => (p, Some("At least one profile must be default")),
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => return internal_error("Failed to update profile", e),
    };

    audit::admin_action(
        "Update profile",
        &admin.user.username,
        &audit::client_ip(&req),
        Some(&profile.name),
    );
    HttpResponse::Ok().json(serde_json::json!({
        "profile": profile,
        "warning": warning
    }))
}

async fn delete_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let admin = match authorize_mutation(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let profile = match state.db.get_profile(path.into_inner()) {
        Ok(Some(profile)) => profile,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => return internal_error("Failed to load profile", e),
    };
    if profile.is_default {
        return error_response(StatusCode::BAD_REQUEST, "Cannot delete the default profile");
    }

    match state.db.delete_profile(profile.id) {
        Ok(_) => {
            audit::admin_action(
                "Delete profile",
                &admin.user.username,
                &audit::client_ip(&req),
                Some(&profile.name),
            );
            HttpResponse::Ok().json(serde_json::json!({ "success": true }))
        }
        Err(e) => internal_error("Failed to delete profile", e),
    }
}

async fn assign_resumes(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<AssignResumesRequest>,
) -> impl Responder {
    if let Err(resp) = authorize_mutation(&state, &req) {
        return resp;
    }

    let profile_id = path.into_inner();
    match state.db.get_profile(profile_id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => return internal_error("Failed to load profile", e),
    }

    match state
        .db
        .set_profile_resumes(profile_id, &body.resume_ids)
        .and_then(|_| state.db.get_profile_resume_ids(profile_id))
    {
        Ok(resume_ids) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Resumes updated successfully",
            "resume_ids": resume_ids
        })),
        Err(e) => internal_error("Failed to assign resumes", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::{admin_token, bearer};
    use actix_web::{test, App};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_public_profile_listing() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        state.db.get_or_create_default_profile().unwrap();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/profiles").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["name"], "Default Profile");
        assert_eq!(body[0]["is_default"], true);
        assert!(body[0].get("primary_resume_id").is_none());
    }

    #[actix_web::test]
    async fn test_new_default_clears_others() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let token = admin_token(&state, "root");
        let original = state.db.get_or_create_default_profile().unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/admin/profiles")
            .insert_header(bearer(&token))
            .set_json(json!({
                "name": "Backend",
                "display_name": "Sam",
                "introduction": "Hi, I build APIs.",
                "is_default": true
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["display_name"], "Sam");
        assert_eq!(body["is_default"], true);

        assert!(!state.db.get_profile(original.id).unwrap().unwrap().is_default);

        let req = test::TestRequest::post()
            .uri("/api/admin/profiles")
            .insert_header(bearer(&token))
            .set_json(json!({ "name": "Backend" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_default_cannot_be_unset_or_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let token = admin_token(&state, "root");
        let default = state.db.get_or_create_default_profile().unwrap();
        let other = state.db.create_profile("Other", None, false).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::put()
            .uri(&format!("/api/admin/profiles/{}", default.id))
            .insert_header(bearer(&token))
            .set_json(json!({ "is_default": false }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["profile"]["is_default"], true);
        assert!(body["warning"].is_string());

        let req = test::TestRequest::delete()
            .uri(&format!("/api/admin/profiles/{}", default.id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/admin/profiles/{}", other.id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(state.db.get_profile(other.id).unwrap().is_none());
    }

    #[actix_web::test]
    async fn test_assign_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let token = admin_token(&state, "root");
        let profile = state.db.get_or_create_default_profile().unwrap();
        let resume = state.db.create_resume("a.txt", "a.txt", "/tmp/a.txt", Some("text")).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/admin/profiles/{}/resumes", profile.id))
            .insert_header(bearer(&token))
            .set_json(json!({ "resume_ids": [resume.id, 404] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["resume_ids"], json!([resume.id]));

        let req = test::TestRequest::post()
            .uri("/api/admin/profiles/999/resumes")
            .insert_header(bearer(&token))
            .set_json(json!({ "resume_ids": [] }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
