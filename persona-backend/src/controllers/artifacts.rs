use std::path::PathBuf;

use actix_multipart::Multipart;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::Local;
use serde::{Deserialize, Serialize};

use super::form::read_form;
use super::{error_response, internal_error};
use crate::config::ALLOWED_RESUME_EXTENSIONS;
use crate::documents::{
    allowed_file, extract_text_from_file, secure_filename, text_artifact_name, unique_resume_name,
};
use crate::middleware::rate_limit::enforce;
use crate::middleware::session_auth::{require_admin, AdminUser};
use crate::models::{Profile, Resume};
use crate::security::{audit, RateLimitKind};
use crate::AppState;

#[derive(Serialize)]
pub struct ProfileWithResumes {
    #[serde(flatten)]
    profile: Profile,
    resume_ids: Vec<i64>,
}

#[derive(Serialize)]
pub struct ArtifactsResponse {
    resumes: Vec<Resume>,
    profiles: Vec<ProfileWithResumes>,
}

#[derive(Serialize)]
pub struct StoredArtifact {
    success: bool,
    message: &'static str,
    id: i64,
    extracted_chars: usize,
}

#[derive(Serialize)]
pub struct ResumeDetail {
    id: i64,
    filename: String,
    content: Option<String>,
    is_text: bool,
    is_active: bool,
    profile_ids: Vec<i64>,
}

#[derive(Deserialize)]
pub struct ResumeTextRequest {
    #[serde(default)]
    resume_text: String,
}

#[derive(Deserialize)]
pub struct UpdateResumeRequest {
    content: Option<String>,
    filename: Option<String>,
    #[serde(default)]
    profile_ids: Vec<i64>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/admin/artifacts").route(web::get().to(list_artifacts)));
    cfg.service(
        web::scope("/api/admin/resumes")
            .route("/upload", web::post().to(upload_resume))
            .route("/text", web::post().to(upload_resume_text))
            .route("/{id}", web::get().to(get_resume))
            .route("/{id}", web::delete().to(delete_resume))
            .route("/{id}/update", web::post().to(update_resume)),
    );
}

fn authorize(state: &AppState, req: &HttpRequest, kind: RateLimitKind) -> Result<AdminUser, HttpResponse> {
    let admin = require_admin(state, req)?;
    enforce(state, req, kind)?;
    Ok(admin)
}

fn resume_path(state: &AppState, stored_name: &str) -> PathBuf {
    state.config.resume_folder().join(stored_name)
}

async fn list_artifacts(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    let resumes = match state.db.list_resumes() {
        Ok(resumes) => resumes,
        Err(e) => return internal_error("Failed to list resumes", e),
    };
    let profiles = match state.db.list_profiles() {
        Ok(profiles) => profiles,
        Err(e) => return internal_error("Failed to list profiles", e),
    };

    let mut with_resumes = Vec::with_capacity(profiles.len());
    for profile in profiles {
        match state.db.get_profile_resume_ids(profile.id) {
            Ok(resume_ids) => with_resumes.push(ProfileWithResumes { profile, resume_ids }),
            Err(e) => return internal_error("Failed to load profile resumes", e),
        }
    }

    HttpResponse::Ok().json(ArtifactsResponse {
        resumes,
        profiles: with_resumes,
    })
}

async fn upload_resume(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> impl Responder {
    let admin = match authorize(&state, &req, RateLimitKind::Upload) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let form = match read_form(payload, state.config.max_content_length).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };

    let Some(upload) = form.file("resume") else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided");
    };
    if !allowed_file(&upload.filename, ALLOWED_RESUME_EXTENSIONS) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid file type");
    }

    let original_name = secure_filename(&upload.filename);
    let stored_name = unique_resume_name(&original_name);
    let path = resume_path(&state, &stored_name);
    if let Err(e) = std::fs::write(&path, &upload.data) {
        return internal_error("Failed to save resume", e);
    }

    let extract_from = path.clone();
    let content = web::block(move || extract_text_from_file(&extract_from))
        .await
        .unwrap_or_default();
    if content.is_empty() {
        log::warn!("No text extracted from {}", original_name);
    }

    let resume = match state.db.create_resume(
        &stored_name,
        &original_name,
        &path.to_string_lossy(),
        Some(&content),
    ) {
        Ok(resume) => resume,
        Err(e) => return internal_error("Failed to record resume", e),
    };

    audit::admin_action(
        "Upload artifact",
        &admin.user.username,
        &audit::client_ip(&req),
        Some(&format!("Uploaded artifact: {}", original_name)),
    );
    HttpResponse::Ok().json(StoredArtifact {
        success: true,
        message: "Resume uploaded and processed successfully",
        id: resume.id,
        extracted_chars: content.chars().count(),
    })
}

async fn upload_resume_text(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ResumeTextRequest>,
) -> impl Responder {
    let admin = match authorize(&state, &req, RateLimitKind::Upload) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let text = body.resume_text.trim();
    if text.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No text content provided");
    }

    let display_name = text_artifact_name(Local::now());
    let stored_name = unique_resume_name(&display_name);
    let path = resume_path(&state, &stored_name);
    if let Err(e) = std::fs::write(&path, text) {
        return internal_error("Failed to save text artifact", e);
    }

    match state
        .db
        .create_resume(&stored_name, &display_name, &path.to_string_lossy(), Some(text))
    {
        Ok(resume) => {
            audit::admin_action(
                "Upload artifact",
                &admin.user.username,
                &audit::client_ip(&req),
                Some(&format!("Saved text artifact: {}", display_name)),
            );
            HttpResponse::Ok().json(StoredArtifact {
                success: true,
                message: "Text artifact saved successfully",
                id: resume.id,
                extracted_chars: text.chars().count(),
            })
        }
        Err(e) => internal_error("Failed to record text artifact", e),
    }
}

async fn get_resume(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    let resume = match state.db.get_resume(path.into_inner()) {
        Ok(Some(resume)) => resume,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Resume not found"),
        Err(e) => return internal_error("Failed to load resume", e),
    };

    match state.db.get_resume_profile_ids(resume.id) {
        Ok(profile_ids) => HttpResponse::Ok().json(ResumeDetail {
            id: resume.id,
            is_text: resume.is_text(),
            filename: resume.original_filename,
            content: resume.content,
            is_active: resume.is_active,
            profile_ids,
        }),
        Err(e) => internal_error("Failed to load resume profiles", e),
    }
}

async fn update_resume(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateResumeRequest>,
) -> impl Responder {
    let admin = match authorize(&state, &req, RateLimitKind::AdminAction) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    let resume = match state.db.get_resume(path.into_inner()) {
        Ok(Some(resume)) => resume,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Resume not found"),
        Err(e) => return internal_error("Failed to load resume", e),
    };

    let Some(content) = body.content.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "No content provided");
    };
    let filename = body
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty());

    if let Err(e) = state.db.update_resume_content(resume.id, content, filename) {
        return internal_error("Failed to update resume", e);
    }
    let assigned = match state.db.set_resume_profiles(resume.id, &body.profile_ids) {
        Ok(assigned) => assigned,
        Err(e) => return internal_error("Failed to assign resume profiles", e),
    };

    // Binary uploads keep their original file; only text artifacts mirror edits to disk
    if resume.is_text() {
        if let Err(e) = std::fs::write(&resume.file_path, content) {
            log::warn!("Failed to rewrite {}: {}", resume.file_path, e);
        }
    }

    let display_name = filename.unwrap_or(resume.original_filename.as_str());
    audit::admin_action(
        "Update artifact",
        &admin.user.username,
        &audit::client_ip(&req),
        Some(&format!("Updated artifact: {} (Profiles: {})", display_name, assigned)),
    );

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Artifact synced and deployed successfully",
        "id": resume.id
    }))
}

async fn delete_resume(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let admin = match authorize(&state, &req, RateLimitKind::AdminAction) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let id = path.into_inner();

    match state.db.deactivate_resume(id) {
        Ok(true) => {
            audit::admin_action(
                "Delete artifact",
                &admin.user.username,
                &audit::client_ip(&req),
                Some(&format!("Deactivated resume {}", id)),
            );
            HttpResponse::Ok().json(serde_json::json!({ "success": true }))
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Resume not found"),
        Err(e) => internal_error("Failed to delete resume", e),
    }
}
