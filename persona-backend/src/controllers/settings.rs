use actix_multipart::Multipart;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;

use super::form::read_form;
use super::{error_response, internal_error};
use crate::config::ALLOWED_ICON_EXTENSIONS;
use crate::documents::{allowed_file, secure_filename, unique_icon_name};
use crate::middleware::rate_limit::enforce;
use crate::middleware::session_auth::require_admin;
use crate::security::{audit, RateLimitKind};
use crate::AppState;

/// What the chat page needs to render the persona
#[derive(Serialize)]
pub struct PublicSettings {
    chatbot_name: String,
    chatbot_icon: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/settings").route(web::get().to(get_public_settings)));
    cfg.service(
        web::resource("/api/admin/settings")
            .route(web::get().to(get_settings))
            .route(web::post().to(update_settings)),
    );
}

async fn get_public_settings(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = enforce(&state, &req, RateLimitKind::Api) {
        return resp;
    }

    match state.db.get_settings() {
        Ok(settings) => HttpResponse::Ok().json(PublicSettings {
            chatbot_name: settings.chatbot_name,
            chatbot_icon: settings.chatbot_icon,
        }),
        Err(e) => internal_error("Failed to load settings", e),
    }
}

async fn get_settings(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    match state.db.get_settings() {
        Ok(settings) => HttpResponse::Ok().json(settings),
        Err(e) => internal_error("Failed to load settings", e),
    }
}

async fn update_settings(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> impl Responder {
    let admin = match require_admin(&state, &req) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    if let Err(resp) = enforce(&state, &req, RateLimitKind::AdminAction) {
        return resp;
    }

    let form = match read_form(payload, state.config.max_content_length).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };

    let current = match state.db.get_settings() {
        Ok(settings) => settings,
        Err(e) => return internal_error("Failed to load settings", e),
    };

    let chatbot_name = form
        .text("chatbot_name")
        .map(str::trim)
        .unwrap_or(current.chatbot_name.as_str());
    if chatbot_name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Chatbot name is required");
    }
    let personality_prompt = form
        .text("personality_prompt")
        .unwrap_or(current.personality_prompt.as_str());

    let icon_path = match form.file("chatbot_icon") {
        Some(icon) => {
            if !allowed_file(&icon.filename, ALLOWED_ICON_EXTENSIONS) {
                return error_response(StatusCode::BAD_REQUEST, "Invalid icon file type");
            }
            let stored_name = unique_icon_name(&secure_filename(&icon.filename));
            let target = state.config.icons_folder().join(&stored_name);
            if let Err(e) = std::fs::write(&target, &icon.data) {
                return internal_error("Failed to save chatbot icon", e);
            }
            Some(format!("/uploads/icons/{}", stored_name))
        }
        None => None,
    };

    match state
        .db
        .update_settings(chatbot_name, personality_prompt, icon_path.as_deref())
    {
        Ok(settings) => {
            audit::admin_action(
                "Update settings",
                &admin.user.username,
                &audit::client_ip(&req),
                icon_path.as_deref().map(|_| "chatbot icon replaced"),
            );
            HttpResponse::Ok().json(settings)
        }
        Err(e) => internal_error("Failed to save settings", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::initialize_upload_dirs;
    use crate::controllers::form::test_body::{multipart, Part};
    use crate::controllers::test_support::{admin_token, bearer};
    use actix_web::{test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn test_public_settings_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/settings").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["chatbot_name"], "AI Assistant");
        assert_eq!(body["chatbot_icon"], "default-bot-icon.svg");
        assert!(body.get("personality_prompt").is_none());
    }

    #[actix_web::test]
    async fn test_update_with_icon() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        initialize_upload_dirs(&state.config).unwrap();
        let token = admin_token(&state, "root");
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let (content_type, body) = multipart(&[
            Part::Text("chatbot_name", "Ada"),
            Part::Text("personality_prompt", "Warm and precise."),
            Part::File("chatbot_icon", "my bot.png", b"\x89PNG"),
        ]);
        let req = test::TestRequest::post()
            .uri("/api/admin/settings")
            .insert_header(bearer(&token))
            .insert_header(content_type)
            .set_payload(body)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["chatbot_name"], "Ada");

        let icon = body["chatbot_icon"].as_str().unwrap();
        assert!(icon.starts_with("/uploads/icons/"));
        assert!(icon.ends_with("_my_bot.png"));
        let stored = icon.trim_start_matches("/uploads/icons/");
        assert!(state.config.icons_folder().join(stored).is_file());

        // a second update without an icon keeps the stored one
        let (content_type, body) = multipart(&[Part::Text("chatbot_name", "Ada Two")]);
        let req = test::TestRequest::post()
            .uri("/api/admin/settings")
            .insert_header(bearer(&token))
            .insert_header(content_type)
            .set_payload(body)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["chatbot_icon"], icon);
        assert_eq!(body["personality_prompt"], "Warm and precise.");
    }

    #[actix_web::test]
    async fn test_rejects_bad_icon_type() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        initialize_upload_dirs(&state.config).unwrap();
        let token = admin_token(&state, "root");
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let (content_type, body) = multipart(&[
            Part::Text("chatbot_name", "Ada"),
            Part::File("chatbot_icon", "payload.html", b"<html>"),
        ]);
        let req = test::TestRequest::post()
            .uri("/api/admin/settings")
            .insert_header(bearer(&token))
            .insert_header(content_type)
            .set_payload(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
