use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{base_url, error_response, internal_error};
use crate::chat::{ChatError, IncomingMessage, VisitorInfo};
use crate::gateway::protocol::parse_profile_id;
use crate::middleware::rate_limit::enforce;
use crate::models::ChatMode;
use crate::security::{audit, RateLimitKind};
use crate::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    message: String,
    session_id: Option<String>,
    mode: Option<String>,
    #[serde(default)]
    profile_id: serde_json::Value,
    user_identifier: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    session_id: String,
    response: String,
    timestamp: DateTime<Utc>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/chat").route(web::post().to(send_message)));
}

async fn send_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ChatRequest>,
) -> impl Responder {
    if let Err(resp) = enforce(&state, &req, RateLimitKind::Chat) {
        return resp;
    }

    if body.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message cannot be empty");
    }

    let ip = audit::client_ip(&req);
    let session_key = body
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let visitor = VisitorInfo {
        ip_address: audit::peer_ip(&req).to_string(),
        user_agent: Some(audit::user_agent(&req)),
        user_identifier: body
            .user_identifier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from),
    };
    if let Err(e) = state.chat.open_session(&session_key, &visitor).await {
        return internal_error("Failed to open chat session", e);
    }

    let incoming = IncomingMessage {
        session_key: session_key.clone(),
        message: body.message.clone(),
        mode: ChatMode::parse_lenient(body.mode.as_deref()),
        profile_id: parse_profile_id(&body.profile_id),
        base_url: base_url(&state.config, &req),
        client_ip: ip,
    };

    match state.chat.send(&incoming).await {
        Ok(Some(reply)) => HttpResponse::Ok().json(ChatResponse {
            session_id: session_key,
            response: reply.content,
            timestamp: reply.timestamp,
        }),
        Ok(None) => error_response(StatusCode::BAD_REQUEST, "Message cannot be empty"),
        Err(ChatError::SessionNotFound) => error_response(StatusCode::NOT_FOUND, "Session not found"),
        Err(e) => internal_error("Failed to process chat message", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::NO_API_KEY_MESSAGE;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_chat_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({
                "message": "What do you work on?",
                "session_id": "http-session",
                "user_identifier": "visitor-9"
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["session_id"], "http-session");
        assert_eq!(body["response"], NO_API_KEY_MESSAGE);

        let session = state.db.get_chat_session_by_key("http-session").unwrap().unwrap();
        assert_eq!(session.message_count, 2);
        assert_eq!(session.user_identifier.as_deref(), Some("visitor-9"));
        assert_eq!(session.title.as_deref(), Some("What do you work on?"));
    }

    #[actix_web::test]
    async fn test_session_records_peer_address() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .peer_addr("192.168.4.2:51000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "8.8.8.8"))
            .set_json(json!({ "message": "Hi", "session_id": "peer-session" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let session = state.db.get_chat_session_by_key("peer-session").unwrap().unwrap();
        assert_eq!(session.ip_address.as_deref(), Some("192.168.4.2"));
        assert_eq!(session.location.as_deref(), Some("Local Development"));
    }

    #[actix_web::test]
    async fn test_blank_message_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({ "message": "   " }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.db.count_chat_sessions().unwrap(), 0);
    }
}
