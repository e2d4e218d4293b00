use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;

use super::{error_response, internal_error};
use crate::middleware::session_auth::require_admin;
use crate::models::{ChatMessage, ChatSession};
use crate::AppState;

const RECENT_SESSIONS: usize = 10;

#[derive(Serialize)]
pub struct DashboardData {
    total_sessions: i64,
    total_messages: i64,
    recent_sessions: Vec<ChatSession>,
}

#[derive(Serialize)]
pub struct SessionDetail {
    session: ChatSession,
    messages: Vec<ChatMessage>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/admin/dashboard").route(web::get().to(get_dashboard)));
    cfg.service(web::resource("/api/admin/analytics").route(web::get().to(get_analytics)));
    cfg.service(web::resource("/api/admin/sessions/{id}").route(web::get().to(get_session)));
}

async fn get_dashboard(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    let totals = state
        .db
        .count_chat_sessions()
        .and_then(|sessions| Ok((sessions, state.db.count_chat_messages()?)));
    let (total_sessions, total_messages) = match totals {
        Ok(totals) => totals,
        Err(e) => return internal_error("Failed to count chat activity", e),
    };

    match state.db.list_chat_sessions(Some(RECENT_SESSIONS)) {
        Ok(recent_sessions) => HttpResponse::Ok().json(DashboardData {
            total_sessions,
            total_messages,
            recent_sessions,
        }),
        Err(e) => internal_error("Failed to list recent sessions", e),
    }
}

async fn get_analytics(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    match state.db.list_chat_sessions(None) {
        Ok(sessions) => HttpResponse::Ok().json(serde_json::json!({ "sessions": sessions })),
        Err(e) => internal_error("Failed to list sessions", e),
    }
}

async fn get_session(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    if let Err(resp) = require_admin(&state, &req) {
        return resp;
    }

    let session = match state.db.get_chat_session(path.into_inner()) {
        Ok(Some(session)) => session,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Session not found"),
        Err(e) => return internal_error("Failed to load session", e),
    };

    match state.db.get_chat_messages(session.id) {
        Ok(messages) => HttpResponse::Ok().json(SessionDetail { session, messages }),
        Err(e) => internal_error("Failed to load messages", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::{admin_token, bearer};
    use crate::models::{MessageRole, NewChatSession};
    use actix_web::{test, App};
    use chrono::Utc;
    use serde_json::Value;

    fn seed(state: &AppState, key: &str, messages: usize) -> ChatSession {
        let session = state
            .db
            .create_chat_session(&NewChatSession {
                session_id: key.to_string(),
                ..Default::default()
            })
            .unwrap();
        for i in 0..messages {
            state
                .db
                .add_chat_message(session.id, MessageRole::User, &format!("msg {}", i), Utc::now())
                .unwrap();
        }
        session
    }

    #[actix_web::test]
    async fn test_dashboard_totals() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let token = admin_token(&state, "root");
        for i in 0..12 {
            seed(&state, &format!("s{}", i), 1);
        }
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri("/api/admin/dashboard")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_sessions"], 12);
        assert_eq!(body["total_messages"], 12);
        assert_eq!(body["recent_sessions"].as_array().unwrap().len(), RECENT_SESSIONS);

        let req = test::TestRequest::get()
            .uri("/api/admin/analytics")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["sessions"].as_array().unwrap().len(), 12);
    }

    #[actix_web::test]
    async fn test_session_detail() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let token = admin_token(&state, "root");
        let session = seed(&state, "detail", 3);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/admin/sessions/{}", session.id))
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["session"]["session_id"], "detail");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["content"], "msg 0");

        let req = test::TestRequest::get()
            .uri("/api/admin/sessions/9999")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
