// Visitor-facing chat history, keyed by the browser's user identifier

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{error_response, internal_error};
use crate::middleware::rate_limit::enforce;
use crate::models::{ChatMessage, MessageRole};
use crate::security::RateLimitKind;
use crate::AppState;

const HISTORY_LIMIT: usize = 50;
const UNTITLED: &str = "New Chat";

#[derive(Deserialize)]
pub struct HistoryQuery {
    user_identifier: Option<String>,
}

#[derive(Serialize)]
pub struct HistoryEntry {
    session_id: String,
    title: String,
    last_activity: DateTime<Utc>,
    message_count: i64,
}

#[derive(Serialize)]
pub struct HistoryMessage {
    role: MessageRole,
    content: String,
    timestamp: DateTime<Utc>,
}

impl From<ChatMessage> for HistoryMessage {
    fn from(m: ChatMessage) -> Self {
        Self {
            role: m.role,
            content: m.content,
            timestamp: m.timestamp,
        }
    }
}

#[derive(Serialize)]
pub struct SessionMessages {
    session_id: String,
    title: Option<String>,
    messages: Vec<HistoryMessage>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/history")
            .route("", web::get().to(list_history))
            .route("/{session_id}/messages", web::get().to(get_messages))
            .route("/{session_id}", web::delete().to(delete_history)),
    );
}

fn identifier(query: &HistoryQuery) -> Option<&str> {
    query
        .user_identifier
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

async fn list_history(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<HistoryQuery>,
) -> impl Responder {
    if let Err(resp) = enforce(&state, &req, RateLimitKind::Api) {
        return resp;
    }

    let Some(user_identifier) = identifier(&query) else {
        return HttpResponse::Ok().json(Vec::<HistoryEntry>::new());
    };

    match state
        .db
        .list_chat_sessions_for_identifier(user_identifier, HISTORY_LIMIT)
    {
        Ok(sessions) => {
            let entries: Vec<HistoryEntry> = sessions
                .into_iter()
                .map(|s| HistoryEntry {
                    title: s.title.filter(|t| !t.is_empty()).unwrap_or_else(|| UNTITLED.to_string()),
                    session_id: s.session_id,
                    last_activity: s.last_activity,
                    message_count: s.message_count,
                })
                .collect();
            HttpResponse::Ok().json(entries)
        }
        Err(e) => internal_error("Failed to load chat history", e),
    }
}

async fn get_messages(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> impl Responder {
    if let Err(resp) = enforce(&state, &req, RateLimitKind::Api) {
        return resp;
    }

    let session = match state.db.get_chat_session_by_key(&path) {
        Ok(Some(session)) => session,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Session not found"),
        Err(e) => return internal_error("Failed to load session", e),
    };

    // Only enforced when both sides carry an identifier
    if let (Some(requested), Some(owner)) = (identifier(&query), session.user_identifier.as_deref()) {
        if requested != owner {
            return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }

    match state.db.get_chat_messages(session.id) {
        Ok(messages) => HttpResponse::Ok().json(SessionMessages {
            session_id: session.session_id,
            title: session.title,
            messages: messages.into_iter().map(HistoryMessage::from).collect(),
        }),
        Err(e) => internal_error("Failed to load messages", e),
    }
}

async fn delete_history(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = enforce(&state, &req, RateLimitKind::Api) {
        return resp;
    }

    let session = match state.db.get_chat_session_by_key(&path) {
        Ok(Some(session)) => session,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Session not found"),
        Err(e) => return internal_error("Failed to load session", e),
    };

    match state.db.delete_chat_session(session.id) {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => internal_error("Failed to delete session", e),
    }
}
