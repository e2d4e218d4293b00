// WebSocket chat channel at /ws.
// Each connection joins the room of its chat session; replies stream to every
// socket in that room while request errors go back to the sender only.

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{CloseReason, Message};
use futures_util::StreamExt;
use serde::Deserialize;
use std::net::IpAddr;
use url::Url;
use uuid::Uuid;

use crate::chat::{ChatError, IncomingMessage, VisitorInfo};
use crate::config::Config;
use crate::controllers::base_url;
use crate::gateway::protocol::{ClientFrame, SendMessage, ServerEvent};
use crate::models::ChatMode;
use crate::security::{audit, RateLimitKind};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub session_id: Option<String>,
    pub user_identifier: Option<String>,
}

/// Per-connection facts captured at upgrade time
#[derive(Debug, Clone)]
struct Connection {
    session_key: String,
    base_url: String,
    client_ip: String,
    peer_ip: IpAddr,
}

/// Origin whitelist check. A present `Origin` decides alone; without one the
/// origin of `Referer` must be allowed; with neither the socket is refused.
pub fn check_origin(config: &Config, req: &HttpRequest) -> Result<(), String> {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());

    if let Some(origin) = header("Origin") {
        return if config.is_origin_allowed(origin) {
            Ok(())
        } else {
            Err(format!("unauthorized origin: {}", origin))
        };
    }

    if let Some(referer) = header("Referer") {
        let referer_origin = Url::parse(referer)
            .ok()
            .map(|u| u.origin().ascii_serialization());
        return match referer_origin {
            Some(origin) if config.is_origin_allowed(&origin) => Ok(()),
            _ => Err(format!("unauthorized referer: {}", referer)),
        };
    }

    Err("no Origin or Referer header".to_string())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

pub async fn ws_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Payload,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    let ip = audit::client_ip(&req);
    let peer_ip = audit::peer_ip(&req);

    if let Err(reason) = check_origin(&state.config, &req) {
        audit::websocket_rejected(&reason, &ip);
        return Ok(HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Origin not allowed"
        })));
    }

    let session_key =
        non_empty(query.session_id.as_deref()).unwrap_or_else(|| Uuid::new_v4().to_string());
    let user_identifier = non_empty(query.user_identifier.as_deref()).or_else(|| {
        non_empty(
            req.headers()
                .get("X-User-Identifier")
                .and_then(|h| h.to_str().ok()),
        )
    });

    let visitor = VisitorInfo {
        ip_address: peer_ip.to_string(),
        user_agent: Some(audit::user_agent(&req)),
        user_identifier,
    };

    match state.chat.open_session(&session_key, &visitor).await {
        Ok((session, true)) => audit::websocket_session_created(&session.session_id, &ip),
        Ok((_, false)) => {}
        Err(e) => {
            log::error!("Failed to open chat session {}: {}", session_key, e);
            return Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to create chat session"
            })));
        }
    }

    let connection = Connection {
        session_key,
        base_url: base_url(&state.config, &req),
        client_ip: ip,
        peer_ip,
    };

    let (response, session, msg_stream) = actix_ws::handle(&req, payload)?;
    actix_web::rt::spawn(run_connection(state, session, msg_stream, connection));

    Ok(response)
}

async fn run_connection(
    state: web::Data<AppState>,
    mut ws: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
    connection: Connection,
) {
    let (member_id, mut outgoing) = state.rooms.join(&connection.session_key);
    log::debug!(
        "[WS] {} joined room {} (member {})",
        connection.client_ip,
        connection.session_key,
        member_id
    );

    if ws
        .text(ServerEvent::connected(&connection.session_key).to_json())
        .await
        .is_err()
    {
        state.rooms.leave(&connection.session_key, member_id);
        return;
    }

    let close_reason: Option<CloseReason> = loop {
        tokio::select! {
            Some(text) = outgoing.recv() => {
                if ws.text(text).await.is_err() {
                    break None;
                }
            }
            msg = msg_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &connection, &mut ws, &text).await;
                    }
                    Some(Ok(Message::Ping(bytes))) => {
                        if ws.pong(&bytes).await.is_err() {
                            break None;
                        }
                    }
                    Some(Ok(Message::Close(reason))) => break reason,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("[WS] Protocol error from {}: {}", connection.client_ip, e);
                        break None;
                    }
                    None => break None,
                }
            }
        }
    };

    state.rooms.leave(&connection.session_key, member_id);
    let _ = ws.close(close_reason).await;
    log::debug!("[WS] {} left room {}", connection.client_ip, connection.session_key);
}

async fn handle_frame(
    state: &web::Data<AppState>,
    connection: &Connection,
    ws: &mut actix_ws::Session,
    text: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::debug!("[WS] Unparseable frame: {}", e);
            let _ = ws.text(ServerEvent::error("Invalid message format").to_json()).await;
            return;
        }
    };

    match frame.event.as_str() {
        "send_message" => {
            let data: SendMessage = serde_json::from_value(frame.data).unwrap_or_default();
            if data.message.trim().is_empty() {
                return;
            }

            let limit = state.config.rate_limits.chat;
            if state
                .rate_limiter
                .check(RateLimitKind::Chat, connection.peer_ip, limit)
                .is_err()
            {
                audit::rate_limit_exceeded("/ws", RateLimitKind::Chat.as_ref(), &connection.client_ip);
                let _ = ws
                    .text(ServerEvent::error("Rate limit exceeded. Please slow down.").to_json())
                    .await;
                return;
            }

            let incoming = IncomingMessage {
                session_key: non_empty(data.session_id.as_deref())
                    .unwrap_or_else(|| connection.session_key.clone()),
                message: data.message.clone(),
                mode: ChatMode::parse_lenient(data.mode.as_deref()),
                profile_id: data.profile_id(),
                base_url: connection.base_url.clone(),
                client_ip: connection.client_ip.clone(),
            };

            // Generation runs beside the read loop so this socket keeps
            // draining its room while the reply streams.
            let state = state.clone();
            let mut sender = ws.clone();
            actix_web::rt::spawn(async move {
                let rooms = state.rooms.clone();
                let room = incoming.session_key.clone();
                let result = state
                    .chat
                    .send_streaming(&incoming, |event| {
                        rooms.broadcast(&room, &event);
                    })
                    .await;

                let error = match result {
                    Ok(_) => return,
                    Err(ChatError::SessionNotFound) => "Session not found",
                    Err(e) => {
                        log::error!("[WS] Failed to process message for {}: {}", room, e);
                        "Failed to process message"
                    }
                };
                let _ = sender.text(ServerEvent::error(error).to_json()).await;
            });
        }
        "ping" => {
            let _ = ws.text(ServerEvent::pong().to_json()).await;
        }
        other => {
            log::debug!("[WS] Ignoring unknown event '{}'", other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn config() -> Config {
        let dir = tempfile::tempdir().unwrap();
        Config::for_tests(dir.path())
    }

    #[test]
    fn test_origin_whitelist() {
        let config = config();

        let req = TestRequest::default()
            .insert_header(("Origin", "http://localhost:8080"))
            .to_http_request();
        assert!(check_origin(&config, &req).is_ok());

        let req = TestRequest::default()
            .insert_header(("Origin", "http://evil.example"))
            .insert_header(("Referer", "http://localhost:8080/chat"))
            .to_http_request();
        assert!(check_origin(&config, &req).is_err());
    }

    #[test]
    fn test_referer_fallback() {
        let config = config();

        let req = TestRequest::default()
            .insert_header(("Referer", "http://localhost:8080/some/page?x=1"))
            .to_http_request();
        assert!(check_origin(&config, &req).is_ok());

        let req = TestRequest::default()
            .insert_header(("Referer", "https://localhost:8080/"))
            .to_http_request();
        assert!(check_origin(&config, &req).is_err());

        let req = TestRequest::default()
            .insert_header(("Referer", "not a url"))
            .to_http_request();
        assert!(check_origin(&config, &req).is_err());

        assert!(check_origin(&config, &TestRequest::default().to_http_request()).is_err());
    }

    #[actix_web::test]
    async fn test_rejected_origin_gets_403() {
        let dir = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::for_tests(dir.path()));
        let app = actix_web::test::init_service(
            actix_web::App::new()
                .app_data(state.clone())
                .route("/ws", web::get().to(ws_handler)),
        )
        .await;

        let req = TestRequest::get()
            .uri("/ws?session_id=abc")
            .insert_header(("Origin", "http://evil.example"))
            .to_request();
        let resp = actix_web::test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::FORBIDDEN);
        // nothing was created for the refused socket
        assert!(state.db.get_chat_session_by_key("abc").unwrap().is_none());
    }
}
