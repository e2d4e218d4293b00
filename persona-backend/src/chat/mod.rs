//! Visitor message flow shared by the websocket channel and `POST /api/chat`:
//! store the visitor message, generate the persona reply, persist it and
//! title the session.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;

use crate::db::Database;
use crate::gateway::protocol::ServerEvent;
use crate::geo::GeoLocator;
use crate::models::{ChatMessage, ChatMode, ChatSession, MessageRole, NewChatSession};
use crate::persona::{Persona, PersonaRequest};

const TITLE_MAX_CHARS: usize = 50;

/// A visitor message as received from any transport
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub session_key: String,
    pub message: String,
    pub mode: ChatMode,
    pub profile_id: Option<i64>,
    pub base_url: String,
    pub client_ip: String,
}

/// Connection details recorded when a session is first seen
#[derive(Debug, Clone, Default)]
pub struct VisitorInfo {
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub user_identifier: Option<String>,
}

#[derive(Debug)]
pub enum ChatError {
    SessionNotFound,
    Database(rusqlite::Error),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::SessionNotFound => write!(f, "Session not found"),
            ChatError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(e: rusqlite::Error) -> Self {
        ChatError::Database(e)
    }
}

/// Title derived from the first visitor message
pub fn session_title(message: &str) -> String {
    if message.chars().count() > TITLE_MAX_CHARS {
        let head: String = message.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        message.to_string()
    }
}

pub struct ChatService {
    db: Arc<Database>,
    persona: Arc<Persona>,
    geo: GeoLocator,
}

impl ChatService {
    pub fn new(db: Arc<Database>, persona: Arc<Persona>, geo: GeoLocator) -> Self {
        Self { db, persona, geo }
    }

    /// Get the session for `session_key`, creating it (with a location lookup) when new
    pub async fn open_session(
        &self,
        session_key: &str,
        visitor: &VisitorInfo,
    ) -> Result<(ChatSession, bool), ChatError> {
        if let Some(session) = self.db.get_chat_session_by_key(session_key)? {
            return Ok((session, false));
        }

        let location = self.geo.locate(&visitor.ip_address).await;
        let session = self.db.create_chat_session(&NewChatSession {
            session_id: session_key.to_string(),
            ip_address: Some(visitor.ip_address.clone()),
            location: Some(location),
            user_agent: visitor.user_agent.clone(),
            user_identifier: visitor.user_identifier.clone(),
        })?;
        Ok((session, true))
    }

    /// Streaming flow. `emit` receives every event for the session's room.
    /// Blank messages are ignored and return `Ok(None)`.
    pub async fn send_streaming<F>(
        &self,
        incoming: &IncomingMessage,
        emit: F,
    ) -> Result<Option<ChatMessage>, ChatError>
    where
        F: Fn(ServerEvent),
    {
        let Some((session, user_msg)) = self.store_visitor_message(incoming)? else {
            return Ok(None);
        };

        emit(ServerEvent::message(MessageRole::User, &user_msg.content, user_msg.timestamp));
        emit(ServerEvent::typing(true));

        let started = Utc::now();
        emit(ServerEvent::message_start(started));

        let request = self.persona_request(incoming, &session, &user_msg);
        let mut chunks = self.persona.respond_stream(&request).await;
        let mut full_response = String::new();
        while let Some(chunk) = chunks.next().await {
            if chunk.is_empty() {
                continue;
            }
            full_response.push_str(&chunk);
            emit(ServerEvent::message_chunk(&chunk));
        }

        emit(ServerEvent::message_end());
        emit(ServerEvent::typing(false));

        self.finish(&session, &incoming.message, &full_response, started)
            .map(Some)
    }

    /// One-shot flow for plain HTTP clients
    pub async fn send(&self, incoming: &IncomingMessage) -> Result<Option<ChatMessage>, ChatError> {
        let Some((session, user_msg)) = self.store_visitor_message(incoming)? else {
            return Ok(None);
        };

        let started = Utc::now();
        let request = self.persona_request(incoming, &session, &user_msg);
        let reply = self.persona.respond(&request).await;

        self.finish(&session, &incoming.message, &reply, started)
            .map(Some)
    }

    fn store_visitor_message(
        &self,
        incoming: &IncomingMessage,
    ) -> Result<Option<(ChatSession, ChatMessage)>, ChatError> {
        let message = incoming.message.trim();
        if message.is_empty() {
            return Ok(None);
        }

        let session = self
            .db
            .get_chat_session_by_key(&incoming.session_key)?
            .ok_or(ChatError::SessionNotFound)?;

        let user_msg = self
            .db
            .add_chat_message(session.id, MessageRole::User, message, Utc::now())?;
        Ok(Some((session, user_msg)))
    }

    fn persona_request(
        &self,
        incoming: &IncomingMessage,
        session: &ChatSession,
        user_msg: &ChatMessage,
    ) -> PersonaRequest {
        PersonaRequest {
            session_key: session.session_id.clone(),
            chat_session_id: Some(session.id),
            history_through: user_msg.id,
            message: user_msg.content.clone(),
            mode: incoming.mode,
            profile_id: incoming.profile_id,
            base_url: incoming.base_url.clone(),
            client_ip: incoming.client_ip.clone(),
        }
    }

    fn finish(
        &self,
        session: &ChatSession,
        visitor_message: &str,
        reply: &str,
        started: chrono::DateTime<Utc>,
    ) -> Result<ChatMessage, ChatError> {
        let bot_msg = self
            .db
            .add_chat_message(session.id, MessageRole::Assistant, reply, started)?;

        // Title sessions from their opening message
        let updated = self.db.get_chat_session(session.id)?;
        if let Some(updated) = updated {
            if updated.message_count <= 2 && updated.title.as_deref().unwrap_or("").is_empty() {
                self.db
                    .set_chat_session_title_if_missing(session.id, &session_title(visitor_message.trim()))?;
            }
        }

        Ok(bot_msg)
    }
}
