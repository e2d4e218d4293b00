pub mod artifacts;
pub mod auth;
pub mod chat;
pub mod dashboard;
mod form;
pub mod health;
pub mod history;
pub mod profiles;
pub mod settings;
pub mod uploads;
pub mod users;

use actix_web::{HttpRequest, HttpResponse};

use crate::config::Config;

/// Scheme and host visitors reach us on, for links handed back to them
pub fn base_url(config: &Config, req: &HttpRequest) -> String {
    if let Some(url) = &config.public_base_url {
        return url.clone();
    }
    let info = req.connection_info();
    format!("{}://{}", info.scheme(), info.host())
}

/// Log `cause` and answer 500 with a generic message
pub(crate) fn internal_error(context: &str, cause: impl std::fmt::Display) -> HttpResponse {
    log::error!("{}: {}", context, cause);
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Internal server error"
    }))
}

pub(crate) fn error_response(status: actix_web::http::StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message.into() }))
}
