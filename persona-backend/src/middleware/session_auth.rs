// Bearer token authentication for the admin API.
// Handlers call `require_admin` first and return its error response as-is.

use actix_web::{HttpRequest, HttpResponse};

use crate::models::User;
use crate::security::audit;
use crate::AppState;

pub fn extract_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").trim().to_string())
        .filter(|t| !t.is_empty())
}

/// The authenticated admin behind a request
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user: User,
    pub token: String,
}

pub fn require_admin(state: &AppState, req: &HttpRequest) -> Result<AdminUser, HttpResponse> {
    let ip = audit::client_ip(req);

    let token = extract_token(req).ok_or_else(|| {
        audit::unauthorized_access(req.path(), None, &ip);
        HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "No authorization token provided"
        }))
    })?;

    let session = match state.db.validate_session(&token) {
        Ok(Some(session)) => session,
        Ok(None) => {
            audit::unauthorized_access(req.path(), None, &ip);
            return Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Invalid or expired session"
            })));
        }
        Err(e) => {
            log::error!("Session validation error: {}", e);
            return Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            })));
        }
    };

    match state.db.get_user(session.user_id) {
        Ok(Some(user)) if user.is_active => Ok(AdminUser { user, token }),
        Ok(user) => {
            let username = user.as_ref().map(|u| u.username.as_str());
            audit::unauthorized_access(req.path(), username, &ip);
            let _ = state.db.delete_session(&token);
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Account is deactivated"
            })))
        }
        Err(e) => {
            log::error!("Failed to load session user: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_extract_token() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc123"))
            .to_http_request();
        assert_eq!(extract_token(&req).as_deref(), Some("abc123"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer "))
            .to_http_request();
        assert!(extract_token(&req).is_none());

        assert!(extract_token(&TestRequest::default().to_http_request()).is_none());
    }

    #[test]
    fn test_require_admin() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());
        let user = state.db.create_user("boss", None, "hash", false).unwrap();
        let session = state.db.create_session(user.id, 3600).unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", session.token)))
            .to_http_request();
        assert_eq!(require_admin(&state, &req).unwrap().user.username, "boss");

        let mut inactive = user.clone();
        inactive.is_active = false;
        state.db.save_user(&inactive).unwrap();
        assert!(require_admin(&state, &req).is_err());
        // the session was revoked along the way
        assert!(state.db.validate_session(&session.token).unwrap().is_none());

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer nope"))
            .to_http_request();
        assert_eq!(
            require_admin(&state, &req).unwrap_err().status(),
            actix_web::http::StatusCode::UNAUTHORIZED
        );
    }
}
