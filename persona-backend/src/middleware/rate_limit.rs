// Per-IP request limits applied at the top of handlers

use actix_web::{HttpRequest, HttpResponse};

use crate::security::audit;
use crate::security::RateLimitKind;
use crate::AppState;

/// Count this request against `kind`; the error is a ready 429 response
pub fn enforce(state: &AppState, req: &HttpRequest, kind: RateLimitKind) -> Result<(), HttpResponse> {
    let limit = state.config.rate_limits.get(kind);

    state.rate_limiter.check(kind, audit::peer_ip(req), limit).map_err(|retry_after| {
        audit::rate_limit_exceeded(req.path(), kind.as_ref(), &audit::client_ip(req));
        HttpResponse::TooManyRequests()
            .insert_header(("Retry-After", retry_after.to_string()))
            .json(serde_json::json!({
                "error": "Rate limit exceeded. Please try again later.",
                "retry_after": retry_after
            }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::RateLimit;
    use actix_web::test::TestRequest;
    use std::time::Duration;

    #[test]
    fn test_enforce_returns_429_with_retry_after() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::for_tests(dir.path());
        state.config.rate_limits.login = RateLimit::new(2, Duration::from_secs(60));

        let req = TestRequest::default()
            .peer_addr("203.0.113.9:4000".parse().unwrap())
            .to_http_request();
        assert!(enforce(&state, &req, RateLimitKind::Login).is_ok());
        assert!(enforce(&state, &req, RateLimitKind::Login).is_ok());

        let resp = enforce(&state, &req, RateLimitKind::Login).unwrap_err();
        assert_eq!(resp.status(), actix_web::http::StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key("Retry-After"));

        // other kinds and other peers are counted separately
        assert!(enforce(&state, &req, RateLimitKind::Api).is_ok());
        let other = TestRequest::default()
            .peer_addr("198.51.100.1:4000".parse().unwrap())
            .to_http_request();
        assert!(enforce(&state, &other, RateLimitKind::Login).is_ok());
    }

    #[test]
    fn test_forwarded_for_does_not_reset_login_limit() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());

        let allowed = (0..20)
            .filter(|i| {
                let req = TestRequest::default()
                    .peer_addr("198.51.100.7:4000".parse().unwrap())
                    .insert_header(("X-Forwarded-For", format!("203.0.113.{}", i)))
                    .to_http_request();
                enforce(&state, &req, RateLimitKind::Login).is_ok()
            })
            .count();
        assert_eq!(allowed, 5);
    }
}
