//! Security event log
//!
//! Everything here logs under the `security` target so deployments can route
//! or filter it separately (`RUST_LOG=security=info`).

use actix_web::HttpRequest;
use std::net::{IpAddr, Ipv4Addr};

const TARGET: &str = "security";

/// Address of the connected peer. Rate limits and stored sessions use this;
/// unlike `X-Forwarded-For` the caller cannot choose it.
pub fn peer_ip(req: &HttpRequest) -> IpAddr {
    req.peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Client IP for log lines: first `X-Forwarded-For` hop, else the peer address
pub fn client_ip(req: &HttpRequest) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn user_agent(req: &HttpRequest) -> String {
    req.headers()
        .get("User-Agent")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("Unknown")
        .to_string()
}

pub fn failed_login(username: &str, reason: &str, ip: &str, user_agent: &str) {
    log::warn!(
        target: TARGET,
        "Failed login attempt - Username: {}, IP: {}, Reason: {}, User-Agent: {}",
        username, ip, reason, user_agent
    );
}

pub fn successful_login(username: &str, ip: &str, user_agent: &str) {
    log::info!(
        target: TARGET,
        "Successful login - Username: {}, IP: {}, User-Agent: {}",
        username, ip, user_agent
    );
}

pub fn account_locked(username: &str, ip: &str) {
    log::warn!(
        target: TARGET,
        "Account locked due to failed login attempts - Username: {}, IP: {}",
        username, ip
    );
}

pub fn password_change(username: &str, changed_by: Option<&str>, ip: &str) {
    match changed_by {
        Some(by) if by != username => log::info!(
            target: TARGET,
            "Password changed - Username: {}, Changed by: {}, IP: {}",
            username, by, ip
        ),
        _ => log::info!(target: TARGET, "Password changed - Username: {}, IP: {}", username, ip),
    }
}

pub fn user_created(username: &str, created_by: &str, ip: &str) {
    log::info!(
        target: TARGET,
        "User created - Username: {}, Created by: {}, IP: {}",
        username, created_by, ip
    );
}

pub fn user_deleted(username: &str, deleted_by: &str, ip: &str) {
    log::warn!(
        target: TARGET,
        "User deleted - Username: {}, Deleted by: {}, IP: {}",
        username, deleted_by, ip
    );
}

pub fn user_updated(username: &str, updated_by: &str, fields_changed: &[&str], ip: &str) {
    log::info!(
        target: TARGET,
        "User updated - Username: {}, Updated by: {}, Fields: {}, IP: {}",
        username,
        updated_by,
        fields_changed.join(", "),
        ip
    );
}

pub fn unauthorized_access(endpoint: &str, username: Option<&str>, ip: &str) {
    log::warn!(
        target: TARGET,
        "Unauthorized access attempt - Endpoint: {}, {}, IP: {}",
        endpoint,
        username.map(|u| format!("Username: {}", u)).unwrap_or_else(|| "Anonymous".to_string()),
        ip
    );
}

pub fn rate_limit_exceeded(endpoint: &str, identifier: &str, ip: &str) {
    log::warn!(
        target: TARGET,
        "Rate limit exceeded - Endpoint: {}, Identifier: {}, IP: {}",
        endpoint, identifier, ip
    );
}

pub fn suspicious_activity(description: &str, username: Option<&str>, ip: &str) {
    log::warn!(
        target: TARGET,
        "Suspicious activity - {}, {}, IP: {}",
        description,
        username.map(|u| format!("Username: {}", u)).unwrap_or_else(|| "Anonymous".to_string()),
        ip
    );
}

pub fn admin_action(action: &str, username: &str, ip: &str, details: Option<&str>) {
    log::info!(
        target: TARGET,
        "Admin action - Action: {}, User: {}, IP: {}{}",
        action,
        username,
        ip,
        details.map(|d| format!(", Details: {}", d)).unwrap_or_default()
    );
}

pub fn websocket_rejected(reason: &str, ip: &str) {
    log::warn!(target: TARGET, "Rejected WebSocket connection - {}, IP: {}", reason, ip);
}

pub fn websocket_session_created(session_id: &str, ip: &str) {
    log::info!(
        target: TARGET,
        "New WebSocket session created - Session: {}, IP: {}",
        session_id, ip
    );
}
