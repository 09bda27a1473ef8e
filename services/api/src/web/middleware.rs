//! services/api/src/web/middleware.rs
//!
//! Authentication middleware and role checks for the back-office routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tailordesk_core::{PortError, Role, User};
use tracing::error;

use crate::web::{state::AppState, HandlerError};

pub const SESSION_COOKIE: &str = "session";

/// Pulls the auth session id out of the `Cookie` header.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the auth session cookie and loads the user.
///
/// If valid, inserts the `User` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_session_id = session_id_from_headers(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let user = state
        .auth
        .validate_auth_session(&auth_session_id)
        .await
        .map_err(|e| {
            if !matches!(e, PortError::Unauthorized) {
                error!("Failed to validate auth session: {:?}", e);
            }
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Admits the user when their role is one of `allowed`.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), HandlerError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            format!("The '{}' role cannot use this endpoint", user.role),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            username: "someone".to_string(),
            role,
            partnership_id: None,
            last_login_at: None,
        }
    }

    #[test]
    fn finds_session_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=en"),
        );
        assert_eq!(session_id_from_headers(&headers), Some("abc123"));
    }

    #[test]
    fn missing_or_empty_session_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id_from_headers(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_id_from_headers(&headers), None);
    }

    #[test]
    fn roles_are_checked_against_allow_list() {
        assert!(require_role(&user(Role::Admin), &[Role::Admin, Role::OrderManager]).is_ok());
        let err = require_role(&user(Role::Tailor), &[Role::Admin]).unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }
}
