//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for login, logout and staff account creation.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tailordesk_core::ports::{AuthStore, PortError, PortResult};
use tailordesk_core::{AuthSession, Role, User};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::BootstrapAdmin;
use crate::web::{
    middleware::{require_role, session_id_from_headers, SESSION_COOKIE},
    parse_field, port_error,
    state::AppState,
    HandlerError,
};

pub const MIN_PASSWORD_LEN: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    /// One of `admin`, `order_manager`, `tailor`. Partner logins are generated per partnership.
    pub role: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
    pub partnership_id: Option<Uuid>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            role: user.role.to_string(),
            partnership_id: user.partnership_id,
            last_login_at: user.last_login_at,
        }
    }
}

//=========================================================================================
// Password Hashing
//=========================================================================================

pub fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortError::Unexpected(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hashed: &str) -> PortResult<bool> {
    let parsed_hash = PasswordHash::new(hashed)
        .map_err(|e| PortError::Unexpected(format!("Failed to parse password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn session_cookie(session_id: &str, max_age: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        max_age.num_seconds()
    )
}

/// Creates the configured administrator when the user table is empty.
pub async fn bootstrap_admin(auth: &dyn AuthStore, admin: &BootstrapAdmin) -> PortResult<()> {
    if auth.count_users().await? > 0 {
        return Ok(());
    }
    let hashed = hash_password(&admin.password)?;
    let user = auth
        .create_user(&admin.username, &hashed, Role::Admin, None)
        .await?;
    info!("Created bootstrap administrator '{}'", user.username);
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = UserResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let invalid = || (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string());

    // 1. Get user by username
    let creds = match state.auth.get_user_by_username(req.username.trim()).await {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => return Err(invalid()),
        Err(e) => return Err(port_error("Failed to log in", e)),
    };

    // 2. Verify password
    let valid = verify_password(&req.password, &creds.hashed_password)
        .map_err(|e| port_error("Authentication error", e))?;
    if !valid {
        return Err(invalid());
    }

    // 3. Create auth session
    let lifetime = Duration::days(state.config.session_days);
    let session = AuthSession {
        id: Uuid::new_v4().to_string(),
        user_id: creds.user.id,
        expires_at: Utc::now() + lifetime,
    };
    state
        .auth
        .create_auth_session(&session)
        .await
        .map_err(|e| port_error("Failed to create session", e))?;

    // 4. Recording the login time is best effort.
    if let Err(e) = state.auth.touch_last_login(creds.user.id, Utc::now()).await {
        warn!("Failed to update last login for {}: {}", creds.user.id, e);
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&session.id, lifetime))],
        Json(UserResponse::from(creds.user)),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let auth_session_id = session_id_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .auth
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
        })?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", Duration::zero()))],
    ))
}

/// GET /auth/me - The signed-in user
#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, description = "Current user", body = UserResponse))
)]
pub async fn me_handler(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// POST /admin/users - Create a staff account
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 409, description = "Username taken")
    )
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<User>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_role(&caller, &[Role::Admin])?;

    let role: Role = parse_field("role", &req.role)?;
    if role == Role::Partner {
        return Err((
            StatusCode::BAD_REQUEST,
            "Partner logins are generated from the partnership".to_string(),
        ));
    }
    let username = req.username.trim();
    if username.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "username must not be empty".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }

    let hashed = hash_password(&req.password).map_err(|e| port_error("Failed to hash password", e))?;
    let user = state
        .auth
        .create_user(username, &hashed, role, None)
        .await
        .map_err(|e| port_error("Failed to create user", e))?;
    info!(created_by = %caller.id, username = %user.username, role = %user.role, "Created staff user");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}
