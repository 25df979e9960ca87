//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout. The actual
//! credential handling lives in the `AuthService` adapter; these handlers
//! translate between HTTP (JSON bodies, session cookies) and the port.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;
use inventory_core::ports::PortError;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

fn session_cookie(token: &str, ttl: Duration) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        token,
        ttl.num_seconds()
    )
}

fn auth_error(context: &str, err: PortError) -> (StatusCode, String) {
    let status = match &err {
        PortError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        PortError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        _ => {
            error!("{}: {}", context, err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{} failed", context),
            );
        }
    };
    (status, err.to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new account and log it in
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid email, password, or duplicate account"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state
        .auth
        .sign_up(&req.email, &req.password)
        .await
        .map_err(|e| auth_error("signup", e))?;

    // A fresh account is immediately usable; log it in for a cookie.
    let token = state
        .auth
        .log_in(&req.email, &req.password)
        .await
        .map_err(|e| auth_error("signup login", e))?;

    let ttl = Duration::days(state.config.session_ttl_days);
    let response = AuthResponse {
        user_id: user.user_id,
        email: user.email.unwrap_or_default(),
    };
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&token, ttl))],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = state
        .auth
        .log_in(&req.email, &req.password)
        .await
        .map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            )
        })?;

    let user = state
        .auth
        .resolve_session(&token)
        .await
        .map_err(|e| auth_error("login", e))?;

    let ttl = Duration::days(state.config.session_ttl_days);
    let response = AuthResponse {
        user_id: user.user_id,
        email: user.email.unwrap_or_default(),
    };
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&token, ttl))],
        Json(response),
    ))
}

/// POST /auth/logout - Logout and invalidate the session
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
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    let session_token = cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .auth
        .log_out(session_token)
        .await
        .map_err(|e| auth_error("logout", e))?;

    // Clear the cookie.
    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}
