//! Password session endpoints.
//!
//! - POST `/register` - Create a local account and start a session
//! - POST `/login` - Start a session with email and password
//! - GET `/me` - Current user (requires a token)
//! - POST `/logout` - Clear the token cookie
//! - PUT `/profile` - Update name and/or email (requires a token)

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{Auth, clear_token_cookie, token_cookie};
use crate::db::{Database, PublicUser, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::issuer::{IssuedSession, SessionIssuer};
use crate::jwt::TokenCodec;
use crate::rate_limit::{RateLimitConfig, rate_limit};
use crate::validation;

#[derive(Clone)]
pub struct SessionState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub issuer: SessionIssuer,
    pub secure_cookies: bool,
    pub rate_limits: RateLimitConfig,
}

impl_has_auth_backend!(SessionState);

pub fn router(state: SessionState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .layer(middleware::from_fn_with_state(
            state.rate_limits.register.clone(),
            rate_limit,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .layer(middleware::from_fn_with_state(
            state.rate_limits.login.clone(),
            rate_limit,
        ));

    Router::new()
        .route("/me", get(me))
        .route("/logout", post(logout))
        .route("/profile", put(update_profile))
        .merge(register_router)
        .merge(login_router)
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct ProfileRequest {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Serialize)]
struct SessionResponse {
    message: &'static str,
    user: PublicUser,
    token: String,
}

#[derive(Serialize)]
struct UserResponse {
    user: PublicUser,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct ProfileResponse {
    message: &'static str,
    user: PublicUser,
}

/// The same token goes into the cookie and the body.
fn session_response(
    status: StatusCode,
    message: &'static str,
    session: IssuedSession,
    secure_cookies: bool,
) -> impl IntoResponse {
    let cookie = token_cookie(&session.token, session.max_age, secure_cookies);
    (
        status,
        [(SET_COOKIE, cookie)],
        Json(SessionResponse {
            message,
            user: session.user,
            token: session.token,
        }),
    )
}

async fn register(
    State(state): State<SessionState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let session = state
        .issuer
        .register(&payload.name, &payload.email, &payload.password)
        .await?;

    Ok(session_response(
        StatusCode::CREATED,
        "User registered successfully",
        session,
        state.secure_cookies,
    ))
}

async fn login(
    State(state): State<SessionState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let session = state.issuer.login(&payload.email, &payload.password).await?;

    Ok(session_response(
        StatusCode::OK,
        "Login successful",
        session,
        state.secure_cookies,
    ))
}

async fn me(Auth(auth): Auth) -> Json<UserResponse> {
    Json(UserResponse { user: auth.user })
}

/// Logging out only forgets the cookie; there is no server-side session.
async fn logout(State(state): State<SessionState>) -> impl IntoResponse {
    (
        [(SET_COOKIE, clear_token_cookie(state.secure_cookies))],
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
}

async fn update_profile(
    State(state): State<SessionState>,
    Auth(auth): Auth,
    payload: Result<Json<ProfileRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let changes = validation::validate_profile(payload.name.as_deref(), payload.email.as_deref())?;
    let users = state.db.users();

    if let Some(email) = &changes.email {
        let taken = users
            .is_email_taken_by_other(email, auth.user_id)
            .await
            .db_err("Failed to check email")?;
        if taken {
            return Err(ApiError::bad_request("Email is already taken"));
        }
    }

    match users
        .update_profile(auth.user_id, changes.name.as_deref(), changes.email.as_deref())
        .await
    {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::bad_request("Email is already taken"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to update profile", e)),
    }

    let user = users
        .get_by_id(auth.user_id)
        .await
        .db_err("Failed to reload user")?
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    info!(user = %user.uuid, "Profile updated");
    Ok(Json(ProfileResponse {
        message: "Profile updated successfully",
        user: user.to_public(),
    }))
}
