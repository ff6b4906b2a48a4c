//! Axum extractors and middleware for authentication.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use super::cookie::{TOKEN_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Extract a token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Find the request's token: the `Authorization` header wins over the cookie.
pub fn request_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| get_cookie(headers, TOKEN_COOKIE_NAME).filter(|t| !t.is_empty()))
}

/// Core authentication logic shared by the extractors and the middleware.
async fn authenticate_request<S>(
    headers: &HeaderMap,
    state: &S,
) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = request_token(headers).ok_or(AuthErrorKind::NoToken)?;

    let claims = state.codec().verify_now(token).map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        AuthErrorKind::InvalidToken
    })?;

    let user = state
        .db()
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .map_err(|e| {
            error!("Failed to get user: {}", e);
            AuthErrorKind::Internal
        })?
        .ok_or_else(|| {
            debug!(user = %claims.sub, "Token subject no longer exists");
            AuthErrorKind::UserNotFound
        })?;

    Ok(AuthenticatedUser {
        user_id: user.id,
        user: user.to_public(),
    })
}

/// Extractor for endpoints that require authentication.
/// Reuses the identity attached by [`require_auth`] when that layer ran.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(Auth(user.clone()));
        }

        authenticate_request(&parts.headers, state)
            .await
            .map(Auth)
            .map_err(|kind| ApiAuthError::new(kind, state.secure_cookies()))
    }
}

/// Optional authentication extractor - never fails, returns Option<AuthenticatedUser>.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(OptionalAuth(Some(user.clone())));
        }
        Ok(OptionalAuth(
            authenticate_request(&parts.headers, state).await.ok(),
        ))
    }
}

/// Middleware guarding a whole router. Rejects with 401 or attaches
/// [`AuthenticatedUser`] to the request extensions for downstream handlers.
///
/// ```ignore
/// let todos = Router::new()
///     .route("/", get(list_todos))
///     .layer(middleware::from_fn_with_state(state.clone(), require_auth::<MyState>));
/// ```
pub async fn require_auth<S>(State(state): State<S>, mut request: Request, next: Next) -> Response
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    match authenticate_request(request.headers(), &state).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(kind) => ApiAuthError::new(kind, state.secure_cookies()).into_response(),
    }
}
