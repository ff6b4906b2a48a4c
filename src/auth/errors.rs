//! Authentication error types.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::cookie::clear_token_cookie;

/// Why a request failed authentication. Only used internally and in logs;
/// clients see the same 401 for every credential failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NoToken,
    InvalidToken,
    UserNotFound,
    Internal,
}

/// API authentication error (returns JSON and clears the token cookie).
#[derive(Debug)]
pub struct ApiAuthError {
    pub kind: AuthErrorKind,
    secure_cookies: bool,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind, secure_cookies: bool) -> Self {
        Self {
            kind,
            secure_cookies,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NoToken | AuthErrorKind::InvalidToken | AuthErrorKind::UserNotFound => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NoToken | AuthErrorKind::InvalidToken | AuthErrorKind::UserNotFound => {
                "Not authenticated"
            }
            AuthErrorKind::Internal => "Internal server error",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use axum::http::HeaderValue;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if self.kind != AuthErrorKind::Internal {
            if let Ok(value) = HeaderValue::from_str(&clear_token_cookie(self.secure_cookies)) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }

        response
    }
}
