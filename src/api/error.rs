//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

use crate::issuer::{InternalError, LoginError, RegisterError};
use crate::validation::{FieldError, ValidationErrors};

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Validation(ValidationErrors),
    DuplicateEmail { federated_hint: bool },
    Unauthorized(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Internal server error".into())
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Database error".into())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        Self::Validation(e)
    }
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::Validation(v) => Self::Validation(v),
            RegisterError::DuplicateEmail { federated_hint } => {
                Self::DuplicateEmail { federated_hint }
            }
            RegisterError::Internal(e) => Self::from(e),
        }
    }
}

impl From<LoginError> for ApiError {
    fn from(e: LoginError) -> Self {
        match e {
            LoginError::Validation(v) => Self::Validation(v),
            LoginError::InvalidCredentials => Self::unauthorized("Invalid credentials"),
            LoginError::Internal(e) => Self::from(e),
        }
    }
}

/// Unparseable or non-JSON bodies get the same 400 shape as other bad input.
impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        debug!(error = %e, "Rejected request body");
        Self::bad_request("Invalid request body")
    }
}

impl From<InternalError> for ApiError {
    fn from(e: InternalError) -> Self {
        Self::internal("Request failed", e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ValidationResponse {
    error: &'static str,
    errors: Vec<FieldError>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateEmailResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    has_federated_account: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(errors) => {
                let body = ValidationResponse {
                    error: "Validation failed",
                    errors: errors.0,
                };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::DuplicateEmail { federated_hint } => {
                let error = if federated_hint {
                    "An account with this email already exists. Please sign in with Google or use a different email address."
                } else {
                    "User already exists with this email"
                };
                let body = DuplicateEmailResponse {
                    error,
                    has_federated_account: federated_hint,
                };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
