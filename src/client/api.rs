//! HTTP calls the client makes to the auth endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::db::PublicUser;

/// Upper bound for one auth call, connect included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiCallError {
    /// 401: the token (or the credentials) were refused.
    #[error("not authenticated")]
    Unauthorized,
    /// Any other non-success answer.
    #[error("request rejected with {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ApiCallError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Body of a successful register or login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionPayload {
    pub user: PublicUser,
    pub token: String,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn current_user(&self, token: &str) -> Result<PublicUser, ApiCallError>;
    async fn login(&self, email: &str, password: &str) -> Result<SessionPayload, ApiCallError>;
    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionPayload, ApiCallError>;
    async fn logout(&self) -> Result<(), ApiCallError>;
}

/// [`AuthApi`] over HTTP against `<server>/api/auth/`.
#[derive(Clone)]
pub struct HttpAuthApi {
    base: Url,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct UserResponse {
    user: PublicUser,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

impl HttpAuthApi {
    /// `base` is the auth API root, e.g. `http://localhost:5000/api/auth`.
    pub fn new(mut base: Url) -> Result<Self, ApiCallError> {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { base, http })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiCallError> {
        self.base
            .join(path)
            .map_err(|e| ApiCallError::Transport(e.to_string()))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiCallError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiCallError::Unauthorized);
        }
        let message = resp
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_default();
        Err(ApiCallError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn current_user(&self, token: &str) -> Result<PublicUser, ApiCallError> {
        let resp = self
            .http
            .get(self.endpoint("me")?)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json::<UserResponse>().await?.user)
    }

    async fn login(&self, email: &str, password: &str) -> Result<SessionPayload, ApiCallError> {
        let resp = self
            .http
            .post(self.endpoint("login")?)
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionPayload, ApiCallError> {
        let resp = self
            .http
            .post(self.endpoint("register")?)
            .json(&RegisterRequest {
                name,
                email,
                password,
            })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn logout(&self) -> Result<(), ApiCallError> {
        let resp = self.http.post(self.endpoint("logout")?).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}
