//! External identity providers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Upper bound for each call to the provider.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Scopes requested from the provider.
pub const SCOPES: &str = "openid profile email";

/// Identity asserted by the provider after a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    /// Stable account identifier at the provider
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("provider profile is missing {0}")]
    MissingField(&'static str),
    #[error("invalid provider endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// An OAuth 2.0 authorization-code provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// URL the browser is sent to, carrying `state` for CSRF protection.
    fn authorization_url(&self, state: &str) -> Url;

    /// Exchange the callback's authorization code for the user's identity.
    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, ProviderError>;
}

/// Google OpenID Connect provider.
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: Url,
    auth_endpoint: Url,
    token_endpoint: Url,
    userinfo_endpoint: Url,
    http: reqwest::Client,
}

/// Provider URLs for the authorization, token and userinfo steps.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth: Url,
    pub token: Url,
    pub userinfo: Url,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: Option<String>,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: Url,
    ) -> Result<Self, ProviderError> {
        Self::with_endpoints(
            client_id,
            client_secret,
            redirect_uri,
            Endpoints {
                auth: Url::parse(GOOGLE_AUTH_ENDPOINT)?,
                token: Url::parse(GOOGLE_TOKEN_ENDPOINT)?,
                userinfo: Url::parse(GOOGLE_USERINFO_ENDPOINT)?,
            },
        )
    }

    /// Same protocol against other endpoints (a local stand-in, a proxy).
    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        redirect_uri: Url,
        endpoints: Endpoints,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            auth_endpoint: endpoints.auth,
            token_endpoint: endpoints.token,
            userinfo_endpoint: endpoints.userinfo,
            http,
        })
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String, ProviderError> {
        let resp = self
            .http
            .post(self.token_endpoint.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        Ok(resp.json::<TokenResponse>().await?.access_token)
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.auth_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, ProviderError> {
        let access_token = self.fetch_access_token(code).await?;

        let resp = self
            .http
            .get(self.userinfo_endpoint.clone())
            .bearer_auth(&access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let info: UserInfo = resp.json().await?;
        Ok(ProviderIdentity {
            subject: info.sub.ok_or(ProviderError::MissingField("sub"))?,
            email: info.email.ok_or(ProviderError::MissingField("email"))?,
            email_verified: info.email_verified,
            name: info.name,
            picture: info.picture,
        })
    }
}
