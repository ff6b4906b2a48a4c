mod error;
mod oauth;
mod session;

use axum::Router;
use std::sync::Arc;
use url::Url;

use crate::db::Database;
use crate::issuer::SessionIssuer;
use crate::jwt::TokenCodec;
use crate::oauth::{FederatedLogin, IdentityProvider};
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, ResultExt};
pub use oauth::OAuthState;
pub use session::SessionState;

/// Create the API router. Everything lives under `/auth`.
pub fn create_api_router(
    db: Database,
    codec: Arc<TokenCodec>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    client_url: Url,
    secure_cookies: bool,
    rate_limits: RateLimitConfig,
) -> Router {
    let issuer = SessionIssuer::new(db.clone(), codec.clone());

    let oauth_state = OAuthState {
        login: FederatedLogin::new(db.clone(), issuer.clone(), identity_provider),
        client_url,
        secure_cookies,
        rate_limit: rate_limits.oauth.clone(),
    };

    let session_state = SessionState {
        db,
        codec,
        issuer,
        secure_cookies,
        rate_limits,
    };

    let auth_router = Router::new()
        .merge(session::router(session_state))
        .merge(oauth::router(oauth_state));

    Router::new().nest("/auth", auth_router)
}
