pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod db;
pub mod issuer;
pub mod jwt;
pub mod oauth;
pub mod password;
pub mod rate_limit;
pub mod validation;

use api::create_api_router;
use axum::{Router, http::HeaderName};
use db::Database;
use jwt::TokenCodec;
use oauth::IdentityProvider;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Token lifetime in seconds
    pub token_lifetime: u64,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Front end base URL for federated login redirects
    pub client_url: Url,
    /// External identity provider; federated login is disabled when `None`
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
    /// Header carrying the client IP (requires running behind a proxy)
    pub ip_header: Option<HeaderName>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    password::warm_up();

    let codec = Arc::new(TokenCodec::with_lifetime(
        &config.jwt_secret,
        config.token_lifetime,
    ));

    let api_router = create_api_router(
        config.db.clone(),
        codec,
        config.identity_provider.clone(),
        config.client_url.clone(),
        config.secure_cookies,
        RateLimitConfig::new(config.ip_header.clone()),
    );

    Router::new().nest("/api", api_router)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
