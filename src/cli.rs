//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::DEFAULT_TOKEN_LIFETIME_SECS;
use crate::oauth::{GoogleProvider, IdentityProvider};
use axum::http::HeaderName;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Deployment environment. Production turns on `Secure` cookies.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Taskgate",
    about = "Authentication service for the task tracker"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "taskgate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Token lifetime in days (1 to 7)
    #[arg(long, default_value = "7", value_parser = clap::value_parser!(u64).range(1..=7))]
    pub token_lifetime_days: u64,

    /// Front end base URL, used for the federated login redirects
    #[arg(long, env = "CLIENT_URL", default_value = "http://localhost:3000")]
    pub client_url: String,

    /// Deployment environment
    #[arg(long, env = "APP_ENV", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Google OAuth client id. Federated login is disabled without it
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// Google OAuth client secret
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,

    /// Callback URL registered with the provider
    #[arg(
        long,
        env = "OAUTH_CALLBACK_URL",
        default_value = "http://localhost:5000/api/auth/oauth/callback"
    )]
    pub oauth_callback_url: String,

    /// Header carrying the client IP when running behind a proxy (e.g. x-forwarded-for)
    #[arg(long, value_parser = parse_ip_header)]
    pub ip_header: Option<HeaderName>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn parse_ip_header(s: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(s.trim().to_ascii_lowercase().as_bytes())
        .map_err(|_| format!("Invalid header name: {}", s))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // SAFETY: single-threaded startup, nothing else reads this variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    check_secret_length(secret)
}

fn check_secret_length(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Parse the front end URL. Returns None and logs an error if it is invalid.
pub fn parse_client_url(client_url: &str) -> Option<Url> {
    match Url::parse(client_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(_) => {
            error!(url = %client_url, "client-url must be an http(s) URL");
            None
        }
        Err(e) => {
            error!(url = %client_url, error = %e, "Invalid client-url");
            None
        }
    }
}

/// Build the identity provider from the Google settings, if any.
/// `Ok(None)` means federated login is disabled.
pub fn build_identity_provider(
    args: &Args,
) -> Result<Option<Arc<dyn IdentityProvider>>, String> {
    let (Some(client_id), Some(client_secret)) =
        (args.google_client_id.clone(), args.google_client_secret.clone())
    else {
        if args.google_client_id.is_some() || args.google_client_secret.is_some() {
            return Err(
                "Both --google-client-id and --google-client-secret are required".to_string(),
            );
        }
        warn!("Google OAuth is not configured, federated login is disabled");
        return Ok(None);
    };

    let callback = Url::parse(&args.oauth_callback_url)
        .map_err(|e| format!("Invalid oauth-callback-url: {}", e))?;
    let provider: Arc<dyn IdentityProvider> = Arc::new(
        GoogleProvider::new(client_id, client_secret, callback)
            .map_err(|e| format!("Failed to set up Google provider: {}", e))?,
    );

    Ok(Some(provider))
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    jwt_secret: String,
    client_url: Url,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
) -> ServerConfig {
    let secure_cookies = args.environment == Environment::Production;
    if !secure_cookies && client_url.scheme() == "https" {
        warn!("Serving an https client without --environment production; cookies are not Secure");
    }

    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        token_lifetime: token_lifetime_secs(args.token_lifetime_days),
        secure_cookies,
        client_url,
        identity_provider,
        ip_header: args.ip_header.clone(),
    }
}

fn token_lifetime_secs(days: u64) -> u64 {
    (days * SECS_PER_DAY).min(DEFAULT_TOKEN_LIFETIME_SECS)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
