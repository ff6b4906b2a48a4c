use clap::Parser;
use taskgate::cli::{
    Args, build_config, build_identity_provider, init_logging, load_jwt_secret, open_database,
    parse_client_url,
};
use taskgate::run_server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(client_url) = parse_client_url(&args.client_url) else {
        std::process::exit(1);
    };

    let identity_provider = build_identity_provider(&args).unwrap_or_else(|e| {
        error!(error = %e, "Invalid identity provider configuration");
        std::process::exit(1);
    });

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, environment = ?args.environment, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let config = build_config(&args, db, jwt_secret, client_url, identity_provider);
    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
