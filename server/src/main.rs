//! Galaxy Server - Main entry point.
//!
//! This binary starts the booking API with:
//! - Structured JSON logging
//! - A single document store connection shared by all handlers
//! - Graceful shutdown handling (SIGTERM/SIGINT) that closes the store
//!
//! # Configuration
//!
//! See [`galaxy_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Local development against the in-memory store
//! GALAXY_STORE=memory ACCESS_TOKEN_SECRET=dev-secret cargo run --bin galaxy-server
//!
//! # Production
//! DB_USER=galaxy DB_PASS=... ACCESS_TOKEN_SECRET=... COOKIE_SECURE=true \
//! CORS_ORIGINS="https://galaxy.example" PORT=5001 \
//! cargo run --release --bin galaxy-server
//! ```

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use galaxy_server::config::{Config, StoreBackend};
use galaxy_server::routes::{create_router, AppState};
use galaxy_server::store;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables (Mongo backend):");
            eprintln!("  DB_USER              - Database username");
            eprintln!("  DB_PASS              - Database password");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  MONGODB_URI          - Full connection string (replaces DB_USER/DB_PASS)");
            eprintln!("  DB_CLUSTER           - Atlas cluster host");
            eprintln!("  DB_NAME              - Database name (default: galaxyDB)");
            eprintln!("  ACCESS_TOKEN_SECRET  - Secret for signing the auth cookie");
            eprintln!("  PORT                 - HTTP server port (default: 5001)");
            eprintln!("  COOKIE_SECURE        - Mark the auth cookie Secure (set to 'true')");
            eprintln!("  CORS_ORIGINS         - Comma-separated origins allowed with credentials");
            eprintln!("  GALAXY_STORE         - 'mongo' (default) or 'memory'");
            eprintln!("  RUST_LOG             - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    let backend = match config.store {
        StoreBackend::Mongo => "mongo",
        StoreBackend::Memory => "memory",
    };
    info!(
        port = config.port,
        store = backend,
        database = %config.db_name,
        token_auth = config.token_secret.is_some(),
        cookie_secure = config.cookie_secure,
        cors_origin_count = config.cors_origins.len(),
        "Galaxy server starting"
    );

    let document_store = match store::connect(&config).await {
        Ok(document_store) => document_store,
        Err(err) => {
            error!(error = %err, store = backend, "Failed to connect to document store");
            return ExitCode::from(1);
        }
    };

    let state = AppState::new(config.clone(), document_store.clone());
    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(port = config.port, address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(error = %err, address = %bind_addr, "Failed to bind to address");
            document_store.shutdown().await;
            return ExitCode::from(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    info!("Server ready to accept connections");

    let outcome = server.await;

    // In-flight requests have drained by now; release the store either way.
    document_store.shutdown().await;

    if let Err(err) = outcome {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` with a default of `info` for the
/// server and `debug` for request traces.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
