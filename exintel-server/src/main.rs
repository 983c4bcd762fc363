//! exintel-server - Exchange feature matrix microservice
//!
//! Serves the competitor feature matrix: spreadsheet import and export,
//! manual cell edits, AI suggestion review, screenshot classification and the
//! scheduled suggestion sweep.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use exintel_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use exintel_server::config::ServiceConfig;
use exintel_server::services::ai_client::{ChatModel, XaiClient};
use exintel_server::services::screenshot_store::FsScreenshotStore;
use exintel_server::AppState;

/// Command-line arguments for exintel-server
#[derive(Parser, Debug)]
#[command(name = "exintel-server")]
#[command(about = "Exchange feature matrix service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and screenshots
    #[arg(short, long, env = "EXINTEL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Listen address (overrides the TOML bind_address)
    #[arg(short, long, env = "EXINTEL_BIND")]
    bind: Option<String>,

    /// Bootstrap TOML file
    #[arg(short, long, env = "EXINTEL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = match args.config.clone().or_else(default_config_path) {
        Some(path) => load_toml_config(&path),
        None => TomlConfig::default(),
    };

    // RUST_LOG wins over the TOML level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "exintel_server={level},exintel_common={level},tower_http=info",
                    level = toml_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting exintel-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Step 1: Resolve root folder (CLI > env > TOML > OS default)
    let root_folder = RootFolderResolver::new("exintel")
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&toml_config)
        .resolve();

    // Step 2: Create root folder directory if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    // Step 3: Open or create database
    let db_path = initializer.database_path();
    let db_pool = exintel_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database: {}", db_path.display());

    // Step 4: Runtime configuration and collaborators
    let config = ServiceConfig::from_toml(&toml_config);
    let ai: Option<Arc<dyn ChatModel>> = match config.xai_api_key.as_deref() {
        Some(key) => match XaiClient::new(&config.xai_base_url, key) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("xAI client unavailable: {}", e);
                None
            }
        },
        None => None,
    };
    let screenshots = Arc::new(FsScreenshotStore::new(initializer.screenshots_path()));

    let state = AppState::new(db_pool.clone(), config, ai, screenshots);
    let app = exintel_server::build_router(state);

    // Step 5: Serve
    let bind_address = args.bind.unwrap_or(toml_config.bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    db_pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
