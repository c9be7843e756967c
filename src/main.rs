//! # Harmonia Backend - Main Application Entry Point
//!
//! HTTP service that analyzes uploaded audio and runs background
//! transformation jobs over it (tuning, binaural beats, therapeutic
//! modulation), then serves the results for download or export.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **state**: shared state handed to every handler
//! - **health**: health, root and metrics endpoints
//! - **middleware**: request logging and per-endpoint metrics
//! - **handlers**: upload, process, status, download and export endpoints
//! - **audio**: decoding, WAV encoding, format validation and export
//! - **analysis**: tempo and key estimation
//! - **synthesis**: binaural beat generation
//! - **pipeline**: the staged transformation chain
//! - **jobs**: job tracking and the background runner
//! - **storage**: on-disk layout for uploads and outputs
//! - **error**: error types and their HTTP responses

mod analysis;
mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod jobs;
mod middleware;
mod pipeline;
mod state;
mod storage;
mod synthesis;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGTERM or SIGINT has been received.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## Startup sequence:
/// 1. Load `.env`, initialize tracing, load and validate configuration
/// 2. Create the storage directories and sweep files older than the configured age
/// 3. Build shared state and start the HTTP server with middleware and routes
/// 4. Stop gracefully on SIGTERM/SIGINT
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting harmonia-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let max_upload_bytes = config.max_upload_bytes();
    let max_file_age = Duration::from_secs(config.storage.max_file_age_hours * 3600);

    let app_state = AppState::new(config);
    app_state.storage.ensure_dirs()?;
    match app_state.storage.sweep_older_than(max_file_age) {
        Ok(removed) => info!(removed, "Swept old uploads and outputs"),
        Err(e) => warn!("Startup sweep failed: {:#}", e),
    }

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().limit(64 * 1024))
            .app_data(web::PayloadConfig::default().limit(max_upload_bytes))
            // Middleware runs in reverse registration order for responses
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api")
                    .route("/", web::get().to(health::root))
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/upload", web::post().to(handlers::upload_audio))
                    .route("/process/{file_id}", web::post().to(handlers::process_audio))
                    .route("/status/{task_id}", web::get().to(handlers::get_status))
                    .route("/download/{task_id}", web::get().to(handlers::download_output))
                    .route("/export/{task_id}", web::post().to(handlers::export_audio)),
            )
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Structured logging to the console.
///
/// `RUST_LOG` overrides the default filter of
/// `harmonia_backend=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harmonia_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Polls the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
