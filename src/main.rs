//! Pokladna Server - Backend service for the Pokladna finance platform
//!
//! Serves the HTTP API and runs CSV transaction imports in the background,
//! pushing progress events to connected clients over NATS.

mod auth;
mod config;
mod db;
mod handlers;
mod services;
mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use services::cache::Cache;
use services::cancellation::CancellationRegistry;
use services::notifier::{EventTransport, NatsTransport, Notifier};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ./logs
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,pokladna_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .init();

    info!("Starting Pokladna Server...");

    // Load configuration
    let config = Arc::new(config::Config::from_env()?);
    info!("Configuration loaded");

    // Connect to database
    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    // Run migrations
    db::run_migrations(&pool).await?;

    // Connect to NATS; the import pipeline works without it, clients just
    // fall back to polling job status.
    let transport: Option<Arc<dyn EventTransport>> =
        match async_nats::connect(&config.nats_url).await {
            Ok(client) => {
                info!("Connected to NATS at {}", config.nats_url);
                Some(Arc::new(NatsTransport::new(client)))
            }
            Err(e) => {
                warn!(
                    "NATS unavailable at {} ({}); real-time import events disabled",
                    config.nats_url, e
                );
                None
            }
        };

    // Background tasks: notifications, cache invalidation, the import runner
    let notifier = Notifier::start(transport);
    let cache = Arc::new(Cache::new());
    let invalidations = services::cache::start_invalidation(Arc::clone(&cache));
    let cancellations = CancellationRegistry::default();
    let scheduler =
        services::import_runner::start(pool.clone(), notifier, cancellations.clone(), &config);

    let state = handlers::AppState {
        pool,
        config: Arc::clone(&config),
        cache,
        invalidations,
        scheduler,
        cancellations,
    };

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("HTTP server listening on {}", config.http_addr);

    axum::serve(listener, handlers::router(state)).await?;

    Ok(())
}
