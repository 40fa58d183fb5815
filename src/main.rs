//! Aguas Worker - Backend service for the water utility meter-reading dashboard
//!
//! Imports CSV meter readings into PostgreSQL and answers dashboard queries
//! over NATS request/reply.

mod cli;
mod config;
mod db;
mod defaults;
mod handlers;
mod services;
#[cfg(test)]
mod test_support;
mod types;

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::db::store::{MemoryRecordStore, PgRecordStore, RecordStore};
use crate::services::import::{import_csv_data, recompute_all_neighborhoods};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Migrate => migrate().await,
        Command::Import { path, dry_run } => import_file(&path, dry_run).await,
        Command::Recompute => recompute().await,
        Command::Reset { yes } => reset(yes).await,
    }
}

/// Log to stdout and to a daily rolling file; keep the guard alive for the whole run
fn init_logging() -> WorkerGuard {
    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "worker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,aguas_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .init();

    guard
}

async fn serve() -> Result<()> {
    info!("Starting Aguas Worker...");

    let config = config::Config::from_env()?;
    info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await?;

    if config.reset_on_start {
        db::clear_database(&pool).await?;
    }

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth)
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    if let Err(e) = handlers::start_handlers(nats_client, pool, &config).await {
        error!("Handler error: {}", e);
        return Err(e);
    }

    info!("Aguas Worker stopped");
    Ok(())
}

async fn migrate() -> Result<()> {
    let config = config::Config::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await
}

async fn import_file(path: &Path, dry_run: bool) -> Result<()> {
    let buffer = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let options = config::import_options_from_env()?;

    let result = if dry_run {
        let store = MemoryRecordStore::new();
        let result = import_csv_data(&store, &buffer, &options).await?;
        let snapshot = store.snapshot().await;
        info!(
            "Dry run: {} neighborhoods, {} households, {} readings would be stored",
            snapshot.neighborhoods.len(),
            snapshot.households.len(),
            snapshot.readings.len()
        );
        result
    } else {
        let config = config::Config::from_env()?;
        let pool = db::create_pool(&config.database_url).await?;
        db::run_migrations(&pool).await?;
        let store = PgRecordStore::new(pool);
        import_csv_data(&store, &buffer, &options).await?
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn recompute() -> Result<()> {
    let config = config::Config::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;
    let store = PgRecordStore::new(pool);
    let updated = recompute_all_neighborhoods(&store)
        .await
        .context("Failed to recompute neighborhood totals")?;
    info!("{} neighborhoods recomputed using the {} store", updated, store.name());
    Ok(())
}

async fn reset(yes: bool) -> Result<()> {
    if !yes && !confirm("Delete ALL readings, households and neighborhoods? [y/N] ")? {
        warn!("Reset cancelled");
        return Ok(());
    }

    let config = config::Config::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;
    db::clear_database(&pool).await
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "s" | "si" | "sí"))
}
