//! Demo of the relpool lifecycle against PostgreSQL.
//!
//! Reads `PG_*` settings from an env file and the environment, creates the
//! shared pool, runs the same statements once on an explicitly acquired
//! connection and once through the pool, then logs pool statistics.
//!
//! ```bash
//! RUST_LOG=info,relpool=debug cargo run -p relpool-demo -- --env-file .env
//! ```

mod settings;
mod workload;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relpool::PoolRegistry;
use relpool_postgres::PostgresConnector;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relpool-demo", about = "Exercise a PostgreSQL connection pool")]
struct Cli {
    /// File with PG_* settings, loaded before reading the environment
    #[arg(long, env = "RELPOOL_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Run read-only statements only
    #[arg(long)]
    skip_update: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = dotenvy::from_path(&cli.env_file) {
        tracing::info!(file = %cli.env_file.display(), error = %e, "error loading config file");
    }
    let config = settings::from_env().context("error loading config")?;
    tracing::info!(config = ?config, "config");

    let registry = PoolRegistry::new();
    let pool = registry
        .get_or_create(config, Arc::new(PostgresConnector::new()))
        .await
        .context("error connecting to database")?;
    tracing::info!("application started successfully");

    let update = !cli.skip_update;

    match workload::explicit(&pool, update).await {
        Ok(report) => tracing::info!(
            users = report.users.len(),
            count = report.user_count,
            rows_affected = ?report.rows_affected,
            "explicit connection operations finished"
        ),
        Err(e) => tracing::error!(
            error = %format!("{e:#}"),
            "error during explicit connection operations"
        ),
    }

    match workload::direct(&pool, update).await {
        Ok(report) => tracing::info!(
            users = report.users.len(),
            count = report.user_count,
            rows_affected = ?report.rows_affected,
            "direct pool operations finished"
        ),
        Err(e) => tracing::error!(error = %format!("{e:#}"), "error during direct pool operations"),
    }

    workload::log_pool_stats(&pool);

    registry.close().await;
    Ok(())
}
