//! Database module

pub mod queries;
pub mod store;

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Run embedded migrations.
///
/// The `_sqlx_migrations` bookkeeping is reconciled with the embedded list
/// first: records of migrations that no longer ship are dropped and stored
/// checksums are refreshed (line-ending changes alter them).
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    if migrations_table_exists(pool).await? {
        reconcile_migration_records(pool, &MIGRATOR).await?;
    }
    MIGRATOR.run(pool).await.context("Failed to apply migrations")?;

    info!("Database migrations complete");
    Ok(())
}

async fn migrations_table_exists(pool: &PgPool) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

async fn reconcile_migration_records(pool: &PgPool, migrator: &Migrator) -> Result<()> {
    let applied: Vec<(i64, Vec<u8>)> =
        sqlx::query_as("SELECT version, checksum FROM _sqlx_migrations ORDER BY version")
            .fetch_all(pool)
            .await?;

    for (version, stored_checksum) in applied {
        let embedded = migrator
            .iter()
            .find(|m| m.version == version && !m.migration_type.is_down_migration());

        match embedded {
            None => {
                warn!("Dropping record of migration {} (no longer embedded)", version);
                sqlx::query("DELETE FROM _sqlx_migrations WHERE version = $1")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
            Some(migration) if stored_checksum.as_slice() != &*migration.checksum => {
                warn!(
                    "Migration {} ({}) checksum differs, storing embedded checksum",
                    version, migration.description
                );
                sqlx::query("UPDATE _sqlx_migrations SET checksum = $1 WHERE version = $2")
                    .bind(&*migration.checksum)
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Delete all readings, households and neighborhoods
pub async fn clear_database(pool: &PgPool) -> Result<()> {
    warn!("Clearing readings, households and neighborhoods");

    let mut tx = pool.begin().await?;
    let readings = sqlx::query("DELETE FROM readings").execute(&mut *tx).await?;
    let households = sqlx::query("DELETE FROM households").execute(&mut *tx).await?;
    let neighborhoods = sqlx::query("DELETE FROM neighborhoods").execute(&mut *tx).await?;
    tx.commit().await?;

    info!(
        "Database cleared: {} readings, {} households, {} neighborhoods",
        readings.rows_affected(),
        households.rows_affected(),
        neighborhoods.rows_affected()
    );
    Ok(())
}
