//! NATS message handlers

pub mod household;
pub mod import;
pub mod neighborhood;
pub mod ping;
pub mod stats;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info};

use crate::config::Config;
use crate::db::store::{PgRecordStore, RecordStore};

/// Subject prefix shared by every handler
pub const SUBJECT_PREFIX: &str = "aguas";

fn subject(name: &str) -> String {
    format!("{}.{}", SUBJECT_PREFIX, name)
}

/// Subscribe to every subject and run until a handler stops or shutdown is requested
pub async fn start_handlers(client: Client, pool: PgPool, config: &Config) -> Result<()> {
    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool.clone()));
    info!(
        "Import settings: overwrite={}, collisions={}, aggregates={}, max {} bytes",
        config.import.overwrite_policy,
        config.import.key_collision_policy,
        config.import.aggregate_mode,
        config.import_max_bytes
    );

    // Subscribe to all subjects
    let ping_sub = client.subscribe(subject("ping")).await?;
    let import_csv_sub = client.subscribe(subject("import.csv")).await?;
    let household_list_sub = client.subscribe(subject("household.list")).await?;
    let household_debtors_sub = client.subscribe(subject("household.debtors")).await?;
    let neighborhood_list_sub = client.subscribe(subject("neighborhood.list")).await?;
    let neighborhood_get_sub = client.subscribe(subject("neighborhood.get")).await?;
    let stats_overview_sub = client.subscribe(subject("stats.overview")).await?;
    let stats_top_sub = client.subscribe(subject("stats.top_consumption")).await?;
    let stats_debt_sub = client.subscribe(subject("stats.debt_summary")).await?;
    let stats_trends_sub = client.subscribe(subject("stats.consumption_trends")).await?;

    info!("Subscribed to NATS subjects under '{}.>'", SUBJECT_PREFIX);

    // Clone client and pool for each handler
    let client_ping = client.clone();
    let client_import = client.clone();
    let client_household_list = client.clone();
    let client_household_debtors = client.clone();
    let client_neighborhood_list = client.clone();
    let client_neighborhood_get = client.clone();
    let client_stats_overview = client.clone();
    let client_stats_top = client.clone();
    let client_stats_debt = client.clone();
    let client_stats_trends = client.clone();

    let pool_household_list = pool.clone();
    let pool_household_debtors = pool.clone();
    let pool_neighborhood_list = pool.clone();
    let pool_neighborhood_get = pool.clone();
    let pool_stats_overview = pool.clone();
    let pool_stats_top = pool.clone();
    let pool_stats_debt = pool.clone();
    let pool_stats_trends = pool;

    let import_options = config.import;
    let import_max_bytes = config.import_max_bytes;

    // Spawn handlers
    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub).await
    });

    let import_csv_handle = tokio::spawn(async move {
        import::handle_import_csv(client_import, import_csv_sub, store, import_options, import_max_bytes).await
    });

    let household_list_handle = tokio::spawn(async move {
        household::handle_list(client_household_list, household_list_sub, pool_household_list).await
    });

    let household_debtors_handle = tokio::spawn(async move {
        household::handle_debtors(client_household_debtors, household_debtors_sub, pool_household_debtors).await
    });

    let neighborhood_list_handle = tokio::spawn(async move {
        neighborhood::handle_list(client_neighborhood_list, neighborhood_list_sub, pool_neighborhood_list).await
    });

    let neighborhood_get_handle = tokio::spawn(async move {
        neighborhood::handle_get(client_neighborhood_get, neighborhood_get_sub, pool_neighborhood_get).await
    });

    let stats_overview_handle = tokio::spawn(async move {
        stats::handle_overview(client_stats_overview, stats_overview_sub, pool_stats_overview).await
    });

    let stats_top_handle = tokio::spawn(async move {
        stats::handle_top_consumption(client_stats_top, stats_top_sub, pool_stats_top).await
    });

    let stats_debt_handle = tokio::spawn(async move {
        stats::handle_debt_summary(client_stats_debt, stats_debt_sub, pool_stats_debt).await
    });

    let stats_trends_handle = tokio::spawn(async move {
        stats::handle_consumption_trends(client_stats_trends, stats_trends_sub, pool_stats_trends).await
    });

    // Wait for any handler to finish (which indicates an error) or for shutdown
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = import_csv_handle => {
            error!("Import CSV handler finished: {:?}", result);
        }
        result = household_list_handle => {
            error!("Household list handler finished: {:?}", result);
        }
        result = household_debtors_handle => {
            error!("Household debtors handler finished: {:?}", result);
        }
        result = neighborhood_list_handle => {
            error!("Neighborhood list handler finished: {:?}", result);
        }
        result = neighborhood_get_handle => {
            error!("Neighborhood get handler finished: {:?}", result);
        }
        result = stats_overview_handle => {
            error!("Stats overview handler finished: {:?}", result);
        }
        result = stats_top_handle => {
            error!("Stats top consumption handler finished: {:?}", result);
        }
        result = stats_debt_handle => {
            error!("Stats debt summary handler finished: {:?}", result);
        }
        result = stats_trends_handle => {
            error!("Stats consumption trends handler finished: {:?}", result);
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, no longer accepting messages");
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_names() {
        assert_eq!(subject("ping"), "aguas.ping");
        assert_eq!(subject("stats.top_consumption"), "aguas.stats.top_consumption");
    }
}
