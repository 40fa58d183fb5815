//! Neighborhood aggregate maintenance
//!
//! Totals are kept either by applying per-row deltas or by recomputing the
//! whole neighborhood subtree, see [`AggregateMode`].

use tracing::{debug, info};

use crate::db::store::{RecordStore, StoreError, StoreTx};
use crate::types::{AggregateMode, NeighborhoodTotals};

/// Recompute both totals from the neighborhood's households and readings.
///
/// Returns the stored totals, or None when the neighborhood does not exist.
pub async fn recompute_neighborhood_stats(
    tx: &mut dyn StoreTx,
    neighborhood_id: i64,
) -> Result<Option<NeighborhoodTotals>, StoreError> {
    let Some(subtree) = tx.load_neighborhood_subtree(neighborhood_id).await? else {
        debug!("Neighborhood {} not found, skipping recompute", neighborhood_id);
        return Ok(None);
    };

    let totals = subtree.totals();
    tx.set_neighborhood_totals(neighborhood_id, totals).await?;
    Ok(Some(totals))
}

/// Add consumption and debt deltas to the stored totals; missing neighborhood is a no-op
pub async fn apply_neighborhood_delta(
    tx: &mut dyn StoreTx,
    neighborhood_id: i64,
    delta: NeighborhoodTotals,
) -> Result<(), StoreError> {
    if delta.is_zero() {
        return Ok(());
    }
    if !tx.add_neighborhood_totals(neighborhood_id, delta).await? {
        debug!("Neighborhood {} not found, skipping delta", neighborhood_id);
    }
    Ok(())
}

/// Bring totals up to date after one row's writes
pub async fn refresh_aggregates(
    tx: &mut dyn StoreTx,
    mode: AggregateMode,
    neighborhood_id: i64,
    delta: NeighborhoodTotals,
) -> Result<(), StoreError> {
    match mode {
        AggregateMode::Incremental => apply_neighborhood_delta(tx, neighborhood_id, delta).await,
        AggregateMode::Full => recompute_neighborhood_stats(tx, neighborhood_id).await.map(|_| ()),
    }
}

/// Recompute every neighborhood, one transaction each; returns how many were updated
pub async fn recompute_all_neighborhoods(store: &dyn RecordStore) -> Result<usize, StoreError> {
    let ids = {
        let mut tx = store.begin().await?;
        tx.list_neighborhood_ids().await?
    };

    let mut updated = 0;
    for id in ids {
        let mut tx = store.begin().await?;
        if let Some(totals) = recompute_neighborhood_stats(tx.as_mut(), id).await? {
            debug!(
                "Neighborhood {}: consumption {}, debt {}",
                id, totals.consumption, totals.debt
            );
            updated += 1;
        }
        tx.commit().await?;
    }

    info!("Recomputed aggregates for {} neighborhoods ({})", updated, store.name());
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MemoryRecordStore;
    use crate::services::import::import_csv_data;
    use crate::test_support::{csv, dec};
    use crate::types::ImportOptions;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_missing_neighborhood_is_noop() {
        let store = MemoryRecordStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(recompute_neighborhood_stats(tx.as_mut(), 42).await.unwrap(), None);
        let delta = NeighborhoodTotals { consumption: dec("1"), debt: dec("1") };
        apply_neighborhood_delta(tx.as_mut(), 42, delta).await.unwrap();
    }

    #[tokio::test]
    async fn test_recompute_all_repairs_drift() {
        let store = MemoryRecordStore::new();
        let content = csv(&[
            "H1,Centro,-34.6,-58.4,2024-01,10,true,300",
            "H2,Centro,-34.7,-58.5,2024-01,15.25,false,0",
            "H3,Norte,-34.5,-58.3,2024-01,7,1,50",
        ]);
        import_csv_data(&store, content.as_bytes(), &ImportOptions::default()).await.unwrap();

        store
            .corrupt_totals("Centro", NeighborhoodTotals { consumption: dec("999"), debt: Decimal::ZERO })
            .await;

        let updated = recompute_all_neighborhoods(&store).await.unwrap();
        assert_eq!(updated, 2);

        let snapshot = store.snapshot().await;
        let centro = snapshot.neighborhood("Centro").unwrap();
        assert_eq!(centro.total_consumption, dec("25.25"));
        assert_eq!(centro.total_debt, dec("300"));
        let norte = snapshot.neighborhood("Norte").unwrap();
        assert_eq!(norte.total_consumption, dec("7"));
        assert_eq!(norte.total_debt, dec("50"));
    }
}
