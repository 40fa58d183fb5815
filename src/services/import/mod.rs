//! CSV meter-reading import
//!
//! Rows are processed in file order, each one in its own store transaction:
//! 1. validate the row ([`MeterRow`])
//! 2. check synthesized household keys for collisions within the batch
//! 3. resolve neighborhood and household, upsert the reading
//! 4. refresh the neighborhood totals and commit
//!
//! Row failures are collected in the [`ImportResult`]; only a malformed file
//! fails the whole import.

pub mod aggregate;
pub mod parser;
pub mod reading;
pub mod resolver;
pub mod row;

pub use aggregate::recompute_all_neighborhoods;
pub use parser::{parse_records, ParseError};
pub use row::{MeterRow, RowError};

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::db::store::RecordStore;
use crate::types::{
    ImportOptions, ImportResult, ImportRowError, ImportWarning, KeyCollisionPolicy,
    NeighborhoodTotals, RawRecord, RowRef,
};

/// What a committed row created
#[derive(Debug, Clone, Copy, Default)]
struct RowOutcome {
    neighborhood_created: bool,
    household_created: bool,
    reading_created: bool,
}

/// Rows without `id`, by the fields their synthesized key is built from
#[derive(Default)]
struct CollisionTracker {
    seen: HashMap<(String, String, String, String), usize>,
}

impl CollisionTracker {
    fn key(row: &MeterRow) -> (String, String, String, String) {
        (row.barrio.clone(), row.lat_raw.clone(), row.lng_raw.clone(), row.period.clone())
    }

    /// Earlier row this one would be merged into, if any
    fn earlier(&self, row: &MeterRow) -> Option<usize> {
        if row.id.is_some() {
            return None;
        }
        self.seen.get(&Self::key(row)).copied()
    }

    fn record(&mut self, row: &MeterRow, row_number: usize) {
        if row.id.is_none() {
            self.seen.entry(Self::key(row)).or_insert(row_number);
        }
    }
}

/// Import a CSV buffer into the store.
///
/// Returns the result even when rows failed; only a [`ParseError`] aborts.
pub async fn import_csv_data(
    store: &dyn RecordStore,
    buffer: &[u8],
    options: &ImportOptions,
) -> Result<ImportResult, ParseError> {
    info!("Starting CSV import ({} bytes, store: {})", buffer.len(), store.name());

    let records = parse_records(buffer)?;
    info!("Records found: {}", records.len());

    let mut result = ImportResult::default();
    let mut collisions = CollisionTracker::default();

    for (index, record) in records.iter().enumerate() {
        let row_number = index + 1;

        let row = match MeterRow::from_record(record) {
            Ok(row) => row,
            Err(e) => {
                push_error(&mut result, row_number, &e, record);
                continue;
            }
        };

        if let Some(earlier_row) = collisions.earlier(&row) {
            let key = format!("{}_{}_{} ({})", row.barrio, row.lat_raw, row.lng_raw, row.period);
            match options.key_collision_policy {
                KeyCollisionPolicy::Merge => {
                    let message = format!(
                        "La fila coincide con la fila {} en barrio, coordenadas y período sin columna id; se fusiona en el mismo hogar ({})",
                        earlier_row, key
                    );
                    warn!("Row {}: {}", row_number, message);
                    result.warnings.push(ImportWarning { row: row_number, message });
                }
                KeyCollisionPolicy::Reject => {
                    let e = RowError::KeyCollision { earlier_row, key };
                    push_error(&mut result, row_number, &e, record);
                    continue;
                }
            }
        }

        match process_row_with_retry(store, &row, row_number, options).await {
            Ok(outcome) => {
                collisions.record(&row, row_number);
                result.records_processed += 1;
                result.neighborhoods_created += outcome.neighborhood_created as u32;
                result.households_created += outcome.household_created as u32;
                if outcome.reading_created {
                    result.readings_created += 1;
                } else {
                    result.readings_updated += 1;
                }
            }
            Err(e) => push_error(&mut result, row_number, &e, record),
        }
    }

    info!(
        "Import finished: {} processed, {} neighborhoods, {} households, {} readings created, {} updated, {} errors, {} warnings",
        result.records_processed,
        result.neighborhoods_created,
        result.households_created,
        result.readings_created,
        result.readings_updated,
        result.errors.len(),
        result.warnings.len()
    );

    Ok(result)
}

fn push_error(result: &mut ImportResult, row_number: usize, e: &RowError, record: &RawRecord) {
    warn!("Row {} failed: {}", row_number, e);
    result.errors.push(ImportRowError {
        row: RowRef::Row(row_number),
        kind: e.kind(),
        error: e.to_string(),
        data: Some(record.clone()),
    });
}

/// Run one row, retrying transient store failures with linear backoff
async fn process_row_with_retry(
    store: &dyn RecordStore,
    row: &MeterRow,
    row_number: usize,
    options: &ImportOptions,
) -> Result<RowOutcome, RowError> {
    let max_attempts = options.max_row_attempts.max(1);
    let mut attempt = 1;
    loop {
        match process_row(store, row, options).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(
                    "Row {} attempt {}/{} failed, retrying: {}",
                    row_number, attempt, max_attempts, e
                );
                tokio::time::sleep(retry_delay(options.retry_delay_ms, attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Linear backoff, saturating for huge configured delays
fn retry_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(u64::from(attempt)))
}

/// All writes of one row in a single transaction
async fn process_row(
    store: &dyn RecordStore,
    row: &MeterRow,
    options: &ImportOptions,
) -> Result<RowOutcome, RowError> {
    let now = Utc::now();
    let mut tx = store.begin().await?;

    let neighborhood = resolver::resolve_neighborhood(tx.as_mut(), row).await?;
    let household = resolver::resolve_household(
        tx.as_mut(),
        row,
        &neighborhood.neighborhood,
        options.overwrite_policy,
        now,
    )
    .await?;
    let reading = reading::upsert_reading(tx.as_mut(), row, &household.household, now).await?;

    let delta = NeighborhoodTotals {
        consumption: reading.reading.consumption_m3 - reading.previous_consumption,
        debt: household.household.total_debt - household.previous_debt,
    };
    aggregate::refresh_aggregates(
        tx.as_mut(),
        options.aggregate_mode,
        household.household.neighborhood_id,
        delta,
    )
    .await?;

    tx.commit().await?;

    debug!(
        "Row committed: household {} period {}",
        household.household.household_key, row.period
    );

    Ok(RowOutcome {
        neighborhood_created: neighborhood.created,
        household_created: household.created,
        reading_created: reading.created,
    })
}
