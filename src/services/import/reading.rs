//! Reading upsert keyed by (household, period)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::row::{MeterRow, RowError};
use crate::db::store::StoreTx;
use crate::types::{Household, NewReading, Reading, ReadingValues};

#[derive(Debug, Clone)]
pub struct UpsertedReading {
    pub reading: Reading,
    pub created: bool,
    /// Consumption stored before this row; zero for a new reading
    pub previous_consumption: Decimal,
}

/// Create the reading for the row's period or overwrite the existing one
pub async fn upsert_reading(
    tx: &mut dyn StoreTx,
    row: &MeterRow,
    household: &Household,
    now: DateTime<Utc>,
) -> Result<UpsertedReading, RowError> {
    let values = ReadingValues {
        consumption_m3: row.consumption_m3,
        amount_due: row.amount_due,
        is_paid: row.is_paid(),
        reading_date: now,
    };

    match tx.find_reading(household.id, &row.period).await? {
        Some(existing) => {
            let previous_consumption = existing.consumption_m3;
            let reading = tx.update_reading(existing.id, &values).await?;
            Ok(UpsertedReading { reading, created: false, previous_consumption })
        }
        None => {
            let reading = tx
                .insert_reading(&NewReading {
                    household_id: household.id,
                    period: row.period.clone(),
                    values,
                })
                .await?;
            Ok(UpsertedReading { reading, created: true, previous_consumption: Decimal::ZERO })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{MemoryRecordStore, RecordStore};
    use crate::services::import::resolver::{resolve_household, resolve_neighborhood};
    use crate::test_support::{dec, record};
    use crate::types::OverwritePolicy;

    fn row(period: &str, consumption: &str, moroso: &str) -> MeterRow {
        MeterRow::from_record(&record(&[
            ("id", "H001"),
            ("barrio", "Centro"),
            ("period", period),
            ("consumo_m3", consumption),
            ("moroso", moroso),
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_creates_then_overwrites() {
        let store = MemoryRecordStore::new();
        let mut tx = store.begin().await.unwrap();
        let first = row("2024-01", "45.5", "false");
        let centro = resolve_neighborhood(tx.as_mut(), &first).await.unwrap().neighborhood;
        let household = resolve_household(tx.as_mut(), &first, &centro, OverwritePolicy::Always, Utc::now())
            .await
            .unwrap()
            .household;

        let created = upsert_reading(tx.as_mut(), &first, &household, Utc::now()).await.unwrap();
        assert!(created.created);
        assert!(created.reading.is_paid);
        assert_eq!(created.previous_consumption, Decimal::ZERO);

        let updated = upsert_reading(tx.as_mut(), &row("2024-01", "50", "1"), &household, Utc::now())
            .await
            .unwrap();
        assert!(!updated.created);
        assert_eq!(updated.reading.id, created.reading.id);
        assert_eq!(updated.previous_consumption, dec("45.5"));
        assert_eq!(updated.reading.consumption_m3, dec("50"));
        assert!(!updated.reading.is_paid);

        let other_period = upsert_reading(tx.as_mut(), &row("2024-02", "60", "false"), &household, Utc::now())
            .await
            .unwrap();
        assert!(other_period.created);
        assert_ne!(other_period.reading.id, created.reading.id);
    }
}
