//! PostgreSQL record store

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{RecordStore, StoreError, StoreTx};
use crate::types::{
    Household, HouseholdStatus, HouseholdWithReadings, Neighborhood, NeighborhoodSubtree,
    NeighborhoodTotals, NewHousehold, NewNeighborhood, NewReading, Reading, ReadingValues,
};

const HOUSEHOLD_COLUMNS: &str = r#"
    id, household_key, neighborhood_id, address, latitude, longitude,
    is_debtor, total_debt, last_reading_date, last_period, created_at, updated_at
"#;

const READING_COLUMNS: &str = r#"
    id, household_id, period, consumption_m3, amount_due, is_paid,
    reading_date, created_at, updated_at
"#;

/// Record store backed by the connection pool
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn find_neighborhood_by_name(&mut self, name: &str) -> Result<Option<Neighborhood>, StoreError> {
        let neighborhood = sqlx::query_as::<_, Neighborhood>(
            r#"
            SELECT id, name, latitude, longitude, total_consumption, total_debt, created_at, updated_at
            FROM neighborhoods
            WHERE name = $1
            FOR UPDATE
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(neighborhood)
    }

    async fn insert_neighborhood(&mut self, new: &NewNeighborhood) -> Result<Neighborhood, StoreError> {
        // ON CONFLICT DO NOTHING keeps the transaction usable when a parallel
        // import created the same name first
        let inserted = sqlx::query_as::<_, Neighborhood>(
            r#"
            INSERT INTO neighborhoods (name, latitude, longitude)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, latitude, longitude, total_consumption, total_debt, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(new.latitude)
        .bind(new.longitude)
        .fetch_optional(&mut *self.tx)
        .await?;

        inserted.ok_or_else(|| StoreError::Conflict(format!("neighborhood '{}'", new.name)))
    }

    async fn list_neighborhood_ids(&mut self) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM neighborhoods ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn load_neighborhood_subtree(&mut self, id: i64) -> Result<Option<NeighborhoodSubtree>, StoreError> {
        let neighborhood = sqlx::query_as::<_, Neighborhood>(
            r#"
            SELECT id, name, latitude, longitude, total_consumption, total_debt, created_at, updated_at
            FROM neighborhoods
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(neighborhood) = neighborhood else {
            return Ok(None);
        };

        let households = sqlx::query_as::<_, Household>(&format!(
            "SELECT {} FROM households WHERE neighborhood_id = $1 ORDER BY id",
            HOUSEHOLD_COLUMNS
        ))
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        let readings = sqlx::query_as::<_, Reading>(&format!(
            r#"
            SELECT {} FROM readings
            WHERE household_id IN (SELECT id FROM households WHERE neighborhood_id = $1)
            ORDER BY household_id, period
            "#,
            READING_COLUMNS
        ))
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_household: HashMap<i64, Vec<Reading>> = HashMap::new();
        for reading in readings {
            by_household.entry(reading.household_id).or_default().push(reading);
        }

        let households = households
            .into_iter()
            .map(|household| HouseholdWithReadings {
                readings: by_household.remove(&household.id).unwrap_or_default(),
                household,
            })
            .collect();

        Ok(Some(NeighborhoodSubtree { neighborhood, households }))
    }

    async fn set_neighborhood_totals(&mut self, id: i64, totals: NeighborhoodTotals) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE neighborhoods
            SET total_consumption = $2, total_debt = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(totals.consumption)
        .bind(totals.debt)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_neighborhood_totals(&mut self, id: i64, delta: NeighborhoodTotals) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE neighborhoods
            SET total_consumption = total_consumption + $2,
                total_debt = total_debt + $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delta.consumption)
        .bind(delta.debt)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_household_by_key(&mut self, key: &str) -> Result<Option<Household>, StoreError> {
        let household = sqlx::query_as::<_, Household>(&format!(
            "SELECT {} FROM households WHERE household_key = $1 FOR UPDATE",
            HOUSEHOLD_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(household)
    }

    async fn insert_household(&mut self, new: &NewHousehold) -> Result<Household, StoreError> {
        let inserted = sqlx::query_as::<_, Household>(&format!(
            r#"
            INSERT INTO households (
                household_key, neighborhood_id, address, latitude, longitude,
                is_debtor, total_debt, last_reading_date, last_period
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (household_key) DO NOTHING
            RETURNING {}
            "#,
            HOUSEHOLD_COLUMNS
        ))
        .bind(&new.household_key)
        .bind(new.neighborhood_id)
        .bind(&new.address)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(new.status.is_debtor)
        .bind(new.status.total_debt)
        .bind(new.status.last_reading_date)
        .bind(&new.status.last_period)
        .fetch_optional(&mut *self.tx)
        .await?;

        inserted.ok_or_else(|| StoreError::Conflict(format!("household '{}'", new.household_key)))
    }

    async fn update_household_status(&mut self, id: i64, status: &HouseholdStatus) -> Result<Household, StoreError> {
        let updated = sqlx::query_as::<_, Household>(&format!(
            r#"
            UPDATE households
            SET is_debtor = $2, total_debt = $3, last_reading_date = $4,
                last_period = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            HOUSEHOLD_COLUMNS
        ))
        .bind(id)
        .bind(status.is_debtor)
        .bind(status.total_debt)
        .bind(status.last_reading_date)
        .bind(&status.last_period)
        .fetch_optional(&mut *self.tx)
        .await?;

        updated.ok_or(StoreError::NotFound { entity: "household", id })
    }

    async fn find_reading(&mut self, household_id: i64, period: &str) -> Result<Option<Reading>, StoreError> {
        let reading = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {} FROM readings WHERE household_id = $1 AND period = $2 FOR UPDATE",
            READING_COLUMNS
        ))
        .bind(household_id)
        .bind(period)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(reading)
    }

    async fn insert_reading(&mut self, new: &NewReading) -> Result<Reading, StoreError> {
        let inserted = sqlx::query_as::<_, Reading>(&format!(
            r#"
            INSERT INTO readings (household_id, period, consumption_m3, amount_due, is_paid, reading_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (household_id, period) DO NOTHING
            RETURNING {}
            "#,
            READING_COLUMNS
        ))
        .bind(new.household_id)
        .bind(&new.period)
        .bind(new.values.consumption_m3)
        .bind(new.values.amount_due)
        .bind(new.values.is_paid)
        .bind(new.values.reading_date)
        .fetch_optional(&mut *self.tx)
        .await?;

        inserted.ok_or_else(|| {
            StoreError::Conflict(format!("reading {}/{}", new.household_id, new.period))
        })
    }

    async fn update_reading(&mut self, id: i64, values: &ReadingValues) -> Result<Reading, StoreError> {
        let updated = sqlx::query_as::<_, Reading>(&format!(
            r#"
            UPDATE readings
            SET consumption_m3 = $2, amount_due = $3, is_paid = $4,
                reading_date = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            READING_COLUMNS
        ))
        .bind(id)
        .bind(values.consumption_m3)
        .bind(values.amount_due)
        .bind(values.is_paid)
        .bind(values.reading_date)
        .fetch_optional(&mut *self.tx)
        .await?;

        updated.ok_or(StoreError::NotFound { entity: "reading", id })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
