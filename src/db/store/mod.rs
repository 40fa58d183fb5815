//! Transactional record storage used by the import pipeline
//!
//! The import pipeline only talks to [`RecordStore`] / [`StoreTx`]:
//! - `PgRecordStore` for production (PostgreSQL, one transaction per row)
//! - `MemoryRecordStore` for tests and `import --dry-run`

mod memory;
mod postgres;

pub use memory::{MemoryRecordStore, MemorySnapshot};
pub use postgres::PgRecordStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    Household, HouseholdStatus, Neighborhood, NeighborhoodSubtree, NeighborhoodTotals,
    NewHousehold, NewNeighborhood, NewReading, Reading, ReadingValues,
};

/// PostgreSQL error codes worth retrying the whole row for
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Storage failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A natural key is already taken (concurrent find-or-create)
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A write would break a stored invariant (CHECK constraint)
    #[error("constraint violated: {0}")]
    Constraint(String),
}

impl StoreError {
    /// Whether retrying the same row in a fresh transaction can succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) | Some(UNIQUE_VIOLATION)
            ),
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            StoreError::Database(_) => false,
            StoreError::Conflict(_) => true,
            StoreError::NotFound { .. } | StoreError::Constraint(_) => false,
        }
    }
}

/// Factory for row transactions
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Start a transaction; dropping it without `commit` rolls back
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Get store name for logging
    fn name(&self) -> &'static str;
}

/// Entity operations inside one transaction
#[async_trait]
pub trait StoreTx: Send {
    /// The `find_*` reads lock the returned row until the transaction ends,
    /// so deltas computed from them cannot race a concurrent import
    async fn find_neighborhood_by_name(&mut self, name: &str) -> Result<Option<Neighborhood>, StoreError>;

    async fn insert_neighborhood(&mut self, new: &NewNeighborhood) -> Result<Neighborhood, StoreError>;

    async fn list_neighborhood_ids(&mut self) -> Result<Vec<i64>, StoreError>;

    /// Neighborhood with all households and readings, locked for update where
    /// the backend supports it
    async fn load_neighborhood_subtree(&mut self, id: i64) -> Result<Option<NeighborhoodSubtree>, StoreError>;

    /// Overwrite both totals; returns false when the neighborhood is gone
    async fn set_neighborhood_totals(&mut self, id: i64, totals: NeighborhoodTotals) -> Result<bool, StoreError>;

    /// Add a delta to both totals; returns false when the neighborhood is gone
    async fn add_neighborhood_totals(&mut self, id: i64, delta: NeighborhoodTotals) -> Result<bool, StoreError>;

    async fn find_household_by_key(&mut self, key: &str) -> Result<Option<Household>, StoreError>;

    async fn insert_household(&mut self, new: &NewHousehold) -> Result<Household, StoreError>;

    async fn update_household_status(&mut self, id: i64, status: &HouseholdStatus) -> Result<Household, StoreError>;

    async fn find_reading(&mut self, household_id: i64, period: &str) -> Result<Option<Reading>, StoreError>;

    async fn insert_reading(&mut self, new: &NewReading) -> Result<Reading, StoreError>;

    async fn update_reading(&mut self, id: i64, values: &ReadingValues) -> Result<Reading, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
