//! In-memory record store
//!
//! Transactions are serialized through one lock and work on a copy of the
//! state; `commit` swaps the copy in, dropping the transaction discards it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{RecordStore, StoreError, StoreTx};
use crate::types::{
    Household, HouseholdStatus, HouseholdWithReadings, Neighborhood, NeighborhoodSubtree,
    NeighborhoodTotals, NewHousehold, NewNeighborhood, NewReading, Reading, ReadingValues,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    neighborhoods: BTreeMap<i64, Neighborhood>,
    households: BTreeMap<i64, Household>,
    readings: BTreeMap<i64, Reading>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Copy of everything stored, ordered by id
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    pub neighborhoods: Vec<Neighborhood>,
    pub households: Vec<Household>,
    pub readings: Vec<Reading>,
}

#[cfg(test)]
impl MemorySnapshot {
    pub fn neighborhood(&self, name: &str) -> Option<&Neighborhood> {
        self.neighborhoods.iter().find(|n| n.name == name)
    }

    pub fn household(&self, key: &str) -> Option<&Household> {
        self.households.iter().find(|h| h.household_key == key)
    }

    pub fn readings_of(&self, household_id: i64) -> Vec<&Reading> {
        self.readings.iter().filter(|r| r.household_id == household_id).collect()
    }
}

/// Record store kept in process memory
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
    failing_commits: Arc<AtomicU32>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        let state = self.state.lock().await;
        MemorySnapshot {
            neighborhoods: state.neighborhoods.values().cloned().collect(),
            households: state.households.values().cloned().collect(),
            readings: state.readings.values().cloned().collect(),
        }
    }

    /// Make the next `count` commits fail with a transient conflict
    #[cfg(test)]
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Overwrite stored totals, bypassing the import pipeline
    #[cfg(test)]
    pub async fn corrupt_totals(&self, name: &str, totals: NeighborhoodTotals) {
        let mut state = self.state.lock().await;
        if let Some(neighborhood) = state.neighborhoods.values_mut().find(|n| n.name == name) {
            neighborhood.total_consumption = totals.consumption;
            neighborhood.total_debt = totals.debt;
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryStoreTx {
            guard,
            working,
            failing_commits: self.failing_commits.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryStoreTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    failing_commits: Arc<AtomicU32>,
}

fn non_negative(value: Decimal, what: &str) -> Result<(), StoreError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(StoreError::Constraint(format!("{} must not be negative", what)));
    }
    Ok(())
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
    async fn find_neighborhood_by_name(&mut self, name: &str) -> Result<Option<Neighborhood>, StoreError> {
        Ok(self.working.neighborhoods.values().find(|n| n.name == name).cloned())
    }

    async fn insert_neighborhood(&mut self, new: &NewNeighborhood) -> Result<Neighborhood, StoreError> {
        if self.working.neighborhoods.values().any(|n| n.name == new.name) {
            return Err(StoreError::Conflict(format!("neighborhood '{}'", new.name)));
        }
        let now = Utc::now();
        let neighborhood = Neighborhood {
            id: self.working.next_id(),
            name: new.name.clone(),
            latitude: new.latitude,
            longitude: new.longitude,
            total_consumption: Decimal::ZERO,
            total_debt: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        self.working.neighborhoods.insert(neighborhood.id, neighborhood.clone());
        Ok(neighborhood)
    }

    async fn list_neighborhood_ids(&mut self) -> Result<Vec<i64>, StoreError> {
        Ok(self.working.neighborhoods.keys().copied().collect())
    }

    async fn load_neighborhood_subtree(&mut self, id: i64) -> Result<Option<NeighborhoodSubtree>, StoreError> {
        let Some(neighborhood) = self.working.neighborhoods.get(&id).cloned() else {
            return Ok(None);
        };
        let households = self
            .working
            .households
            .values()
            .filter(|h| h.neighborhood_id == id)
            .map(|household| HouseholdWithReadings {
                household: household.clone(),
                readings: self
                    .working
                    .readings
                    .values()
                    .filter(|r| r.household_id == household.id)
                    .cloned()
                    .collect(),
            })
            .collect();
        Ok(Some(NeighborhoodSubtree { neighborhood, households }))
    }

    async fn set_neighborhood_totals(&mut self, id: i64, totals: NeighborhoodTotals) -> Result<bool, StoreError> {
        non_negative(totals.consumption, "total_consumption")?;
        non_negative(totals.debt, "total_debt")?;
        let Some(neighborhood) = self.working.neighborhoods.get_mut(&id) else {
            return Ok(false);
        };
        neighborhood.total_consumption = totals.consumption;
        neighborhood.total_debt = totals.debt;
        neighborhood.updated_at = Utc::now();
        Ok(true)
    }

    async fn add_neighborhood_totals(&mut self, id: i64, delta: NeighborhoodTotals) -> Result<bool, StoreError> {
        let Some(neighborhood) = self.working.neighborhoods.get_mut(&id) else {
            return Ok(false);
        };
        let consumption = neighborhood.total_consumption + delta.consumption;
        let debt = neighborhood.total_debt + delta.debt;
        non_negative(consumption, "total_consumption")?;
        non_negative(debt, "total_debt")?;
        neighborhood.total_consumption = consumption;
        neighborhood.total_debt = debt;
        neighborhood.updated_at = Utc::now();
        Ok(true)
    }

    async fn find_household_by_key(&mut self, key: &str) -> Result<Option<Household>, StoreError> {
        Ok(self.working.households.values().find(|h| h.household_key == key).cloned())
    }

    async fn insert_household(&mut self, new: &NewHousehold) -> Result<Household, StoreError> {
        if self.working.households.values().any(|h| h.household_key == new.household_key) {
            return Err(StoreError::Conflict(format!("household '{}'", new.household_key)));
        }
        if !self.working.neighborhoods.contains_key(&new.neighborhood_id) {
            return Err(StoreError::NotFound { entity: "neighborhood", id: new.neighborhood_id });
        }
        let now = Utc::now();
        let household = Household {
            id: self.working.next_id(),
            household_key: new.household_key.clone(),
            neighborhood_id: new.neighborhood_id,
            address: Some(new.address.clone()),
            latitude: new.latitude,
            longitude: new.longitude,
            is_debtor: new.status.is_debtor,
            total_debt: new.status.total_debt,
            last_reading_date: Some(new.status.last_reading_date),
            last_period: Some(new.status.last_period.clone()),
            created_at: now,
            updated_at: now,
        };
        self.working.households.insert(household.id, household.clone());
        Ok(household)
    }

    async fn update_household_status(&mut self, id: i64, status: &HouseholdStatus) -> Result<Household, StoreError> {
        let household = self
            .working
            .households
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "household", id })?;
        household.is_debtor = status.is_debtor;
        household.total_debt = status.total_debt;
        household.last_reading_date = Some(status.last_reading_date);
        household.last_period = Some(status.last_period.clone());
        household.updated_at = Utc::now();
        Ok(household.clone())
    }

    async fn find_reading(&mut self, household_id: i64, period: &str) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .working
            .readings
            .values()
            .find(|r| r.household_id == household_id && r.period == period)
            .cloned())
    }

    async fn insert_reading(&mut self, new: &NewReading) -> Result<Reading, StoreError> {
        let taken = self
            .working
            .readings
            .values()
            .any(|r| r.household_id == new.household_id && r.period == new.period);
        if taken {
            return Err(StoreError::Conflict(format!("reading {}/{}", new.household_id, new.period)));
        }
        if !self.working.households.contains_key(&new.household_id) {
            return Err(StoreError::NotFound { entity: "household", id: new.household_id });
        }
        let now = Utc::now();
        let reading = Reading {
            id: self.working.next_id(),
            household_id: new.household_id,
            period: new.period.clone(),
            consumption_m3: new.values.consumption_m3,
            amount_due: new.values.amount_due,
            is_paid: new.values.is_paid,
            reading_date: new.values.reading_date,
            created_at: now,
            updated_at: now,
        };
        self.working.readings.insert(reading.id, reading.clone());
        Ok(reading)
    }

    async fn update_reading(&mut self, id: i64, values: &ReadingValues) -> Result<Reading, StoreError> {
        let reading = self
            .working
            .readings
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "reading", id })?;
        reading.consumption_m3 = values.consumption_m3;
        reading.amount_due = values.amount_due;
        reading.is_paid = values.is_paid;
        reading.reading_date = values.reading_date;
        reading.updated_at = Utc::now();
        Ok(reading.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let tx = *self;
        let pending = tx.failing_commits.load(Ordering::SeqCst);
        if pending > 0 {
            tx.failing_commits.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Conflict("simulated commit failure".to_string()));
        }
        let MemoryStoreTx { mut guard, working, .. } = tx;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::dec;

    fn new_neighborhood(name: &str) -> NewNeighborhood {
        NewNeighborhood { name: name.to_string(), latitude: Some(-34.6), longitude: Some(-58.4) }
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryRecordStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_neighborhood(&new_neighborhood("Centro")).await.unwrap();
        tokio_test::assert_ok!(tx.commit().await);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.neighborhoods.len(), 1);
        assert_eq!(snapshot.neighborhoods[0].name, "Centro");
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = MemoryRecordStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_neighborhood(&new_neighborhood("Centro")).await.unwrap();
        }
        assert!(store.snapshot().await.neighborhoods.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let store = MemoryRecordStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_neighborhood(&new_neighborhood("Centro")).await.unwrap();
        let err = tx.insert_neighborhood(&new_neighborhood("Centro")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_negative_totals_rejected() {
        let store = MemoryRecordStore::new();
        let mut tx = store.begin().await.unwrap();
        let centro = tx.insert_neighborhood(&new_neighborhood("Centro")).await.unwrap();
        let delta = NeighborhoodTotals { consumption: dec("-1"), debt: Decimal::ZERO };
        let err = tx.add_neighborhood_totals(centro.id, delta).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert!(!err.is_transient());
        assert!(!tx.add_neighborhood_totals(centro.id + 100, NeighborhoodTotals::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_commit_discards_work() {
        let store = MemoryRecordStore::new();
        store.fail_next_commits(1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_neighborhood(&new_neighborhood("Centro")).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.snapshot().await.neighborhoods.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.insert_neighborhood(&new_neighborhood("Centro")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.snapshot().await.neighborhoods.len(), 1);
    }
}
