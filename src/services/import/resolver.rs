//! Neighborhood and household find-or-create

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use super::row::{MeterRow, RowError};
use crate::db::store::StoreTx;
use crate::types::{Household, HouseholdStatus, Neighborhood, NewHousehold, NewNeighborhood, OverwritePolicy};

#[derive(Debug, Clone)]
pub struct ResolvedNeighborhood {
    pub neighborhood: Neighborhood,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedHousehold {
    pub household: Household,
    pub created: bool,
    /// Debt stored before this row; zero for a new household
    pub previous_debt: Decimal,
}

/// Find a neighborhood by exact name or create it with zero totals
pub async fn resolve_neighborhood(
    tx: &mut dyn StoreTx,
    row: &MeterRow,
) -> Result<ResolvedNeighborhood, RowError> {
    if row.barrio.trim().is_empty() {
        return Err(RowError::MissingBarrio);
    }

    if let Some(neighborhood) = tx.find_neighborhood_by_name(&row.barrio).await? {
        return Ok(ResolvedNeighborhood { neighborhood, created: false });
    }

    let neighborhood = tx
        .insert_neighborhood(&NewNeighborhood {
            name: row.barrio.clone(),
            latitude: row.latitude,
            longitude: row.longitude,
        })
        .await?;
    debug!("Created neighborhood {} ({})", neighborhood.name, neighborhood.id);

    Ok(ResolvedNeighborhood { neighborhood, created: true })
}

/// Find a household by key or create it; existing status fields follow `policy`
pub async fn resolve_household(
    tx: &mut dyn StoreTx,
    row: &MeterRow,
    neighborhood: &Neighborhood,
    policy: OverwritePolicy,
    now: DateTime<Utc>,
) -> Result<ResolvedHousehold, RowError> {
    let key = row.household_key(neighborhood.id);
    let status = HouseholdStatus {
        is_debtor: row.is_debtor,
        total_debt: row.amount_due,
        last_reading_date: now,
        last_period: row.period.clone(),
    };

    let Some(existing) = tx.find_household_by_key(&key).await? else {
        let household = tx
            .insert_household(&NewHousehold {
                household_key: key,
                neighborhood_id: neighborhood.id,
                address: row.address(&neighborhood.name),
                latitude: row.latitude,
                longitude: row.longitude,
                status,
            })
            .await?;
        return Ok(ResolvedHousehold { household, created: true, previous_debt: Decimal::ZERO });
    };

    if existing.neighborhood_id != neighborhood.id {
        return Err(RowError::NeighborhoodMismatch {
            key,
            existing: existing.neighborhood_id,
            barrio: neighborhood.name.clone(),
        });
    }

    let previous_debt = existing.total_debt;
    if !should_overwrite(policy, existing.last_period.as_deref(), &row.period) {
        debug!(
            "Household {} keeps status from period {:?}, row period {}",
            key, existing.last_period, row.period
        );
        return Ok(ResolvedHousehold { household: existing, created: false, previous_debt });
    }

    let household = tx.update_household_status(existing.id, &status).await?;
    Ok(ResolvedHousehold { household, created: false, previous_debt })
}

/// Whether a row of `period` may overwrite status last written by `last_period`
pub fn should_overwrite(policy: OverwritePolicy, last_period: Option<&str>, period: &str) -> bool {
    match policy {
        OverwritePolicy::Always => true,
        OverwritePolicy::NewerPeriod => last_period.map_or(true, |last| period >= last),
    }
}
