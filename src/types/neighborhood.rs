//! Neighborhood types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::household::{Household, HouseholdSummary};
use super::reading::Reading;
use super::messages::Page;

/// Neighborhood entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Neighborhood {
    pub id: i64,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Sum of consumption over every reading of every household
    pub total_consumption: Decimal,
    /// Sum of household debt (not reading amounts)
    pub total_debt: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a neighborhood first seen in an import
#[derive(Debug, Clone, PartialEq)]
pub struct NewNeighborhood {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Derived aggregate pair, also used as a delta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighborhoodTotals {
    pub consumption: Decimal,
    pub debt: Decimal,
}

impl NeighborhoodTotals {
    pub fn is_zero(&self) -> bool {
        self.consumption.is_zero() && self.debt.is_zero()
    }
}

/// A household together with all of its readings
#[derive(Debug, Clone)]
pub struct HouseholdWithReadings {
    pub household: Household,
    pub readings: Vec<Reading>,
}

/// Neighborhood with its full household/reading subtree
#[derive(Debug, Clone)]
pub struct NeighborhoodSubtree {
    pub neighborhood: Neighborhood,
    pub households: Vec<HouseholdWithReadings>,
}

impl NeighborhoodSubtree {
    /// Totals as they should be stored on the neighborhood row
    pub fn totals(&self) -> NeighborhoodTotals {
        self.households.iter().fold(NeighborhoodTotals::default(), |acc, entry| {
            let consumption = entry
                .readings
                .iter()
                .map(|reading| reading.consumption_m3)
                .sum::<Decimal>();
            NeighborhoodTotals {
                consumption: acc.consumption + consumption,
                debt: acc.debt + entry.household.total_debt,
            }
        })
    }
}

// ============================================================================
// List / detail views
// ============================================================================

/// neighborhood.list request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodListRequest {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(flatten)]
    pub page: Page,
}

/// Neighborhood row with household count
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodListItem {
    pub id: i64,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub total_consumption: Decimal,
    pub total_debt: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub household_count: i64,
    #[sqlx(skip)]
    pub average_consumption: Decimal,
}

/// neighborhood.get request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodGetRequest {
    pub id: i64,
}

/// Single neighborhood with its households
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodDetail {
    #[serde(flatten)]
    pub neighborhood: Neighborhood,
    pub households: Vec<HouseholdSummary>,
    pub household_count: i64,
    pub debtor_count: i64,
    pub average_consumption: Decimal,
}

/// Average consumption per household, rounded to cents; zero when empty
pub fn average_consumption(total_consumption: Decimal, household_count: i64) -> Decimal {
    if household_count <= 0 {
        return Decimal::ZERO;
    }
    (total_consumption / Decimal::from(household_count)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::test_support::dec;

    fn household(id: i64, debt: Decimal) -> Household {
        Household {
            id,
            household_key: id.to_string(),
            neighborhood_id: 1,
            address: None,
            latitude: None,
            longitude: None,
            is_debtor: !debt.is_zero(),
            total_debt: debt,
            last_reading_date: None,
            last_period: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn reading(household_id: i64, period: &str, consumption: Decimal) -> Reading {
        Reading {
            id: 0,
            household_id,
            period: period.to_string(),
            consumption_m3: consumption,
            amount_due: Decimal::ZERO,
            is_paid: true,
            reading_date: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn neighborhood() -> Neighborhood {
        Neighborhood {
            id: 1,
            name: "Centro".to_string(),
            latitude: None,
            longitude: None,
            total_consumption: Decimal::ZERO,
            total_debt: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_subtree_totals_sum_readings_and_household_debt() {
        let subtree = NeighborhoodSubtree {
            neighborhood: neighborhood(),
            households: vec![
                HouseholdWithReadings {
                    household: household(1, dec("1200")),
                    readings: vec![
                        reading(1, "2024-01", dec("45.5")),
                        reading(1, "2024-02", dec("60.0")),
                    ],
                },
                HouseholdWithReadings {
                    household: household(2, dec("300.25")),
                    readings: vec![reading(2, "2024-01", dec("10"))],
                },
            ],
        };

        let totals = subtree.totals();
        assert_eq!(totals.consumption, dec("115.5"));
        assert_eq!(totals.debt, dec("1500.25"));
    }

    #[test]
    fn test_subtree_totals_empty_neighborhood_is_zero() {
        let subtree = NeighborhoodSubtree {
            neighborhood: neighborhood(),
            households: vec![],
        };
        assert!(subtree.totals().is_zero());
    }

    #[test]
    fn test_average_consumption() {
        assert_eq!(average_consumption(dec("105.5"), 2), dec("52.75"));
        assert_eq!(average_consumption(dec("10"), 3), dec("3.33"));
        assert_eq!(average_consumption(dec("10"), 0), Decimal::ZERO);
    }

    #[test]
    fn test_neighborhood_list_request_flattens_page() {
        let request: NeighborhoodListRequest =
            serde_json::from_str(r#"{"search":"cen","limit":10}"#).unwrap();
        assert_eq!(request.search.as_deref(), Some("cen"));
        assert_eq!(request.page.limit, 10);
        assert_eq!(request.page.offset, 0);
    }
}
