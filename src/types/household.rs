//! Household types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::messages::Page;

/// Household entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub id: i64,
    /// CSV `id` or the synthesized `{neighborhoodId}_{lat}_{lng}` key
    pub household_key: String,
    pub neighborhood_id: i64,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_debtor: bool,
    pub total_debt: Decimal,
    pub last_reading_date: Option<DateTime<Utc>>,
    /// Billing period of the row that last wrote the status fields
    pub last_period: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status fields overwritten on every import row
#[derive(Debug, Clone, PartialEq)]
pub struct HouseholdStatus {
    pub is_debtor: bool,
    pub total_debt: Decimal,
    pub last_reading_date: DateTime<Utc>,
    pub last_period: String,
}

/// Values for a household first seen in an import
#[derive(Debug, Clone, PartialEq)]
pub struct NewHousehold {
    pub household_key: String,
    pub neighborhood_id: i64,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: HouseholdStatus,
}

// ============================================================================
// List views
// ============================================================================

/// household.list request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdListRequest {
    /// Case-insensitive substring of the neighborhood name
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub debtor: Option<bool>,
    #[serde(flatten)]
    pub page: Page,
}

/// household.debtors request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtorListRequest {
    #[serde(flatten)]
    pub page: Page,
}

/// Household row joined with its neighborhood
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdListItem {
    pub id: i64,
    pub household_key: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_debtor: bool,
    pub total_debt: Decimal,
    pub last_reading_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub neighborhood_id: i64,
    pub neighborhood_name: String,
    pub neighborhood_latitude: Option<f64>,
    pub neighborhood_longitude: Option<f64>,
}

/// Household as embedded in a neighborhood detail
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdSummary {
    pub id: i64,
    pub household_key: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_debtor: bool,
    pub total_debt: Decimal,
    pub last_reading_date: Option<DateTime<Utc>>,
}

/// household.debtors response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtorListResponse {
    pub items: Vec<HouseholdListItem>,
    pub total: i64,
    /// Debt summed over the returned page only
    pub total_debt: Decimal,
    pub limit: i64,
    pub offset: i64,
}

impl DebtorListResponse {
    pub fn new(items: Vec<HouseholdListItem>, total: i64, page: Page) -> Self {
        let total_debt = items.iter().map(|item| item.total_debt).sum();
        Self {
            items,
            total,
            total_debt,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::dec;

    fn debtor(id: i64, debt: &str) -> HouseholdListItem {
        HouseholdListItem {
            id,
            household_key: format!("H{}", id),
            address: None,
            latitude: None,
            longitude: None,
            is_debtor: true,
            total_debt: dec(debt),
            last_reading_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            neighborhood_id: 1,
            neighborhood_name: "Centro".to_string(),
            neighborhood_latitude: None,
            neighborhood_longitude: None,
        }
    }

    #[test]
    fn test_debtor_list_response_sums_page_debt() {
        let response = DebtorListResponse::new(
            vec![debtor(1, "1200"), debtor(2, "350.50")],
            10,
            Page { limit: 2, offset: 0 },
        );
        assert_eq!(response.total_debt, dec("1550.50"));
        assert_eq!(response.total, 10);
    }

    #[test]
    fn test_household_list_request_parses_filters() {
        let request: HouseholdListRequest =
            serde_json::from_str(r#"{"neighborhood":"centro","debtor":true,"offset":20}"#).unwrap();
        assert_eq!(request.neighborhood.as_deref(), Some("centro"));
        assert_eq!(request.debtor, Some(true));
        assert_eq!(request.page.limit, 50);
        assert_eq!(request.page.offset, 20);
    }
}
