//! Statistics types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::defaults::{DEFAULT_TOP_LIMIT, DEFAULT_TREND_MONTHS};

/// Store-wide counts and totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total_neighborhoods: i64,
    pub total_households: i64,
    pub total_readings: i64,
    pub debtor_households: i64,
    pub total_consumption: Decimal,
    pub total_debt: Decimal,
    pub average_consumption_per_household: Decimal,
    pub average_debt_per_household: Decimal,
    pub debtor_percentage: Decimal,
}

/// Raw counters as read from the store
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct OverviewCounts {
    pub total_neighborhoods: i64,
    pub total_households: i64,
    pub total_readings: i64,
    pub debtor_households: i64,
    pub total_consumption: Decimal,
    pub total_debt: Decimal,
}

impl From<OverviewCounts> for OverviewStats {
    fn from(counts: OverviewCounts) -> Self {
        let per_household = |value: Decimal| {
            if counts.total_households > 0 {
                (value / Decimal::from(counts.total_households)).round_dp(2)
            } else {
                Decimal::ZERO
            }
        };

        Self {
            total_neighborhoods: counts.total_neighborhoods,
            total_households: counts.total_households,
            total_readings: counts.total_readings,
            debtor_households: counts.debtor_households,
            total_consumption: counts.total_consumption.round_dp(2),
            total_debt: counts.total_debt.round_dp(2),
            average_consumption_per_household: per_household(counts.total_consumption),
            average_debt_per_household: per_household(counts.total_debt),
            debtor_percentage: per_household(Decimal::from(counts.debtor_households) * Decimal::ONE_HUNDRED),
        }
    }
}

/// stats.top_consumption request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopConsumptionRequest {
    #[serde(default = "default_top_limit")]
    pub limit: i64,
}

fn default_top_limit() -> i64 {
    DEFAULT_TOP_LIMIT
}

impl Default for TopConsumptionRequest {
    fn default() -> Self {
        Self { limit: DEFAULT_TOP_LIMIT }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopConsumptionItem {
    pub id: i64,
    pub name: String,
    pub total_consumption: Decimal,
    pub total_debt: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DebtSummaryItem {
    pub id: i64,
    pub name: String,
    pub total_debt: Decimal,
    pub household_count: i64,
    pub debtor_count: i64,
}

/// stats.debt_summary response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtSummary {
    pub items: Vec<DebtSummaryItem>,
    pub total_debt: Decimal,
    pub neighborhood_count: usize,
}

impl DebtSummary {
    pub fn new(items: Vec<DebtSummaryItem>) -> Self {
        let total_debt = items.iter().map(|item| item.total_debt).sum();
        Self {
            neighborhood_count: items.len(),
            items,
            total_debt,
        }
    }
}

/// stats.consumption_trends request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionTrendsRequest {
    #[serde(default = "default_trend_months")]
    pub months: u32,
}

fn default_trend_months() -> u32 {
    DEFAULT_TREND_MONTHS
}

impl Default for ConsumptionTrendsRequest {
    fn default() -> Self {
        Self { months: DEFAULT_TREND_MONTHS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionTrend {
    pub period: String,
    pub total_consumption: Decimal,
    pub reading_count: i64,
    pub average_consumption: Decimal,
}

/// stats.consumption_trends response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionTrends {
    pub trends: Vec<ConsumptionTrend>,
    pub months: u32,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::dec;

    #[test]
    fn test_overview_from_counts_computes_averages() {
        let stats = OverviewStats::from(OverviewCounts {
            total_neighborhoods: 2,
            total_households: 4,
            total_readings: 8,
            debtor_households: 1,
            total_consumption: dec("210"),
            total_debt: dec("1200"),
        });

        assert_eq!(stats.average_consumption_per_household, dec("52.5"));
        assert_eq!(stats.average_debt_per_household, dec("300"));
        assert_eq!(stats.debtor_percentage, dec("25"));
    }

    #[test]
    fn test_overview_from_empty_store_is_all_zero() {
        let stats = OverviewStats::from(OverviewCounts::default());
        assert_eq!(stats.average_consumption_per_household, Decimal::ZERO);
        assert_eq!(stats.debtor_percentage, Decimal::ZERO);
    }

    #[test]
    fn test_debt_summary_totals() {
        let summary = DebtSummary::new(vec![
            DebtSummaryItem {
                id: 1,
                name: "Centro".to_string(),
                total_debt: dec("1200"),
                household_count: 3,
                debtor_count: 1,
            },
            DebtSummaryItem {
                id: 2,
                name: "Norte".to_string(),
                total_debt: dec("0"),
                household_count: 2,
                debtor_count: 0,
            },
        ]);
        assert_eq!(summary.total_debt, dec("1200"));
        assert_eq!(summary.neighborhood_count, 2);
    }

    #[test]
    fn test_request_defaults() {
        let top: TopConsumptionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(top.limit, 5);
        let trends: ConsumptionTrendsRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(trends.months, 12);
    }
}
