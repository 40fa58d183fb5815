//! Dashboard statistics queries

use anyhow::Result;
use chrono::{Months, NaiveDate};
use sqlx::PgPool;

use crate::defaults::MAX_LIST_LIMIT;
use crate::types::{
    ConsumptionTrend, ConsumptionTrends, DebtSummary, DebtSummaryItem, OverviewCounts, OverviewStats,
    TopConsumptionItem,
};

/// Store-wide totals
pub async fn get_overview(pool: &PgPool) -> Result<OverviewStats> {
    let counts = sqlx::query_as::<_, OverviewCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM neighborhoods) AS total_neighborhoods,
            (SELECT COUNT(*) FROM households) AS total_households,
            (SELECT COUNT(*) FROM readings) AS total_readings,
            (SELECT COUNT(*) FROM households WHERE is_debtor = true) AS debtor_households,
            (SELECT COALESCE(SUM(consumption_m3), 0) FROM readings) AS total_consumption,
            (SELECT COALESCE(SUM(total_debt), 0) FROM households) AS total_debt
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(counts.into())
}

/// Neighborhoods with the highest total consumption
pub async fn top_consumption(pool: &PgPool, limit: i64) -> Result<Vec<TopConsumptionItem>> {
    let items = sqlx::query_as::<_, TopConsumptionItem>(
        r#"
        SELECT id, name, total_consumption, total_debt
        FROM neighborhoods
        ORDER BY total_consumption DESC, name ASC
        LIMIT $1
        "#,
    )
    .bind(limit.clamp(1, MAX_LIST_LIMIT))
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Debt per neighborhood with household and debtor counts
pub async fn debt_summary(pool: &PgPool) -> Result<DebtSummary> {
    let items = sqlx::query_as::<_, DebtSummaryItem>(
        r#"
        SELECT
            n.id, n.name, n.total_debt,
            COUNT(h.id) AS household_count,
            COUNT(h.id) FILTER (WHERE h.is_debtor) AS debtor_count
        FROM neighborhoods n
        LEFT JOIN households h ON h.neighborhood_id = n.id
        GROUP BY n.id
        ORDER BY n.total_debt DESC, n.name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(DebtSummary::new(items))
}

/// Per-period consumption for readings dated within the last `months` months
pub async fn consumption_trends(pool: &PgPool, months: u32, today: NaiveDate) -> Result<ConsumptionTrends> {
    let from = trend_window_start(today, months);

    let trends = sqlx::query_as::<_, ConsumptionTrend>(
        r#"
        SELECT
            period,
            SUM(consumption_m3) AS total_consumption,
            COUNT(*) AS reading_count,
            ROUND(AVG(consumption_m3), 2) AS average_consumption
        FROM readings
        WHERE reading_date >= $1::date
        GROUP BY period
        ORDER BY period ASC
        "#,
    )
    .bind(from)
    .fetch_all(pool)
    .await?;

    Ok(ConsumptionTrends { trends, months, from, to: today })
}

/// Same day `months` months back, clamped to the end of shorter months
pub fn trend_window_start(today: NaiveDate, months: u32) -> NaiveDate {
    today.checked_sub_months(Months::new(months)).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_trend_window_start() {
        assert_eq!(trend_window_start(date(2024, 6, 15), 12), date(2023, 6, 15));
        assert_eq!(trend_window_start(date(2024, 6, 15), 0), date(2024, 6, 15));
        assert_eq!(trend_window_start(date(2024, 3, 31), 1), date(2024, 2, 29));
    }
}
